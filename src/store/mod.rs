//! Durable storage: the rotating record store and the investigation memory
//! built on top of it.

pub mod memory;
pub mod rotating;

pub use memory::{MemoryStore, MEMORY_TIMESTAMP_PATH};
pub use rotating::{RotatingStore, RotationReport, StoreError, StoreLayout};
