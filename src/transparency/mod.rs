//! Transparency about what the agent has done.
//!
//! The run log keeps counters only, never situation content, so it can be
//! shown to anyone with access to the viewer.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, RunLog, RunStats, SharedRunLog,
};
