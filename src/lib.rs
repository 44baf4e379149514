//! Care Agent - situation monitoring for elder care.
//!
//! Reads raw home-sensor events (door contacts, motion, power), groups them
//! into six-hour windows, summarizes each window into a situation, lets an
//! ensemble of estimators vote on whether it is normal or anomalous, and keeps
//! an auditable memory of every investigation. Anomalies raise an alert.
//!
//! # Guarantees
//!
//! - **No data loss on rotation**: expired records move to dated archives
//! - **No double investigation**: a window sharing any event with memory is skipped
//! - **One conclusion per run**: exactly one investigation is persisted
//! - **Failed runs change nothing**: memory is only written after every vote succeeded
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Care Agent                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │ Event log   │──▶│  Windowing  │──▶│ Summarizer  │            │
//! │  │ (rotating)  │   │ (6h bins)   │   │             │            │
//! │  └─────────────┘   └─────────────┘   └─────────────┘            │
//! │                                             │                    │
//! │                                             ▼                    │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │  Memory     │◀──│ Orchestrator│◀──│  Ensemble   │            │
//! │  │ (rotating)  │   │  → Notifier │   │  (vote)     │            │
//! │  └─────────────┘   └─────────────┘   └─────────────┘            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use care_agent::{config::Config, orchestrator::{Orchestrator, RunOutcome}};
//!
//! let config = Config::load().expect("Failed to load config");
//! let orchestrator = Orchestrator::from_config(&config).expect("Invalid config");
//!
//! match orchestrator.run() {
//!     Ok(RunOutcome::Persisted { index, .. }) => println!("stored investigation {index}"),
//!     Ok(RunOutcome::NoNewData) => println!("nothing new"),
//!     Err(e) => eprintln!("run failed: {e}"),
//! }
//! ```

pub mod config;
pub mod core;
pub mod estimator;
pub mod events;
pub mod notify;
pub mod orchestrator;
pub mod store;
pub mod transparency;

#[cfg(feature = "remote")]
pub mod remote;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{Investigation, Label, Situation, SituationRepository};
pub use estimator::{Estimate, Estimator, EstimatorEnsemble};
pub use events::RawEvent;
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::{Orchestrator, RunError, RunOutcome};
pub use store::{MemoryStore, RotatingStore, StoreLayout};
pub use transparency::{RunLog, RunStats, SharedRunLog};

#[cfg(feature = "remote")]
pub use remote::{BlockingRemoteClient, RemoteClient, RemoteConfig, RemoteError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
