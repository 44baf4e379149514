//! Core functionality for the care agent.
//!
//! This module contains:
//! - Window management for grouping raw events into investigation windows
//! - The situation and investigation model
//! - Summarization of windows into situations
//! - The repository that yields new, not yet investigated situations

pub mod repository;
pub mod situation;
pub mod summarizer;
pub mod windowing;

// Re-export commonly used types
pub use repository::{event_log, known_event_timestamps, known_start_timestamps, ScanError, SituationRepository};
pub use situation::{rank_by_severity, select_most_concerning, Investigation, Label, Situation};
pub use summarizer::{build_summarizer, DigestSummarizer, SummarizeError, Summarizer};
#[cfg(feature = "remote")]
pub use summarizer::RemoteSummarizer;
pub use windowing::{EventBucket, EventWindower, WindowManager};
