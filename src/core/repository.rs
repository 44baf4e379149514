//! Source of new candidate situations.
//!
//! Loads the raw event log, windows it, drops every window that shares a raw
//! event timestamp with a situation already in memory, and summarizes what is
//! left. Duplicates are judged per raw event rather than per window, so a
//! shift in window boundaries cannot bring already-seen events back.

use crate::config::{Config, SUMMARY_ATTEMPTS_PER_CANDIDATE};
use crate::core::situation::{Investigation, Situation};
use crate::core::summarizer::{SummarizeError, Summarizer};
use crate::core::windowing::{EventBucket, EventWindower};
use crate::events::RawEvent;
use crate::store::{RotatingStore, StoreError, StoreLayout};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("event log unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("all {attempted} candidate windows failed to summarize; last error: {last}")]
    Summarizer {
        attempted: usize,
        #[source]
        last: SummarizeError,
    },
}

/// The configured raw event log.
pub fn event_log(config: &Config) -> RotatingStore {
    RotatingStore::new(
        config.event_log_path(),
        StoreLayout::json_lines(),
        config.event_retention_weeks,
    )
    .with_archive_dir(config.archive_dir())
}

/// Start timestamps of every situation already investigated.
pub fn known_start_timestamps(memory: &[Investigation]) -> HashSet<i64> {
    memory
        .iter()
        .map(|inv| inv.situation.start_timestamp)
        .collect()
}

/// Every raw event timestamp already investigated, start timestamps included.
pub fn known_event_timestamps(memory: &[Investigation]) -> HashSet<i64> {
    memory
        .iter()
        .flat_map(|inv| {
            std::iter::once(inv.situation.start_timestamp)
                .chain(inv.situation.event_timestamps())
        })
        .collect()
}

pub struct SituationRepository {
    events: RotatingStore,
    windower: EventWindower,
    summarizer: Box<dyn Summarizer>,
}

impl SituationRepository {
    pub fn new(
        events: RotatingStore,
        windower: EventWindower,
        summarizer: Box<dyn Summarizer>,
    ) -> Self {
        Self {
            events,
            windower,
            summarizer,
        }
    }

    pub fn event_store(&self) -> &RotatingStore {
        &self.events
    }

    /// Record new raw events in the event log.
    pub fn ingest(&self, events: &[RawEvent]) -> Result<(), StoreError> {
        self.events.append(events)?;
        tracing::info!(count = events.len(), "ingested raw events");
        Ok(())
    }

    /// Windows not yet covered by memory, in emission order.
    pub fn new_windows(&self, known: &HashSet<i64>) -> Result<Vec<EventBucket>, StoreError> {
        let events: Vec<RawEvent> = self.events.read()?;
        let total_events = events.len();
        let buckets = self.windower.group(events);
        let total_buckets = buckets.len();

        let fresh: Vec<EventBucket> = buckets
            .into_iter()
            .filter(|bucket| !bucket.overlaps(known))
            .collect();

        tracing::debug!(
            total_events,
            total_buckets,
            new_buckets = fresh.len(),
            "windowed event log"
        );
        Ok(fresh)
    }

    /// Summarize up to `limit` new windows into candidate situations.
    ///
    /// A window whose summary fails or breaks the ordering invariants is
    /// skipped. At most `limit * SUMMARY_ATTEMPTS_PER_CANDIDATE` windows are
    /// attempted, so an unavailable summarizer costs a bounded number of
    /// calls. The scan only fails if every attempted window failed.
    pub fn fetch_new_situations(
        &self,
        known: &HashSet<i64>,
        limit: usize,
    ) -> Result<Vec<Situation>, ScanError> {
        let windows = self.new_windows(known)?;
        tracing::info!(windows = windows.len(), "found windows not already in memory");

        let max_attempts = limit.saturating_mul(SUMMARY_ATTEMPTS_PER_CANDIDATE);
        let mut situations = Vec::new();
        let mut attempted = 0;
        let mut last_error = None;

        for window in windows {
            if situations.len() >= limit || attempted >= max_attempts {
                break;
            }
            attempted += 1;
            match self.summarize_window(&window) {
                Ok(situation) => situations.push(situation),
                Err(e) => {
                    tracing::warn!(start = window.start, error = %e, "skipping window");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) if situations.is_empty() => Err(ScanError::Summarizer { attempted, last }),
            _ => Ok(situations),
        }
    }

    fn summarize_window(&self, window: &EventBucket) -> Result<Situation, SummarizeError> {
        let mut situation = self.summarizer.summarize(&window.events)?;
        situation.details.sort_by_key(|e| e.timestamp);

        if !situation.is_consistent() {
            return Err(SummarizeError::Invalid(format!(
                "details outside [{}, {}]",
                situation.start_timestamp, situation.end_timestamp
            )));
        }
        Ok(situation)
    }
}
