//! Turning event windows into situations.
//!
//! The summarizer is an external collaborator in production (a generative
//! text service). [`DigestSummarizer`] is the local stand-in: it produces a
//! deterministic description and leaves the result hint as `unknown`.

use crate::config::{ConfigError, SummarizerConfig};
use crate::core::situation::{Label, Situation};
use crate::events::RawEvent;
use chrono::TimeZone;
use chrono_tz::Tz;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("no events to summarize")]
    Empty,
    #[error("summarizer unavailable: {0}")]
    Unavailable(String),
    #[error("summarizer returned an unusable situation: {0}")]
    Invalid(String),
}

/// Capability of turning one window of events into a situation.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, events: &[RawEvent]) -> Result<Situation, SummarizeError>;
}

/// Local summarizer that describes a window by counts, rooms and local time.
#[derive(Debug, Clone)]
pub struct DigestSummarizer {
    timezone: Tz,
}

impl DigestSummarizer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    fn local_time(&self, timestamp: i64) -> String {
        match self.timezone.timestamp_opt(timestamp, 0).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            None => timestamp.to_string(),
        }
    }
}

impl Default for DigestSummarizer {
    fn default() -> Self {
        Self::new(chrono_tz::Tz::UTC)
    }
}

impl Summarizer for DigestSummarizer {
    fn summarize(&self, events: &[RawEvent]) -> Result<Situation, SummarizeError> {
        let mut details = events.to_vec();
        details.sort_by_key(|e| e.timestamp);
        let (first, last) = match (details.first(), details.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => return Err(SummarizeError::Empty),
        };

        let mut rooms: BTreeMap<&str, usize> = BTreeMap::new();
        for event in &details {
            let room = if event.room.is_empty() { "unknown room" } else { event.room.as_str() };
            *rooms.entry(room).or_default() += 1;
        }
        let busiest = rooms
            .iter()
            .map(|(room, count)| format!("{room} ({count})"))
            .collect::<Vec<_>>()
            .join(", ");

        let situation_description = format!(
            "{} sensor events between {} and {} ({}). Activity by room: {}.",
            details.len(),
            self.local_time(first),
            self.local_time(last),
            self.timezone.name(),
            busiest
        );

        Ok(Situation {
            situation_description,
            result: Label::Unknown,
            start_timestamp: first,
            end_timestamp: last,
            details,
        })
    }
}

/// Summarizer backed by an external service.
///
/// Sends `{"events": [...]}` and expects a situation back; the reply is
/// rejected unless it spans exactly the window it was given.
#[cfg(feature = "remote")]
pub struct RemoteSummarizer {
    client: crate::remote::BlockingRemoteClient,
}

#[cfg(feature = "remote")]
impl RemoteSummarizer {
    pub fn new(config: crate::remote::RemoteConfig) -> Result<Self, crate::remote::RemoteError> {
        Ok(Self {
            client: crate::remote::BlockingRemoteClient::new(config)?,
        })
    }
}

#[cfg(feature = "remote")]
impl Summarizer for RemoteSummarizer {
    fn summarize(&self, events: &[RawEvent]) -> Result<Situation, SummarizeError> {
        if events.is_empty() {
            return Err(SummarizeError::Empty);
        }
        let body = serde_json::json!({ "events": events });
        let mut situation: Situation = self
            .client
            .post_json(&body)
            .map_err(|e| SummarizeError::Unavailable(e.to_string()))?;

        situation.details.sort_by_key(|e| e.timestamp);
        let first = events.iter().map(|e| e.timestamp).min();
        let last = events.iter().map(|e| e.timestamp).max();
        if situation.details.len() != events.len()
            || Some(situation.start_timestamp) != first
            || Some(situation.end_timestamp) != last
            || !situation.is_consistent()
        {
            return Err(SummarizeError::Invalid(format!(
                "reply covers {}..{} with {} events, window was {:?}..{:?} with {}",
                situation.start_timestamp,
                situation.end_timestamp,
                situation.details.len(),
                first,
                last,
                events.len()
            )));
        }
        Ok(situation)
    }
}

/// Build the configured summarizer.
pub fn build_summarizer(
    config: &SummarizerConfig,
    timezone: Tz,
) -> Result<Box<dyn Summarizer>, ConfigError> {
    match config {
        SummarizerConfig::Digest => Ok(Box::new(DigestSummarizer::new(timezone))),
        #[cfg(feature = "remote")]
        SummarizerConfig::Remote { url, token } => {
            let remote =
                RemoteSummarizer::new(crate::remote::RemoteConfig::new(url.clone(), token.clone()))
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Ok(Box::new(remote))
        }
        #[cfg(not(feature = "remote"))]
        SummarizerConfig::Remote { .. } => Err(ConfigError::Invalid(
            "remote summarizer requires the `remote` feature".to_string(),
        )),
    }
}
