//! Situations, labels and investigations.

use crate::events::RawEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Normal,
    Anomalous,
    Unknown,
}

impl Label {
    /// Ordering used to pick the most concerning investigation.
    pub fn severity(self) -> u8 {
        match self {
            Label::Anomalous => 2,
            Label::Normal => 1,
            Label::Unknown => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Normal => "normal",
            Label::Anomalous => "anomalous",
            Label::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Label::Normal),
            "anomalous" => Ok(Label::Anomalous),
            "unknown" => Ok(Label::Unknown),
            other => Err(format!("unknown label '{other}'")),
        }
    }
}

/// A time-bounded, summarized group of raw sensor events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Situation {
    /// Short human-readable summary
    pub situation_description: String,
    /// Summarizer's own hint; the ensemble vote is binding
    pub result: Label,
    /// First event time (epoch seconds)
    pub start_timestamp: i64,
    /// Last event time (epoch seconds)
    pub end_timestamp: i64,
    /// Events of the situation, ascending by timestamp
    pub details: Vec<RawEvent>,
}

impl Situation {
    /// Check the ordering invariants: `start <= end` and every detail sorted
    /// and inside `[start, end]`.
    pub fn is_consistent(&self) -> bool {
        self.start_timestamp <= self.end_timestamp
            && self
                .details
                .windows(2)
                .all(|pair| pair[0].timestamp <= pair[1].timestamp)
            && self
                .details
                .iter()
                .all(|e| e.timestamp >= self.start_timestamp && e.timestamp <= self.end_timestamp)
    }

    /// Timestamps of every contained event.
    pub fn event_timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        self.details.iter().map(|e| e.timestamp)
    }
}

/// A situation paired with its binding estimate. This is the unit of memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub situation: Situation,
    pub estimate: Label,
}

impl Investigation {
    pub fn new(situation: Situation, estimate: Label) -> Self {
        Self {
            situation,
            estimate,
        }
    }

    /// Short alert text for the notification channel.
    pub fn alert_text(&self) -> String {
        format!(
            "Investigation Alert! {} ({}..{})",
            self.situation.situation_description,
            self.situation.start_timestamp,
            self.situation.end_timestamp
        )
    }
}

/// Stable sort by severity, most concerning first.
pub fn rank_by_severity(mut investigations: Vec<Investigation>) -> Vec<Investigation> {
    investigations.sort_by(|a, b| b.estimate.severity().cmp(&a.estimate.severity()));
    investigations
}

/// Head of [`rank_by_severity`].
pub fn select_most_concerning(investigations: Vec<Investigation>) -> Option<Investigation> {
    rank_by_severity(investigations).into_iter().next()
}
