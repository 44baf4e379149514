//! Feature computation from situations.
//!
//! Features are derived from event timing and room only. Estimators pick the
//! ones they need; none of them look at free-text descriptions.

use crate::core::Situation;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Timing and location features of one situation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SituationFeatures {
    /// Number of events
    pub event_count: usize,
    /// Events per room
    pub room_visits: BTreeMap<String, usize>,
    /// Mean gap between consecutive events (seconds)
    pub mean_gap_secs: f64,
    /// Longest gap between consecutive events (seconds)
    pub max_gap_secs: f64,
    /// Sample standard deviation of gaps (seconds)
    pub gap_std_dev: f64,
    /// Coefficient of variation of gaps (std dev / mean)
    pub gap_cv: f64,
    /// Consecutive events closer than the rapid threshold
    pub rapid_transitions: usize,
    /// Rapid transitions as a share of all gaps (0-1)
    pub rapid_ratio: f64,
}

/// Compute features; events closer than `rapid_threshold_secs` count as rapid.
pub fn compute_features(situation: &Situation, rapid_threshold_secs: i64) -> SituationFeatures {
    let mut room_visits = BTreeMap::new();
    for event in &situation.details {
        *room_visits.entry(event.room.clone()).or_insert(0) += 1;
    }

    let gaps = inter_event_gaps(situation);
    let rapid_transitions = gaps
        .iter()
        .filter(|&&gap| gap < rapid_threshold_secs as f64)
        .count();

    let (mean_gap_secs, max_gap_secs, gap_std_dev) = if gaps.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let mean = gaps.iter().mean();
        let max = gaps.iter().copied().fold(0.0, f64::max);
        let std_dev = if gaps.len() < 2 { 0.0 } else { gaps.iter().std_dev() };
        (mean, max, std_dev)
    };

    let gap_cv = if mean_gap_secs > 0.0 {
        gap_std_dev / mean_gap_secs
    } else {
        0.0
    };

    SituationFeatures {
        event_count: situation.details.len(),
        room_visits,
        mean_gap_secs,
        max_gap_secs,
        gap_std_dev,
        gap_cv,
        rapid_transitions,
        rapid_ratio: if gaps.is_empty() {
            0.0
        } else {
            rapid_transitions as f64 / gaps.len() as f64
        },
    }
}

/// Gaps between consecutive events, in seconds.
fn inter_event_gaps(situation: &Situation) -> Vec<f64> {
    situation
        .details
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp) as f64)
        .collect()
}
