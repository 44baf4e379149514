//! Local rule-based estimators.

use crate::core::{Label, Situation};
use crate::estimator::features::compute_features;
use crate::estimator::{Estimate, Estimator, EstimatorError};
use chrono::{TimeZone, Timelike};
use chrono_tz::Tz;

/// Flags situations with more than `max_events` events during local night.
#[derive(Debug, Clone)]
pub struct NightActivityEstimator {
    timezone: Tz,
    start_hour: u32,
    end_hour: u32,
    max_events: usize,
}

impl NightActivityEstimator {
    pub fn new(timezone: Tz, start_hour: u32, end_hour: u32, max_events: usize) -> Self {
        Self {
            timezone,
            start_hour: start_hour % 24,
            end_hour: end_hour % 24,
            max_events,
        }
    }

    /// Night may wrap midnight (23 → 5).
    fn is_night(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    pub fn night_events(&self, situation: &Situation) -> usize {
        situation
            .details
            .iter()
            .filter_map(|e| self.timezone.timestamp_opt(e.timestamp, 0).single())
            .filter(|local| self.is_night(local.hour()))
            .count()
    }
}

impl Estimator for NightActivityEstimator {
    fn name(&self) -> &str {
        "night_activity"
    }

    fn estimate(&self, situation: &Situation) -> Result<Estimate, EstimatorError> {
        let night = self.night_events(situation);
        let ratio = night as f64 / (self.max_events as f64 + 1.0);
        if night > self.max_events {
            Ok(Estimate::new(Label::Anomalous, ratio.min(1.0)))
        } else {
            Ok(Estimate::new(Label::Normal, 1.0 - ratio))
        }
    }
}

/// Flags situations containing a silence longer than `max_gap_secs`.
#[derive(Debug, Clone)]
pub struct InactivityEstimator {
    max_gap_secs: i64,
}

impl InactivityEstimator {
    pub fn new(max_gap_secs: i64) -> Self {
        Self { max_gap_secs }
    }
}

impl Estimator for InactivityEstimator {
    fn name(&self) -> &str {
        "inactivity"
    }

    fn estimate(&self, situation: &Situation) -> Result<Estimate, EstimatorError> {
        let features = compute_features(situation, 0);
        let limit = self.max_gap_secs.max(1) as f64;
        if features.max_gap_secs > limit {
            Ok(Estimate::new(
                Label::Anomalous,
                (features.max_gap_secs / (2.0 * limit)).min(1.0),
            ))
        } else {
            Ok(Estimate::new(Label::Normal, 1.0 - features.max_gap_secs / (2.0 * limit)))
        }
    }
}

/// Flags erratic spacing: highly variable gaps or a burst of rapid transitions.
#[derive(Debug, Clone)]
pub struct IrregularityEstimator {
    max_gap_cv: f64,
    rapid_transition_secs: i64,
    max_rapid_ratio: f64,
}

impl IrregularityEstimator {
    /// Fewer gaps than this say nothing about regularity.
    const MIN_GAPS: usize = 3;

    pub fn new(max_gap_cv: f64, rapid_transition_secs: i64, max_rapid_ratio: f64) -> Self {
        Self {
            max_gap_cv,
            rapid_transition_secs,
            max_rapid_ratio,
        }
    }
}

impl Estimator for IrregularityEstimator {
    fn name(&self) -> &str {
        "irregularity"
    }

    fn estimate(&self, situation: &Situation) -> Result<Estimate, EstimatorError> {
        let features = compute_features(situation, self.rapid_transition_secs);
        if features.event_count < Self::MIN_GAPS + 1 {
            return Ok(Estimate::new(Label::Normal, 0.5));
        }

        let erratic = features.gap_cv > self.max_gap_cv;
        let restless = features.rapid_ratio > self.max_rapid_ratio;
        if erratic || restless {
            Ok(Estimate::new(Label::Anomalous, if erratic && restless { 0.9 } else { 0.6 }))
        } else {
            Ok(Estimate::new(Label::Normal, 0.7))
        }
    }
}

/// Adopts the summarizer's result hint as a vote.
#[derive(Debug, Clone, Default)]
pub struct SummaryHintEstimator;

impl Estimator for SummaryHintEstimator {
    fn name(&self) -> &str {
        "summary_hint"
    }

    fn estimate(&self, situation: &Situation) -> Result<Estimate, EstimatorError> {
        match situation.result {
            Label::Unknown => Err(EstimatorError::Undecided {
                estimator: self.name().to_string(),
            }),
            label => Ok(Estimate::new(label, 0.5)),
        }
    }
}
