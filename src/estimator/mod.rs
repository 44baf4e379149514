//! Pluggable estimators and the ensemble that votes over them.
//!
//! Every estimator exposes the same capability: take a [`Situation`] and
//! return a label with an informational confidence. Which estimators run is
//! decided by configuration ([`EstimatorConfig`]), not by type.

pub mod ensemble;
pub mod features;
pub mod rules;

#[cfg(feature = "remote")]
pub mod remote;

pub use ensemble::{majority, EnsembleError, EstimatorEnsemble, Verdict, Vote};
pub use features::{compute_features, SituationFeatures};
pub use rules::{
    InactivityEstimator, IrregularityEstimator, NightActivityEstimator, SummaryHintEstimator,
};

use crate::config::{ConfigError, EstimatorConfig};
use crate::core::{Label, Situation};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One estimator's answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub label: Label,
    /// Informational only; never weighs into the vote
    #[serde(default)]
    pub confidence: f64,
}

impl Estimate {
    pub fn new(label: Label, confidence: f64) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("estimator '{estimator}' returned no usable label")]
    Undecided { estimator: String },
    #[error("estimator '{estimator}' unavailable: {message}")]
    Unavailable { estimator: String, message: String },
}

/// Capability shared by every estimator.
pub trait Estimator: Send + Sync {
    /// Stable name used in logs and vote records.
    fn name(&self) -> &str;

    fn estimate(&self, situation: &Situation) -> Result<Estimate, EstimatorError>;
}

/// Build one estimator from its configuration.
pub fn build_estimator(config: &EstimatorConfig, timezone: Tz) -> Result<Box<dyn Estimator>, ConfigError> {
    Ok(match config {
        EstimatorConfig::NightActivity {
            start_hour,
            end_hour,
            max_events,
        } => {
            if *start_hour > 23 || *end_hour > 23 {
                return Err(ConfigError::Invalid(
                    "night_activity hours must be within 0-23".to_string(),
                ));
            }
            Box::new(NightActivityEstimator::new(
                timezone,
                *start_hour,
                *end_hour,
                *max_events,
            ))
        }
        EstimatorConfig::Inactivity { max_gap_secs } => {
            Box::new(InactivityEstimator::new(*max_gap_secs))
        }
        EstimatorConfig::Irregularity {
            max_gap_cv,
            rapid_transition_secs,
            max_rapid_ratio,
        } => Box::new(IrregularityEstimator::new(
            *max_gap_cv,
            *rapid_transition_secs,
            *max_rapid_ratio,
        )),
        EstimatorConfig::SummaryHint => Box::new(SummaryHintEstimator),
        #[cfg(feature = "remote")]
        EstimatorConfig::Remote { url, token } => Box::new(
            remote::RemoteEstimator::new(crate::remote::RemoteConfig::new(
                url.clone(),
                token.clone(),
            ))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?,
        ),
        #[cfg(not(feature = "remote"))]
        EstimatorConfig::Remote { .. } => {
            return Err(ConfigError::Invalid(
                "remote estimators require the `remote` feature".to_string(),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_ensemble() {
        for config in EstimatorConfig::default_ensemble() {
            let estimator = build_estimator(&config, Tz::UTC).unwrap();
            assert!(!estimator.name().is_empty());
        }
    }

    #[test]
    fn test_build_rejects_bad_hours() {
        let config = EstimatorConfig::NightActivity {
            start_hour: 25,
            end_hour: 5,
            max_events: 1,
        };
        assert!(build_estimator(&config, Tz::UTC).is_err());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Estimate::new(Label::Normal, 3.0).confidence, 1.0);
        assert_eq!(Estimate::new(Label::Normal, -1.0).confidence, 0.0);
    }
}
