//! Majority vote over independent estimators.
//!
//! The vote is strict majority; an exact tie resolves to `anomalous`, because
//! a missed anomaly costs more than a false alarm. A failing estimator aborts
//! the vote instead of being dropped, since dropping a voter would silently
//! change where ties fall.

use crate::config::{ConfigError, EstimatorConfig};
use crate::core::{Label, Situation};
use crate::estimator::{build_estimator, Estimator, EstimatorError};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("ensemble has no estimators")]
    Empty,
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
}

/// One recorded ballot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub estimator: String,
    pub label: Label,
    pub confidence: f64,
}

/// Outcome of a vote with every ballot kept for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: Label,
    pub votes: Vec<Vote>,
}

impl Verdict {
    pub fn count(&self, label: Label) -> usize {
        self.votes.iter().filter(|v| v.label == label).count()
    }
}

/// Strict majority of `normal` over `anomalous`; anything else is `anomalous`.
pub fn majority<I: IntoIterator<Item = Label>>(labels: I) -> Label {
    let (mut normal, mut anomalous) = (0usize, 0usize);
    for label in labels {
        match label {
            Label::Normal => normal += 1,
            Label::Anomalous => anomalous += 1,
            Label::Unknown => {}
        }
    }
    if normal > anomalous {
        Label::Normal
    } else {
        Label::Anomalous
    }
}

/// Ordered set of estimators voting on every situation.
pub struct EstimatorEnsemble {
    estimators: Vec<Box<dyn Estimator>>,
}

impl EstimatorEnsemble {
    pub fn new(estimators: Vec<Box<dyn Estimator>>) -> Result<Self, EnsembleError> {
        if estimators.is_empty() {
            return Err(EnsembleError::Empty);
        }
        Ok(Self { estimators })
    }

    /// Build the configured voters in order.
    pub fn from_config(configs: &[EstimatorConfig], timezone: Tz) -> Result<Self, ConfigError> {
        let estimators = configs
            .iter()
            .map(|config| build_estimator(config, timezone))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(estimators).map_err(|_| ConfigError::Missing("at least one estimator".to_string()))
    }

    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.estimators.iter().map(|e| e.name()).collect()
    }

    /// Collect every ballot and tally them.
    pub fn vote(&self, situation: &Situation) -> Result<Verdict, EnsembleError> {
        let mut votes = Vec::with_capacity(self.estimators.len());
        for estimator in &self.estimators {
            let estimate = estimator.estimate(situation)?;
            if estimate.label == Label::Unknown {
                return Err(EstimatorError::Undecided {
                    estimator: estimator.name().to_string(),
                }
                .into());
            }
            tracing::debug!(
                estimator = estimator.name(),
                label = %estimate.label,
                confidence = estimate.confidence,
                "estimator voted"
            );
            votes.push(Vote {
                estimator: estimator.name().to_string(),
                label: estimate.label,
                confidence: estimate.confidence,
            });
        }

        let label = majority(votes.iter().map(|v| v.label));
        let verdict = Verdict { label, votes };
        tracing::info!(
            start = situation.start_timestamp,
            normal = verdict.count(Label::Normal),
            anomalous = verdict.count(Label::Anomalous),
            result = %label,
            "ensemble vote complete"
        );
        Ok(verdict)
    }

    /// The binding label for `situation`.
    pub fn estimate(&self, situation: &Situation) -> Result<Label, EnsembleError> {
        Ok(self.vote(situation)?.label)
    }
}
