//! Estimator backed by an HTTP classifier.
//!
//! The situation is POSTed as JSON; the service answers with
//! `{"label": "normal" | "anomalous", "confidence": 0.0-1.0}`.

use crate::core::Situation;
use crate::estimator::{Estimate, Estimator, EstimatorError};
use crate::remote::{BlockingRemoteClient, RemoteConfig, RemoteError};

pub struct RemoteEstimator {
    name: String,
    client: BlockingRemoteClient,
}

impl RemoteEstimator {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let name = format!("remote:{}", config.host());
        Ok(Self {
            name,
            client: BlockingRemoteClient::new(config)?,
        })
    }
}

impl Estimator for RemoteEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn estimate(&self, situation: &Situation) -> Result<Estimate, EstimatorError> {
        let estimate: Estimate =
            self.client
                .post_json(situation)
                .map_err(|e| EstimatorError::Unavailable {
                    estimator: self.name.clone(),
                    message: e.to_string(),
                })?;
        Ok(Estimate::new(estimate.label, estimate.confidence))
    }
}
