//! Alert delivery for anomalous investigations.

use crate::config::{ConfigError, NotifierConfig};
use crate::core::Investigation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel '{channel}' failed: {message}")]
    Delivery { channel: String, message: String },
}

/// A channel anomalies are pushed to.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn notify(&self, investigation: &Investigation) -> Result<(), NotifyError>;
}

/// Writes alerts to the log stream.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, investigation: &Investigation) -> Result<(), NotifyError> {
        tracing::warn!(
            start = investigation.situation.start_timestamp,
            end = investigation.situation.end_timestamp,
            "{}",
            investigation.alert_text()
        );
        Ok(())
    }
}

#[cfg(feature = "remote")]
pub use pushover::PushoverNotifier;

#[cfg(feature = "remote")]
mod pushover {
    use super::{Notifier, NotifyError};
    use crate::config::{require_env, ConfigError};
    use crate::core::Investigation;
    use crate::remote::{BlockingRemoteClient, RemoteConfig};
    use serde::Serialize;

    pub const PUSHOVER_ENDPOINT: &str = "https://api.pushover.net/1/messages.json";

    #[derive(Serialize)]
    struct Message<'a> {
        token: &'a str,
        user: &'a str,
        title: &'a str,
        message: &'a str,
        priority: i8,
    }

    /// Pushover push notifications.
    ///
    /// Reads `PUSHOVER_USER` and `PUSHOVER_TOKEN` from the environment.
    pub struct PushoverNotifier {
        user: String,
        token: String,
        title: String,
        client: BlockingRemoteClient,
    }

    impl PushoverNotifier {
        pub fn from_env() -> Result<Self, ConfigError> {
            let user = require_env("PUSHOVER_USER")?;
            let token = require_env("PUSHOVER_TOKEN")?;
            Self::new(user, token)
        }

        pub fn new(user: String, token: String) -> Result<Self, ConfigError> {
            let host = hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            let client = BlockingRemoteClient::new(RemoteConfig::new(PUSHOVER_ENDPOINT, None))
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Ok(Self {
                user,
                token,
                title: format!("care-agent on {host}"),
                client,
            })
        }
    }

    impl Notifier for PushoverNotifier {
        fn name(&self) -> &str {
            "pushover"
        }

        fn notify(&self, investigation: &Investigation) -> Result<(), NotifyError> {
            let text = investigation.alert_text();
            let message = Message {
                token: &self.token,
                user: &self.user,
                title: &self.title,
                message: &text,
                priority: 1,
            };
            self.client
                .post_form(&message)
                .map_err(|e| NotifyError::Delivery {
                    channel: self.name().to_string(),
                    message: e.to_string(),
                })
        }
    }
}

/// Build the configured notifier.
pub fn build_notifier(config: &NotifierConfig) -> Result<Box<dyn Notifier>, ConfigError> {
    match config {
        NotifierConfig::Log => Ok(Box::new(LogNotifier)),
        #[cfg(feature = "remote")]
        NotifierConfig::Pushover => Ok(Box::new(PushoverNotifier::from_env()?)),
        #[cfg(not(feature = "remote"))]
        NotifierConfig::Pushover => Err(ConfigError::Invalid(
            "pushover notifications require the `remote` feature".to_string(),
        )),
    }
}
