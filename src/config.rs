//! Configuration for the care agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Width of one investigation window, in hours.
pub const DEFAULT_WINDOW_HOURS: u64 = 6;

/// At most this many candidate situations are estimated per run. Bounds both
/// run latency and external-call spend.
pub const MAX_CANDIDATES_PER_RUN: usize = 5;

/// Summarizer calls allowed per candidate slot in one scan, failures included.
pub const SUMMARY_ATTEMPTS_PER_CANDIDATE: usize = 2;

/// Number of investigations persisted by a successful run.
pub const INVESTIGATIONS_PERSISTED_PER_RUN: usize = 1;

/// Default retention horizon for both the event log and memory.
pub const DEFAULT_RETENTION_WEEKS: u32 = 52;

/// Longest accepted retention horizon (about a century).
pub const MAX_RETENTION_WEEKS: u32 = 52 * 100;

/// Longest accepted window.
pub const MAX_WINDOW_HOURS: u64 = 24 * 7;

/// Default delay between runs in `watch` and `serve` mode.
pub const DEFAULT_RUN_INTERVAL_SECS: u64 = 30;

/// Main configuration for the care agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Duration of each investigation window
    #[serde(with = "duration_serde")]
    pub window_duration: Duration,

    /// Directory holding the event log, memory and run stats
    pub data_path: PathBuf,

    /// Directory for rotated archives (defaults to `<data_path>/archives`)
    pub archive_path: Option<PathBuf>,

    /// Retention horizon for raw events, in weeks
    pub event_retention_weeks: u32,

    /// Retention horizon for investigations, in weeks
    pub memory_retention_weeks: u32,

    /// Candidate cap per run
    pub max_candidates_per_run: usize,

    /// Delay between runs in watch/serve mode (in seconds)
    pub run_interval_secs: u64,

    /// IANA timezone of the monitored home
    pub timezone: String,

    /// Voters of the estimator ensemble
    pub estimators: Vec<EstimatorConfig>,

    /// Situation summarizer
    pub summarizer: SummarizerConfig,

    /// Alert delivery channel
    pub notifier: NotifierConfig,

    /// Port for the viewer server
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("care-agent");

        Self {
            window_duration: Duration::from_secs(DEFAULT_WINDOW_HOURS * 3600),
            data_path: data_dir,
            archive_path: None,
            event_retention_weeks: DEFAULT_RETENTION_WEEKS,
            memory_retention_weeks: DEFAULT_RETENTION_WEEKS,
            max_candidates_per_run: MAX_CANDIDATES_PER_RUN,
            run_interval_secs: DEFAULT_RUN_INTERVAL_SECS,
            timezone: "UTC".to_string(),
            estimators: EstimatorConfig::default_ensemble(),
            summarizer: SummarizerConfig::Digest,
            notifier: NotifierConfig::Log,
            server_port: 7860,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("care-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        std::fs::create_dir_all(self.archive_dir()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Line-delimited raw event log.
    pub fn event_log_path(&self) -> PathBuf {
        self.data_path.join("events.jsonl")
    }

    /// JSON-array investigation memory.
    pub fn memory_path(&self) -> PathBuf {
        self.data_path.join("memory.json")
    }

    /// Persisted run statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("run_stats.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.archive_path
            .clone()
            .unwrap_or_else(|| self.data_path.join("archives"))
    }

    /// Parse the configured timezone.
    pub fn tz(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", self.timezone)))
    }

    /// Check the settings that would otherwise fail halfway through a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        if self.estimators.is_empty() {
            return Err(ConfigError::Missing("at least one estimator".to_string()));
        }
        if self.window_duration.is_zero() {
            return Err(ConfigError::Invalid("window_duration must be positive".to_string()));
        }
        if self.window_duration.as_secs() > MAX_WINDOW_HOURS * 3600 {
            return Err(ConfigError::Invalid(format!(
                "window_duration must not exceed {MAX_WINDOW_HOURS} hours"
            )));
        }
        for (name, weeks) in [
            ("event_retention_weeks", self.event_retention_weeks),
            ("memory_retention_weeks", self.memory_retention_weeks),
        ] {
            if weeks == 0 || weeks > MAX_RETENTION_WEEKS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 1 and {MAX_RETENTION_WEEKS}"
                )));
            }
        }
        if self.max_candidates_per_run == 0 || self.max_candidates_per_run > MAX_CANDIDATES_PER_RUN {
            return Err(ConfigError::Invalid(format!(
                "max_candidates_per_run must be between 1 and {MAX_CANDIDATES_PER_RUN}"
            )));
        }
        Ok(())
    }
}

/// One voter of the estimator ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorConfig {
    /// Flags activity during local night hours.
    NightActivity {
        start_hour: u32,
        end_hour: u32,
        max_events: usize,
    },
    /// Flags long stretches without any sensor event.
    Inactivity { max_gap_secs: i64 },
    /// Flags erratic event spacing.
    Irregularity {
        max_gap_cv: f64,
        rapid_transition_secs: i64,
        max_rapid_ratio: f64,
    },
    /// Adopts the summarizer's own result hint.
    SummaryHint,
    /// Delegates to an HTTP classifier.
    Remote {
        url: String,
        #[serde(default)]
        token: Option<String>,
    },
}

impl EstimatorConfig {
    /// Three local voters, so ties cannot happen out of the box.
    pub fn default_ensemble() -> Vec<Self> {
        vec![
            EstimatorConfig::NightActivity {
                start_hour: 23,
                end_hour: 5,
                max_events: 6,
            },
            EstimatorConfig::Inactivity {
                max_gap_secs: 4 * 3600,
            },
            EstimatorConfig::Irregularity {
                max_gap_cv: 2.5,
                rapid_transition_secs: 120,
                max_rapid_ratio: 0.8,
            },
        ]
    }
}

/// How candidate windows are turned into situations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummarizerConfig {
    /// Local, deterministic digest of the window.
    Digest,
    /// External summarization service.
    Remote {
        url: String,
        #[serde(default)]
        token: Option<String>,
    },
}

/// Where anomaly alerts go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Write alerts to the log stream only.
    Log,
    /// Pushover push notifications; credentials come from the environment.
    Pushover,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Missing configuration: {0}")]
    Missing(String),
}

/// Read a required credential from the environment.
pub fn require_env(name: &str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(format!("environment variable {name}"))),
    }
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window_duration, Duration::from_secs(6 * 3600));
        assert_eq!(config.max_candidates_per_run, 5);
        assert_eq!(config.event_retention_weeks, 52);
        assert_eq!(config.memory_retention_weeks, 52);
        assert_eq!(config.estimators.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"timezone": "Europe/Amsterdam", "window_duration": 3600}"#)
                .unwrap();
        assert_eq!(config.window_duration, Duration::from_secs(3600));
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Amsterdam);
        assert_eq!(config.notifier, NotifierConfig::Log);
    }

    #[test]
    fn test_estimator_config_tagging() {
        let parsed: Vec<EstimatorConfig> = serde_json::from_str(
            r#"[{"kind": "inactivity", "max_gap_secs": 60}, {"kind": "summary_hint"}]"#,
        )
        .unwrap();
        assert_eq!(parsed[0], EstimatorConfig::Inactivity { max_gap_secs: 60 });
        assert_eq!(parsed[1], EstimatorConfig::SummaryHint);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.estimators.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_validate_bounds_retention_and_window() {
        let mut config = Config::default();
        config.event_retention_weeks = 20_000_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.memory_retention_weeks = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.memory_retention_weeks = MAX_RETENTION_WEEKS;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.window_duration = Duration::from_secs((MAX_WINDOW_HOURS + 1) * 3600);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let mut config = Config::default();
        config.data_path = PathBuf::from("/tmp/care");
        assert_eq!(config.event_log_path(), PathBuf::from("/tmp/care/events.jsonl"));
        assert_eq!(config.memory_path(), PathBuf::from("/tmp/care/memory.json"));
        assert_eq!(config.archive_dir(), PathBuf::from("/tmp/care/archives"));
    }
}
