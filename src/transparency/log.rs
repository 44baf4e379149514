//! Run log.
//!
//! Counts what the agent did across runs so caregivers can see how often it
//! looked, how many situations it judged and how many alerts went out. Holds
//! no situation content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for orchestrator runs.
#[derive(Debug)]
pub struct RunLog {
    /// Runs started
    runs_started: AtomicU64,
    /// Runs that persisted an investigation
    runs_completed: AtomicU64,
    /// Runs that found nothing new
    runs_without_data: AtomicU64,
    /// Runs aborted by an error
    runs_failed: AtomicU64,
    /// Candidate situations put to the ensemble
    situations_estimated: AtomicU64,
    /// Persisted investigations judged anomalous
    anomalies_flagged: AtomicU64,
    /// Alerts delivered
    notifications_sent: AtomicU64,
    /// Alerts that failed to deliver
    notifications_failed: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_without_data: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            situations_estimated: AtomicU64::new(0),
            anomalies_flagged: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a run log that resumes from and saves to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous run stats");
        }

        log
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_new_data(&self) {
        self.runs_without_data.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_situations_estimated(&self, count: u64) {
        self.situations_estimated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self) {
        self.anomalies_flagged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self, delivered: bool) {
        if delivered {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.notifications_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_without_data: self.runs_without_data.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            situations_estimated: self.situations_estimated.load(Ordering::Relaxed),
            anomalies_flagged: self.anomalies_flagged.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Run Statistics:\n\
             - Runs started: {}\n\
             - Investigations stored: {}\n\
             - Runs with no new data: {}\n\
             - Runs failed: {}\n\
             - Situations estimated: {}\n\
             - Anomalies flagged: {}\n\
             - Alerts sent: {} ({} failed)\n\
             - Session duration: {} seconds",
            stats.runs_started,
            stats.runs_completed,
            stats.runs_without_data,
            stats.runs_failed,
            stats.situations_estimated,
            stats.anomalies_flagged,
            stats.notifications_sent,
            stats.notifications_failed,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                runs_started: stats.runs_started,
                runs_completed: stats.runs_completed,
                runs_without_data: stats.runs_without_data,
                runs_failed: stats.runs_failed,
                situations_estimated: stats.situations_estimated,
                anomalies_flagged: stats.anomalies_flagged,
                notifications_sent: stats.notifications_sent,
                notifications_failed: stats.notifications_failed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.runs_started.store(persisted.runs_started, Ordering::Relaxed);
                self.runs_completed.store(persisted.runs_completed, Ordering::Relaxed);
                self.runs_without_data
                    .store(persisted.runs_without_data, Ordering::Relaxed);
                self.runs_failed.store(persisted.runs_failed, Ordering::Relaxed);
                self.situations_estimated
                    .store(persisted.situations_estimated, Ordering::Relaxed);
                self.anomalies_flagged
                    .store(persisted.anomalies_flagged, Ordering::Relaxed);
                self.notifications_sent
                    .store(persisted.notifications_sent, Ordering::Relaxed);
                self.notifications_failed
                    .store(persisted.notifications_failed, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of run statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_without_data: u64,
    pub runs_failed: u64,
    pub situations_estimated: u64,
    pub anomalies_flagged: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    runs_started: u64,
    runs_completed: u64,
    #[serde(default)]
    runs_without_data: u64,
    runs_failed: u64,
    #[serde(default)]
    situations_estimated: u64,
    #[serde(default)]
    anomalies_flagged: u64,
    #[serde(default)]
    notifications_sent: u64,
    #[serde(default)]
    notifications_failed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared run log.
pub type SharedRunLog = Arc<RunLog>;

pub fn create_shared_log() -> SharedRunLog {
    Arc::new(RunLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedRunLog {
    Arc::new(RunLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_counting() {
        let log = RunLog::new();

        log.record_run_started();
        log.record_run_started();
        log.record_run_completed();
        log.record_no_new_data();
        log.record_situations_estimated(4);
        log.record_notification(true);
        log.record_notification(false);

        let stats = log.stats();
        assert_eq!(stats.runs_started, 2);
        assert_eq!(stats.runs_completed, 1);
        assert_eq!(stats.runs_without_data, 1);
        assert_eq!(stats.situations_estimated, 4);
        assert_eq!(stats.notifications_sent, 1);
        assert_eq!(stats.notifications_failed, 1);
    }

    #[test]
    fn test_run_log_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_stats.json");

        let log = RunLog::with_persistence(path.clone());
        log.record_run_started();
        log.record_anomaly();
        log.save().unwrap();

        let resumed = RunLog::with_persistence(path);
        let stats = resumed.stats();
        assert_eq!(stats.runs_started, 1);
        assert_eq!(stats.anomalies_flagged, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = RunLog::new().summary();
        assert!(summary.contains("Runs started: 0"));
        assert!(summary.contains("Alerts sent: 0 (0 failed)"));
    }
}
