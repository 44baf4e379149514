//! One investigation run, end to end.
//!
//! A run scans the event log for windows not yet in memory, puts up to
//! [`MAX_CANDIDATES_PER_RUN`] of them to the estimator ensemble, picks the
//! most concerning verdict, alerts on anomalies and persists exactly one
//! investigation. Any failure before persistence leaves memory untouched.
//!
//! Runs are synchronous. Callers must not run two orchestrators against the
//! same memory file at once.

use crate::config::{
    Config, ConfigError, INVESTIGATIONS_PERSISTED_PER_RUN, MAX_CANDIDATES_PER_RUN,
};
use crate::core::{
    build_summarizer, event_log, known_event_timestamps, rank_by_severity, EventWindower,
    Investigation, Label, ScanError, SituationRepository,
};
use crate::estimator::{EnsembleError, EstimatorEnsemble};
use crate::notify::{build_notifier, Notifier};
use crate::store::{MemoryStore, StoreError};
use crate::transparency::{create_shared_log, SharedRunLog};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Scanning,
    NoNewData,
    Investigating,
    Selecting,
    Notifying,
    Persisting,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Scanning => "scanning",
            RunPhase::NoNewData => "no new data",
            RunPhase::Investigating => "investigating",
            RunPhase::Selecting => "selecting",
            RunPhase::Notifying => "notifying",
            RunPhase::Persisting => "persisting",
        };
        write!(f, "{name}")
    }
}

/// Progress message streamed to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub run_id: Uuid,
    pub phase: RunPhase,
    pub detail: String,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every window is already in memory.
    NoNewData,
    /// One investigation was appended to memory.
    Persisted {
        run_id: Uuid,
        index: usize,
        investigation: Investigation,
        notified: bool,
    },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("memory unavailable: {0}")]
    Memory(#[from] StoreError),
    #[error("scan failed: {0}")]
    Scan(#[from] ScanError),
    #[error("estimation failed for situation starting at {start}: {source}")]
    Estimation {
        start: i64,
        #[source]
        source: EnsembleError,
    },
}

pub struct Orchestrator {
    repository: SituationRepository,
    ensemble: EstimatorEnsemble,
    notifier: Box<dyn Notifier>,
    memory: MemoryStore,
    max_candidates: usize,
    stats: SharedRunLog,
    progress: Option<Sender<Progress>>,
}

impl Orchestrator {
    pub fn new(
        repository: SituationRepository,
        ensemble: EstimatorEnsemble,
        notifier: Box<dyn Notifier>,
        memory: MemoryStore,
    ) -> Self {
        Self {
            repository,
            ensemble,
            notifier,
            memory,
            max_candidates: MAX_CANDIDATES_PER_RUN,
            stats: create_shared_log(),
            progress: None,
        }
    }

    /// Wire every collaborator from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let timezone = config.tz()?;

        let events = event_log(config);
        let memory = MemoryStore::from_config(config);

        let repository = SituationRepository::new(
            events,
            EventWindower::new(config.window_duration),
            build_summarizer(&config.summarizer, timezone)?,
        );
        let ensemble = EstimatorEnsemble::from_config(&config.estimators, timezone)?;
        let notifier = build_notifier(&config.notifier)?;

        tracing::info!(
            estimators = ?ensemble.names(),
            notifier = notifier.name(),
            timezone = %timezone,
            "orchestrator configured"
        );

        Ok(Self::new(repository, ensemble, notifier, memory)
            .with_max_candidates(config.max_candidates_per_run))
    }

    /// Lower the candidate cap; it never exceeds [`MAX_CANDIDATES_PER_RUN`].
    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max.clamp(1, MAX_CANDIDATES_PER_RUN);
        self
    }

    pub fn with_stats(mut self, stats: SharedRunLog) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_progress(mut self, sender: Sender<Progress>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn repository(&self) -> &SituationRepository {
        &self.repository
    }

    pub fn stats(&self) -> &SharedRunLog {
        &self.stats
    }

    /// Execute one run.
    pub fn run(&self) -> Result<RunOutcome, RunError> {
        let run_id = Uuid::new_v4();
        self.stats.record_run_started();

        let result = self.execute(run_id);
        match &result {
            Ok(RunOutcome::NoNewData) => self.stats.record_no_new_data(),
            Ok(RunOutcome::Persisted { .. }) => self.stats.record_run_completed(),
            Err(e) => {
                tracing::error!(%run_id, error = %e, "run aborted; memory unchanged");
                self.stats.record_run_failed();
            }
        }
        if let Err(e) = self.stats.save() {
            tracing::warn!(error = %e, "could not save run stats");
        }

        self.report(run_id, RunPhase::Idle, "run finished");
        result
    }

    fn execute(&self, run_id: Uuid) -> Result<RunOutcome, RunError> {
        self.report(run_id, RunPhase::Scanning, "reading memory and event log");
        let memory = self.memory.read_all()?;
        let known = known_event_timestamps(&memory);
        let candidates = self
            .repository
            .fetch_new_situations(&known, self.max_candidates)?;

        if candidates.is_empty() {
            tracing::info!(%run_id, known = known.len(), "no new situations");
            self.report(run_id, RunPhase::NoNewData, "every window already investigated");
            return Ok(RunOutcome::NoNewData);
        }

        self.report(
            run_id,
            RunPhase::Investigating,
            &format!("estimating {} situations", candidates.len()),
        );
        let mut investigations = Vec::with_capacity(candidates.len());
        for situation in candidates.into_iter().take(self.max_candidates) {
            let estimate = self
                .ensemble
                .estimate(&situation)
                .map_err(|source| RunError::Estimation {
                    start: situation.start_timestamp,
                    source,
                })?;
            investigations.push(Investigation::new(situation, estimate));
        }
        self.stats
            .record_situations_estimated(investigations.len() as u64);

        self.report(run_id, RunPhase::Selecting, "ranking by severity");
        let mut ranked = rank_by_severity(investigations);
        let discarded = ranked.len().saturating_sub(INVESTIGATIONS_PERSISTED_PER_RUN);
        ranked.truncate(INVESTIGATIONS_PERSISTED_PER_RUN);
        let Some(investigation) = ranked.pop() else {
            return Ok(RunOutcome::NoNewData);
        };
        tracing::info!(
            %run_id,
            discarded,
            estimate = %investigation.estimate,
            start = investigation.situation.start_timestamp,
            "selected most concerning situation"
        );

        let mut notified = false;
        if investigation.estimate == Label::Anomalous {
            self.stats.record_anomaly();
            self.report(run_id, RunPhase::Notifying, "sending alert");
            match self.notifier.notify(&investigation) {
                Ok(()) => notified = true,
                Err(e) => tracing::warn!(%run_id, error = %e, "alert not delivered"),
            }
            self.stats.record_notification(notified);
        }

        self.report(run_id, RunPhase::Persisting, "writing to memory");
        let index = self.memory.append(&investigation)?;
        tracing::info!(%run_id, index, notified, "run complete");

        Ok(RunOutcome::Persisted {
            run_id,
            index,
            investigation,
            notified,
        })
    }

    fn report(&self, run_id: Uuid, phase: RunPhase, detail: &str) {
        tracing::debug!(%run_id, %phase, detail);
        if let Some(sender) = &self.progress {
            // Viewers may come and go; a closed channel is not an error
            let _ = sender.send(Progress {
                run_id,
                phase,
                detail: detail.to_string(),
            });
        }
    }
}
