//! End-to-end runs against on-disk stores.

use care_agent::config::Config;
use care_agent::core::{event_log, Label};
use care_agent::events::RawEvent;
use care_agent::orchestrator::{Orchestrator, RunOutcome};
use care_agent::store::MemoryStore;
use chrono::{Duration, Utc};
use std::io::Write;
use tempfile::TempDir;

const HOUR: i64 = 3600;

fn config_in(dir: &TempDir) -> Config {
    Config {
        data_path: dir.path().to_path_buf(),
        ..Config::default()
    }
}

/// 08:00 UTC three days ago.
fn base() -> i64 {
    let now = Utc::now().timestamp();
    now - now.rem_euclid(24 * HOUR) - 3 * 24 * HOUR + 8 * HOUR
}

fn persisted_start(outcome: RunOutcome) -> i64 {
    match outcome {
        RunOutcome::Persisted { investigation, .. } => investigation.situation.start_timestamp,
        RunOutcome::NoNewData => panic!("expected an investigation"),
    }
}

#[test]
fn twenty_events_in_five_hours_make_one_investigation() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let base = base();

    let events: Vec<RawEvent> = (0..20)
        .map(|i| RawEvent::new(base + i * 15 * 60, if i % 2 == 0 { "kitchen" } else { "hall" }))
        .collect();
    event_log(&config).append(&events).unwrap();

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    match orchestrator.run().unwrap() {
        RunOutcome::Persisted {
            index,
            investigation,
            ..
        } => {
            assert_eq!(index, 0);
            assert_eq!(investigation.situation.details.len(), 20);
            assert_eq!(investigation.situation.start_timestamp, base);
            assert_eq!(investigation.situation.end_timestamp, base + 19 * 15 * 60);
            assert!(investigation.situation.is_consistent());
            assert_ne!(investigation.estimate, Label::Unknown);
        }
        RunOutcome::NoNewData => panic!("expected an investigation"),
    }

    assert_eq!(orchestrator.run().unwrap(), RunOutcome::NoNewData);
    assert_eq!(MemoryStore::from_config(&config).len().unwrap(), 1);
}

#[test]
fn seven_hour_gap_splits_into_two_investigations() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let base = base();

    let mut timestamps: Vec<i64> = (0..4).map(|i| base + i * HOUR).collect();
    timestamps.extend((0..4).map(|i| base + 10 * HOUR + i * HOUR));
    let events: Vec<RawEvent> = timestamps.iter().map(|&t| RawEvent::new(t, "hall")).collect();
    event_log(&config).append(&events).unwrap();

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let mut starts = vec![
        persisted_start(orchestrator.run().unwrap()),
        persisted_start(orchestrator.run().unwrap()),
    ];
    starts.sort_unstable();

    assert_eq!(starts, vec![base, base + 10 * HOUR]);
    assert_eq!(orchestrator.run().unwrap(), RunOutcome::NoNewData);
}

#[test]
fn double_encoded_lines_are_read() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let base = base();

    let plain = serde_json::to_string(&RawEvent::new(base, "kitchen")).unwrap();
    let inner = serde_json::to_string(&RawEvent::new(base + 60, "hall")).unwrap();
    let wrapped = serde_json::to_string(&inner).unwrap();
    let mut file = std::fs::File::create(config.event_log_path()).unwrap();
    writeln!(file, "{plain}").unwrap();
    writeln!(file, "{wrapped}").unwrap();
    writeln!(file, "not json at all").unwrap();
    drop(file);

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    match orchestrator.run().unwrap() {
        RunOutcome::Persisted { investigation, .. } => {
            assert_eq!(investigation.situation.details.len(), 2);
            assert_eq!(investigation.situation.details[1].room, "hall");
        }
        RunOutcome::NoNewData => panic!("expected an investigation"),
    }
}

#[test]
fn expired_events_are_archived_not_investigated() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let base = base();
    let expired = (Utc::now() - Duration::weeks(60)).timestamp();

    let events = vec![
        RawEvent::new(expired, "kitchen"),
        RawEvent::new(expired + 60, "kitchen"),
        RawEvent::new(base, "hall"),
    ];
    // Write directly so nothing rotates before the run
    let lines: String = events
        .iter()
        .map(|e| serde_json::to_string(e).unwrap() + "\n")
        .collect();
    std::fs::write(config.event_log_path(), lines).unwrap();

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    assert_eq!(persisted_start(orchestrator.run().unwrap()), base);
    assert_eq!(orchestrator.run().unwrap(), RunOutcome::NoNewData);

    let archives: Vec<_> = std::fs::read_dir(config.archive_dir())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "jsonl"))
        .collect();
    assert_eq!(archives.len(), 1);

    let archived = std::fs::read_to_string(&archives[0]).unwrap();
    assert_eq!(archived.lines().count(), 2);
    let live = std::fs::read_to_string(config.event_log_path()).unwrap();
    assert_eq!(live.lines().count(), 1);
}

#[test]
fn producer_attributes_reach_situation_details() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let base = base();

    event_log(&config)
        .append(&[
            RawEvent::new(base, "pillbox").with_attribute("onOff", serde_json::json!(true)),
            RawEvent::new(base + 120, "pillbox").with_attribute("onOff", serde_json::json!(false)),
        ])
        .unwrap();

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let details = match orchestrator.run().unwrap() {
        RunOutcome::Persisted { investigation, .. } => investigation.situation.details,
        RunOutcome::NoNewData => panic!("expected an investigation"),
    };
    let states: Vec<Option<bool>> = details.iter().map(RawEvent::is_on).collect();
    assert_eq!(states, vec![Some(true), Some(false)]);
}

#[test]
fn corrected_investigation_is_not_reinvestigated() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let base = base();

    event_log(&config)
        .append(&[RawEvent::new(base, "hall"), RawEvent::new(base + 300, "kitchen")])
        .unwrap();

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    orchestrator.run().unwrap();

    let memory = MemoryStore::from_config(&config);
    let mut investigation = memory.read_all().unwrap().remove(0);
    investigation.estimate = Label::Anomalous;
    memory.update_at(0, &investigation).unwrap();

    assert_eq!(orchestrator.run().unwrap(), RunOutcome::NoNewData);
    let stored = memory.read_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].estimate, Label::Anomalous);
    assert!(memory.update_at(1, &investigation).is_err());
}
