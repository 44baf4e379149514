//! Durable memory of investigations.
//!
//! Backed by a [`RotatingStore`] in array layout with whole-file overwrites,
//! because retention has to look at the nested `situation.start_timestamp`.
//! Indices address the well-formed investigations returned by
//! [`MemoryStore::read_all`]; malformed entries stay in the file untouched.

use crate::config::Config;
use crate::core::{Investigation, Label};
use crate::store::rotating::{RotatingStore, StoreError, StoreLayout};
use serde_json::Value;
use std::path::PathBuf;

/// Timestamp path used for memory retention.
pub const MEMORY_TIMESTAMP_PATH: &str = "situation.start_timestamp";

#[derive(Debug, Clone)]
pub struct MemoryStore {
    store: RotatingStore,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>, retention_weeks: u32) -> Self {
        Self::from_store(RotatingStore::new(
            path,
            StoreLayout::json_array(MEMORY_TIMESTAMP_PATH),
            retention_weeks,
        ))
    }

    /// Memory at the configured path, archiving into the configured directory.
    pub fn from_config(config: &Config) -> Self {
        Self::from_store(
            RotatingStore::new(
                config.memory_path(),
                StoreLayout::json_array(MEMORY_TIMESTAMP_PATH),
                config.memory_retention_weeks,
            )
            .with_archive_dir(config.archive_dir()),
        )
    }

    /// Wrap a pre-configured store (archive dir, reference time).
    pub fn from_store(store: RotatingStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RotatingStore {
        &self.store
    }

    /// All investigations in stored order.
    pub fn read_all(&self) -> Result<Vec<Investigation>, StoreError> {
        self.store.read()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Append an investigation and return its index.
    pub fn append(&self, investigation: &Investigation) -> Result<usize, StoreError> {
        let encoded = serde_json::to_value(investigation)?;
        let index = self.store.update_records(|raw| {
            let index = well_formed_positions(raw).len();
            raw.push(encoded);
            Ok(index)
        })?;

        tracing::info!(
            index,
            estimate = %investigation.estimate,
            start = investigation.situation.start_timestamp,
            "investigation stored"
        );
        Ok(index)
    }

    /// Replace the investigation at `index`, leaving every other record and
    /// the count unchanged.
    pub fn update_at(&self, index: usize, investigation: &Investigation) -> Result<(), StoreError> {
        let encoded = serde_json::to_value(investigation)?;
        self.store.update_records(|raw| {
            let position = position_of(raw, index)?;
            raw[position] = encoded;
            Ok(())
        })?;

        tracing::info!(index, estimate = %investigation.estimate, "investigation corrected");
        Ok(())
    }

    /// Set the estimate of the investigation at `index` and return the
    /// corrected record. Lookup and write happen against one rotated view.
    pub fn update_estimate_at(&self, index: usize, estimate: Label) -> Result<Investigation, StoreError> {
        let corrected = self.store.update_records(|raw| {
            let position = position_of(raw, index)?;
            let mut investigation: Investigation = serde_json::from_value(raw[position].clone())?;
            investigation.estimate = estimate;
            raw[position] = serde_json::to_value(&investigation)?;
            Ok(investigation)
        })?;

        tracing::info!(index, estimate = %corrected.estimate, "investigation corrected");
        Ok(corrected)
    }
}

/// Raw positions of the well-formed investigations, in stored order.
fn well_formed_positions(raw: &[Value]) -> Vec<usize> {
    raw.iter()
        .enumerate()
        .filter(|(_, value)| serde_json::from_value::<Investigation>((*value).clone()).is_ok())
        .map(|(position, _)| position)
        .collect()
}

fn position_of(raw: &[Value], index: usize) -> Result<usize, StoreError> {
    let positions = well_formed_positions(raw);
    positions
        .get(index)
        .copied()
        .ok_or(StoreError::IndexOutOfRange {
            index,
            len: positions.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Situation;
    use crate::events::RawEvent;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn investigation(start: i64, estimate: Label) -> Investigation {
        Investigation::new(
            Situation {
                situation_description: format!("situation at {start}"),
                result: Label::Unknown,
                start_timestamp: start,
                end_timestamp: start + 60,
                details: vec![RawEvent::new(start, "hall"), RawEvent::new(start + 60, "hall")],
            },
            estimate,
        )
    }

    fn recent() -> i64 {
        Utc::now().timestamp() - 3600
    }

    #[test]
    fn test_append_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::new(dir.path().join("memory.json"), 52);
        assert!(memory.is_empty().unwrap());

        assert_eq!(memory.append(&investigation(recent(), Label::Normal)).unwrap(), 0);
        assert_eq!(memory.append(&investigation(recent() + 1, Label::Anomalous)).unwrap(), 1);

        let all = memory.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].estimate, Label::Anomalous);
    }

    #[test]
    fn test_update_at_touches_only_target() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::new(dir.path().join("memory.json"), 52);
        for i in 0..4 {
            memory.append(&investigation(recent() + i, Label::Normal)).unwrap();
        }
        let before = memory.read_all().unwrap();

        let mut corrected = before[2].clone();
        corrected.estimate = Label::Anomalous;
        memory.update_at(2, &corrected).unwrap();

        let after = memory.read_all().unwrap();
        assert_eq!(after.len(), before.len());
        for (i, (b, a)) in before.iter().zip(after.iter()).enumerate() {
            if i == 2 {
                assert_eq!(a.estimate, Label::Anomalous);
                assert_eq!(a.situation, b.situation);
            } else {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_update_out_of_range_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let memory = MemoryStore::new(&path, 52);
        memory.append(&investigation(recent(), Label::Normal)).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        let err = memory
            .update_at(3, &investigation(recent(), Label::Anomalous))
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexOutOfRange { index: 3, len: 1 }));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_malformed_entries_survive_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let memory = MemoryStore::new(&path, 52);
        let good = serde_json::to_value(investigation(recent(), Label::Normal)).unwrap();
        let doc = serde_json::json!([{"estimate": "normal"}, good]);
        std::fs::write(&path, doc.to_string()).unwrap();

        assert_eq!(memory.len().unwrap(), 1);
        memory
            .update_at(0, &investigation(recent(), Label::Anomalous))
            .unwrap();

        let raw: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0], serde_json::json!({"estimate": "normal"}));
        assert_eq!(raw[1]["estimate"], "anomalous");
    }

    #[test]
    fn test_expired_investigations_are_archived() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let memory = MemoryStore::from_store(
            RotatingStore::new(
                dir.path().join("memory.json"),
                StoreLayout::json_array(MEMORY_TIMESTAMP_PATH),
                52,
            )
            .with_reference_time(now),
        );
        let old = (now - Duration::weeks(60)).timestamp();
        let fresh = (now - Duration::days(1)).timestamp();

        memory.append(&investigation(old, Label::Normal)).unwrap();
        memory.append(&investigation(fresh, Label::Normal)).unwrap();

        let all = memory.read_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].situation.start_timestamp, fresh);
        assert!(dir.path().join("archives").join("archive_2024_03_02.json").exists());
    }

    #[test]
    fn test_mutation_sees_one_rotated_view() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let ticks = Arc::new(AtomicI64::new(0));
        let clock = {
            let ticks = Arc::clone(&ticks);
            move || now + Duration::seconds(ticks.fetch_add(1, Ordering::SeqCst))
        };
        let memory = MemoryStore::from_store(
            RotatingStore::new(
                dir.path().join("memory.json"),
                StoreLayout::json_array(MEMORY_TIMESTAMP_PATH),
                52,
            )
            .with_retention(Duration::seconds(100))
            .with_clock(clock),
        );

        // expires as soon as the clock moves past its first reading
        let edge = now.timestamp() - 100;
        std::fs::write(
            dir.path().join("memory.json"),
            serde_json::to_vec(&[investigation(edge, Label::Normal)]).unwrap(),
        )
        .unwrap();

        assert_eq!(memory.append(&investigation(now.timestamp(), Label::Normal)).unwrap(), 1);
        assert!(!dir.path().join("archives").exists());

        // the next operation archives the edge record, leaving one live copy
        let corrected = memory.update_estimate_at(0, Label::Anomalous).unwrap();
        assert_eq!(corrected.situation.start_timestamp, now.timestamp());

        let live = memory.store().read_records().unwrap();
        let archive = dir.path().join("archives").join("archive_2025_02_28.json");
        let archived: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(archive).unwrap()).unwrap();
        let start_of = |v: &Value| v["situation"]["start_timestamp"].as_i64().unwrap();
        assert_eq!(live.iter().map(start_of).collect::<Vec<_>>(), vec![now.timestamp()]);
        assert_eq!(archived.iter().map(start_of).collect::<Vec<_>>(), vec![edge]);
        assert_eq!(live[0]["estimate"], "anomalous");
    }

    #[test]
    fn test_update_estimate_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let memory = MemoryStore::new(&path, 52);
        memory.append(&investigation(recent(), Label::Normal)).unwrap();
        memory.append(&investigation(recent() + 1, Label::Normal)).unwrap();
        let before = memory.read_all().unwrap();

        let corrected = memory.update_estimate_at(1, Label::Anomalous).unwrap();
        assert_eq!(corrected.situation, before[1].situation);

        let after = memory.read_all().unwrap();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1].estimate, Label::Anomalous);

        let bytes = std::fs::read(&path).unwrap();
        assert!(matches!(
            memory.update_estimate_at(2, Label::Normal),
            Err(StoreError::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }
}
