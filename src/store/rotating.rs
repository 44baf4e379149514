//! Append-only JSON record store with retention-based rotation.
//!
//! One logical file holds the live records. Before every operation the store
//! moves records older than the retention horizon into a dated archive file
//! next to it, so the live file only ever holds the retained window.
//!
//! Two physical layouts are supported behind the same interface:
//!
//! - [`StoreLayout::JsonLines`]: one JSON object per line, timestamp in a flat field
//! - [`StoreLayout::JsonArray`]: a single JSON array, timestamp behind a nested path
//!
//! The store assumes a single writer per file. Nothing here locks.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Physical layout of a store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLayout {
    /// One record per line; `timestamp_field` is a top-level key.
    JsonLines { timestamp_field: String },
    /// One JSON array; `timestamp_path` walks nested objects.
    JsonArray { timestamp_path: Vec<String> },
}

impl StoreLayout {
    /// Line layout keyed by a top-level `timestamp` field.
    pub fn json_lines() -> Self {
        StoreLayout::JsonLines {
            timestamp_field: "timestamp".to_string(),
        }
    }

    /// Array layout with a dotted timestamp path such as `situation.start_timestamp`.
    pub fn json_array(timestamp_path: &str) -> Self {
        StoreLayout::JsonArray {
            timestamp_path: timestamp_path.split('.').map(str::to_string).collect(),
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            StoreLayout::JsonLines { .. } => "jsonl",
            StoreLayout::JsonArray { .. } => "json",
        }
    }

    /// Locate the record's epoch-seconds timestamp.
    pub fn timestamp_of(&self, record: &Value) -> Option<i64> {
        let value = match self {
            StoreLayout::JsonLines { timestamp_field } => record.get(timestamp_field)?,
            StoreLayout::JsonArray { timestamp_path } => timestamp_path
                .iter()
                .try_fold(record, |node, key| node.get(key))?,
        };
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f.floor() as i64))
    }
}

/// Errors raised by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("index {index} out of range for {len} investigations")]
    IndexOutOfRange { index: usize, len: usize },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What a rotation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    /// Records moved into the archive
    pub archived: usize,
    /// Records left in the live file
    pub kept: usize,
    /// Archive that received the records, if any
    pub archive_file: Option<PathBuf>,
}

/// Source of "now" for rotation decisions.
#[derive(Clone, Default)]
enum Clock {
    #[default]
    Wall,
    Fixed(DateTime<Utc>),
    Custom(Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>),
}

impl Clock {
    fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Wall => Utc::now(),
            Clock::Fixed(at) => *at,
            Clock::Custom(f) => f(),
        }
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clock::Wall => f.write_str("Wall"),
            Clock::Fixed(at) => f.debug_tuple("Fixed").field(at).finish(),
            Clock::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Durable record store over one logical file.
#[derive(Debug, Clone)]
pub struct RotatingStore {
    path: PathBuf,
    archive_dir: PathBuf,
    layout: StoreLayout,
    retention: Duration,
    clock: Clock,
}

impl RotatingStore {
    /// Create a store at `path`, archiving into `<parent>/archives`.
    pub fn new(path: impl Into<PathBuf>, layout: StoreLayout, retention_weeks: u32) -> Self {
        let path = path.into();
        let archive_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("archives");

        Self {
            path,
            archive_dir,
            layout,
            retention: Duration::weeks(i64::from(retention_weeks)),
            clock: Clock::Wall,
        }
    }

    pub fn with_archive_dir(mut self, archive_dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = archive_dir.into();
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Pin "now" for rotation decisions instead of reading the wall clock.
    pub fn with_reference_time(mut self, at: DateTime<Utc>) -> Self {
        self.clock = Clock::Fixed(at);
        self
    }

    /// Read "now" from `clock` on every rotation decision.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Clock::Custom(Arc::new(clock));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Records strictly older than this are expired. Saturates at the
    /// earliest representable time for very long retention.
    fn cutoff(&self) -> DateTime<Utc> {
        self.now()
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Archive file that receives records rotated out at `cutoff`.
    pub fn archive_path_for(&self, cutoff: DateTime<Utc>) -> PathBuf {
        self.archive_dir.join(format!(
            "archive_{}.{}",
            cutoff.format("%Y_%m_%d"),
            self.layout.extension()
        ))
    }

    /// Move expired records into the dated archive.
    ///
    /// Records without a locatable timestamp stay live. When nothing has
    /// expired the live file is left untouched.
    pub fn rotate(&self) -> Result<RotationReport, StoreError> {
        if !self.path.exists() {
            return Ok(RotationReport::default());
        }

        let cutoff = self.cutoff();
        let cutoff_ts = cutoff.timestamp();
        let is_old = |record: &Value| {
            self.layout
                .timestamp_of(record)
                .map_or(false, |ts| ts < cutoff_ts)
        };

        match self.layout {
            StoreLayout::JsonLines { .. } => {
                let (old, kept): (Vec<String>, Vec<String>) = self
                    .read_lines()?
                    .into_iter()
                    .filter(|line| !line.trim().is_empty())
                    .partition(|line| decode_line(line).map_or(false, |v| is_old(&v)));

                if old.is_empty() {
                    return Ok(RotationReport {
                        kept: kept.len(),
                        ..Default::default()
                    });
                }

                let archive = self.archive_path_for(cutoff);
                append_lines(&archive, &old)?;
                write_atomic(&self.path, join_lines(&kept).as_bytes())?;

                tracing::info!(
                    path = ?self.path,
                    archive = ?archive,
                    archived = old.len(),
                    kept = kept.len(),
                    "rotated expired records"
                );
                Ok(RotationReport {
                    archived: old.len(),
                    kept: kept.len(),
                    archive_file: Some(archive),
                })
            }
            StoreLayout::JsonArray { .. } => {
                let Some(records) = self.load_array(&self.path)? else {
                    return Ok(RotationReport::default());
                };
                let (old, kept): (Vec<Value>, Vec<Value>) =
                    records.into_iter().partition(|record| is_old(record));

                if old.is_empty() {
                    return Ok(RotationReport {
                        kept: kept.len(),
                        ..Default::default()
                    });
                }

                let archive = self.archive_path_for(cutoff);
                let archived = old.len();
                let mut merged = self.load_array(&archive)?.unwrap_or_default();
                merged.extend(old);
                write_atomic(&archive, &serde_json::to_vec_pretty(&merged)?)?;
                write_atomic(&self.path, &serde_json::to_vec_pretty(&kept)?)?;

                tracing::info!(
                    path = ?self.path,
                    archive = ?archive,
                    archived,
                    kept = kept.len(),
                    "rotated expired records"
                );
                Ok(RotationReport {
                    archived,
                    kept: kept.len(),
                    archive_file: Some(archive),
                })
            }
        }
    }

    /// Read every live record in stored order. Malformed lines are skipped.
    pub fn read_records(&self) -> Result<Vec<Value>, StoreError> {
        self.rotate()?;
        self.load_live()
    }

    /// Rotate once, then hand the live records to `f` and write back what it
    /// leaves. Nothing is written when `f` fails.
    ///
    /// The read and the write see the same rotated view, so a record that
    /// expires while `f` runs is archived by the next operation instead of
    /// landing in both files. In the line layout, lines that fail to decode
    /// are not written back.
    pub fn update_records<R>(
        &self,
        f: impl FnOnce(&mut Vec<Value>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        self.rotate()?;
        let mut records = self.load_live()?;
        let result = f(&mut records)?;
        self.store_live(&records)?;
        Ok(result)
    }

    fn load_live(&self) -> Result<Vec<Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        match self.layout {
            StoreLayout::JsonLines { .. } => {
                let mut records = Vec::new();
                for (line_no, line) in self.read_lines()?.iter().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match decode_line(line) {
                        Ok(value) => records.push(value),
                        Err(e) => tracing::warn!(
                            path = ?self.path,
                            line = line_no + 1,
                            error = %e,
                            "skipping malformed record"
                        ),
                    }
                }
                Ok(records)
            }
            StoreLayout::JsonArray { .. } => Ok(self.load_array(&self.path)?.unwrap_or_default()),
        }
    }

    /// Read live records as `T`, skipping any that do not decode.
    pub fn read<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        let records = self.read_records()?;
        Ok(records
            .into_iter()
            .enumerate()
            .filter_map(|(position, value)| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(path = ?self.path, position, error = %e, "skipping malformed record");
                    None
                }
            })
            .collect())
    }

    /// Append records after the existing ones and flush to disk.
    pub fn append<T: Serialize>(&self, records: &[T]) -> Result<(), StoreError> {
        self.rotate()?;
        if records.is_empty() {
            return Ok(());
        }

        match self.layout {
            StoreLayout::JsonLines { .. } => {
                let lines = records
                    .iter()
                    .map(serde_json::to_string)
                    .collect::<Result<Vec<_>, _>>()?;
                append_lines(&self.path, &lines)
            }
            StoreLayout::JsonArray { .. } => {
                let mut existing = self.load_array(&self.path)?.unwrap_or_default();
                for record in records {
                    existing.push(serde_json::to_value(record)?);
                }
                write_atomic(&self.path, &serde_json::to_vec_pretty(&existing)?)
            }
        }
    }

    /// Replace the live contents with `records`.
    pub fn overwrite<T: Serialize>(&self, records: &[T]) -> Result<(), StoreError> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.overwrite_records(values)
    }

    /// Replace the live contents with already-encoded records.
    pub fn overwrite_records(&self, records: Vec<Value>) -> Result<(), StoreError> {
        self.rotate()?;
        self.store_live(&records)
    }

    fn store_live(&self, records: &[Value]) -> Result<(), StoreError> {
        match self.layout {
            StoreLayout::JsonLines { .. } => {
                let lines = records
                    .iter()
                    .map(serde_json::to_string)
                    .collect::<Result<Vec<_>, _>>()?;
                write_atomic(&self.path, join_lines(&lines).as_bytes())
            }
            StoreLayout::JsonArray { .. } => {
                write_atomic(&self.path, &serde_json::to_vec_pretty(records)?)
            }
        }
    }

    fn read_lines(&self) -> Result<Vec<String>, StoreError> {
        let content = fs::read_to_string(&self.path).map_err(io_err(&self.path))?;
        Ok(content.lines().map(str::to_string).collect())
    }

    /// Load an array file. `None` means the file was unusable and has been
    /// moved aside so the store can carry on without losing it.
    fn load_array(&self, path: &Path) -> Result<Option<Vec<Value>>, StoreError> {
        if !path.exists() {
            return Ok(Some(Vec::new()));
        }
        let content = fs::read_to_string(path).map_err(io_err(path))?;
        if content.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        match serde_json::from_str::<Vec<Value>>(&content) {
            Ok(records) => Ok(Some(records)),
            Err(e) => {
                let mut aside = path.as_os_str().to_owned();
                aside.push(format!(".corrupt.{}", self.now().timestamp()));
                let aside = PathBuf::from(aside);
                fs::rename(path, &aside).map_err(io_err(path))?;
                tracing::warn!(
                    path = ?path,
                    moved_to = ?aside,
                    error = %e,
                    "store file is not a JSON array; moved aside"
                );
                Ok(None)
            }
        }
    }
}

/// Decode one stored line, unwrapping producers that wrote JSON inside a JSON string.
fn decode_line(line: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str::<Value>(line)? {
        Value::String(inner) => serde_json::from_str(&inner),
        other => Ok(other),
    }
}

fn join_lines(lines: &[String]) -> String {
    let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
    }
    Ok(())
}

/// Append lines, making sure they start on a fresh line, and sync.
fn append_lines(path: &Path, lines: &[String]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;

    let mut prefix = String::new();
    let len = file.metadata().map_err(io_err(path))?.len();
    if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1)).map_err(io_err(path))?;
        file.read_exact(&mut last).map_err(io_err(path))?;
        if last[0] != b'\n' {
            prefix.push('\n');
        }
    }

    prefix.push_str(&join_lines(lines));
    file.write_all(prefix.as_bytes()).map_err(io_err(path))?;
    file.sync_all().map_err(io_err(path))
}

/// Replace `path` with `contents` via a synced temp file and rename.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    {
        let mut file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(contents).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
    }
    fs::rename(&tmp, path).map_err(io_err(path))
}
