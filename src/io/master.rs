//! Master copy persistence.
//!
//! The master copy is the last accepted version of a source's cleaned table.
//! It is stored as pretty JSON together with a SHA-256 content hash, which
//! doubles as the version token for optimistic concurrency: a commit only
//! goes through if the stored hash still matches what the run loaded.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{CleanTable, SourceKey};
use crate::error::StoreError;

/// Opaque version token of a stored master copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(pub String);

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRow {
    pub meta: BTreeMap<String, String>,
    pub values: BTreeMap<NaiveDate, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterCopy {
    pub key: SourceKey,
    pub last_updated: DateTime<Utc>,
    /// Hex SHA-256 of `periods` and `rows`.
    pub content_hash: String,
    pub id_columns: Vec<String>,
    pub periods: Vec<NaiveDate>,
    pub rows: BTreeMap<String, MasterRow>,
}

impl MasterCopy {
    /// Build a master copy from a freshly cleaned table.
    pub fn from_table(key: &SourceKey, table: &CleanTable, now: DateTime<Utc>) -> Self {
        let rows = table
            .rows
            .iter()
            .map(|r| {
                (
                    r.entity_id.clone(),
                    MasterRow {
                        meta: r.meta.clone(),
                        values: r.values.clone(),
                    },
                )
            })
            .collect();
        Self::sealed(key.clone(), now, table.id_columns.clone(), table.periods.clone(), rows)
    }

    /// Union of this copy and `table`; values from `table` win on overlap.
    ///
    /// Entities absent from `table` are kept unchanged.
    pub fn merged_with(&self, table: &CleanTable, now: DateTime<Utc>) -> Self {
        let mut rows = self.rows.clone();
        for r in &table.rows {
            let entry = rows.entry(r.entity_id.clone()).or_insert_with(|| MasterRow {
                meta: BTreeMap::new(),
                values: BTreeMap::new(),
            });
            entry.meta = r.meta.clone();
            entry.values.extend(r.values.iter().map(|(d, v)| (*d, *v)));
        }

        let mut periods = self.periods.clone();
        periods.extend(table.periods.iter().copied());
        periods.sort();
        periods.dedup();

        let id_columns = if table.id_columns.is_empty() {
            self.id_columns.clone()
        } else {
            table.id_columns.clone()
        };

        Self::sealed(self.key.clone(), now, id_columns, periods, rows)
    }

    fn sealed(
        key: SourceKey,
        now: DateTime<Utc>,
        id_columns: Vec<String>,
        periods: Vec<NaiveDate>,
        rows: BTreeMap<String, MasterRow>,
    ) -> Self {
        let content_hash = content_hash(&periods, &rows);
        Self {
            key,
            last_updated: now,
            content_hash,
            id_columns,
            periods,
            rows,
        }
    }

    pub fn version(&self) -> Version {
        Version(self.content_hash.clone())
    }

    /// Whether `content_hash` matches the stored content.
    pub fn verify(&self) -> bool {
        content_hash(&self.periods, &self.rows) == self.content_hash
    }

    pub fn value(&self, entity_id: &str, period: NaiveDate) -> Option<f64> {
        self.rows.get(entity_id)?.values.get(&period).copied()
    }
}

/// Hex SHA-256 over the canonical JSON of periods and rows.
///
/// `BTreeMap` ordering keeps the encoding stable across runs.
pub fn content_hash(periods: &[NaiveDate], rows: &BTreeMap<String, MasterRow>) -> String {
    let mut hasher = Sha256::new();
    if let Ok(bytes) = serde_json::to_vec(&(periods, rows)) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}

/// Versioned storage for master copies.
pub trait VersionedStore {
    fn load(&self, key: &SourceKey) -> Result<Option<(MasterCopy, Version)>, StoreError>;

    /// Replace the stored copy only if its version still equals `expected`
    /// (`None` meaning "nothing stored yet"). Returns whether the swap happened.
    fn compare_and_swap(
        &self,
        key: &SourceKey,
        expected: Option<&Version>,
        new: &MasterCopy,
    ) -> Result<bool, StoreError>;

    /// Human-readable location of the stored copy.
    fn location(&self, key: &SourceKey) -> String;
}

/// Master copies as JSON files under one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &SourceKey) -> PathBuf {
        self.dir.join(format!("{}_master.json", key.slug()))
    }

    fn read(&self, path: &Path) -> Result<Option<MasterCopy>, StoreError> {
        let display = path.display().to_string();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path: display, source }),
        };
        let copy: MasterCopy = serde_json::from_slice(&bytes).map_err(|source| StoreError::Serde {
            path: display.clone(),
            source,
        })?;
        if !copy.verify() {
            return Err(StoreError::Corrupt { path: display });
        }
        Ok(Some(copy))
    }
}

impl VersionedStore for FileStore {
    fn load(&self, key: &SourceKey) -> Result<Option<(MasterCopy, Version)>, StoreError> {
        Ok(self.read(&self.path_for(key))?.map(|copy| {
            let version = copy.version();
            (copy, version)
        }))
    }

    fn compare_and_swap(
        &self,
        key: &SourceKey,
        expected: Option<&Version>,
        new: &MasterCopy,
    ) -> Result<bool, StoreError> {
        let path = self.path_for(key);
        let current = self.read(&path)?.map(|c| c.version());
        if current.as_ref() != expected {
            return Ok(false);
        }

        let bytes = serde_json::to_vec_pretty(new).map_err(|source| StoreError::Serde {
            path: path.display().to_string(),
            source,
        })?;
        write_atomic(&path, &bytes)?;
        Ok(true)
    }

    fn location(&self, key: &SourceKey) -> String {
        self.path_for(key).display().to_string()
    }
}

/// Write to a PID-suffixed temp file, fsync, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }
    Ok(())
}

/// In-process store; keeps the serialized bytes so tests can compare them.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<SourceKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes for `key`, if any.
    pub fn raw_bytes(&self, key: &SourceKey) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn decode(key: &SourceKey, bytes: &[u8]) -> Result<MasterCopy, StoreError> {
        serde_json::from_slice(bytes).map_err(|source| StoreError::Serde {
            path: format!("memory://{key}"),
            source,
        })
    }
}

impl VersionedStore for MemoryStore {
    fn load(&self, key: &SourceKey) -> Result<Option<(MasterCopy, Version)>, StoreError> {
        let Some(bytes) = self.raw_bytes(key) else {
            return Ok(None);
        };
        let copy = Self::decode(key, &bytes)?;
        let version = copy.version();
        Ok(Some((copy, version)))
    }

    fn compare_and_swap(
        &self,
        key: &SourceKey,
        expected: Option<&Version>,
        new: &MasterCopy,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let current = match guard.get(key) {
            Some(bytes) => Some(Self::decode(key, bytes)?.version()),
            None => None,
        };
        if current.as_ref() != expected {
            return Ok(false);
        }
        let bytes = serde_json::to_vec_pretty(new).map_err(|source| StoreError::Serde {
            path: format!("memory://{key}"),
            source,
        })?;
        guard.insert(key.clone(), bytes);
        Ok(true)
    }

    fn location(&self, key: &SourceKey) -> String {
        format!("memory://{key}")
    }
}
