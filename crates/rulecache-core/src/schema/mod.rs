//! Schema snapshots: the column list of every known table.
//!
//! The persisted snapshot is an observability baseline only ("which tables
//! changed since the last run"). Cache validity never consults it; the
//! scheduler compares live-derived columns against what each ledger entry
//! was compiled against.

pub mod diff;

pub use diff::{SchemaDiff, TableChange};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Table name -> ordered column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaSnapshot {
    pub tables: BTreeMap<String, Vec<String>>,
}

impl SchemaSnapshot {
    pub fn from_tables<I>(tables: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        Self {
            tables: tables.into_iter().collect(),
        }
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn insert(&mut self, table: impl Into<String>, columns: Vec<String>) {
        self.tables.insert(table.into(), columns);
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Derive the current snapshot from a directory of CSV table sources.
///
/// Every `<table>.csv` directly under `data_dir` contributes one table (name
/// lowercased) whose columns are the header row. Tables without a file, or
/// whose header cannot be read, are absent; checks targeting them fail on
/// their own as unknown tables.
pub fn derive(data_dir: &Path) -> Result<SchemaSnapshot> {
    let mut snapshot = SchemaSnapshot::default();
    if !data_dir.exists() {
        tracing::warn!(event = "schema.data_dir_missing", data_dir = %data_dir.display());
        return Ok(snapshot);
    }

    let entries = std::fs::read_dir(data_dir)
        .with_context(|| format!("failed to list data dir {}", data_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv || !path.is_file() {
            continue;
        }
        let Some(table) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match read_header(&path) {
            Ok(columns) => snapshot.insert(table.to_lowercase(), columns),
            Err(e) => tracing::warn!(
                event = "schema.table_unreadable",
                table = %table.to_lowercase(),
                path = %path.display(),
                error = %format!("{:#}", e)
            ),
        }
    }
    Ok(snapshot)
}

fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open table source {}", path.display()))?;
    let headers = rdr
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?;
    Ok(headers.iter().map(str::to_string).collect())
}

/// Last-persisted snapshot on disk.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<SchemaSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read schema snapshot {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse schema snapshot {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &SchemaSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        crate::storage::write_atomic(&self.path, &json)
    }
}
