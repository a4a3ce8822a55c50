use super::{CheckHistory, Ledger, LedgerSnapshot};
use crate::model::{CacheKey, CompiledAgainst, EntryKind, LedgerEntry};
use crate::storage::store::Store;
use rusqlite::params;
use std::path::Path;

/// Ledger backed by the SQLite store. One compile cycle is one transaction,
/// which also makes appends safe across processes.
#[derive(Clone)]
pub struct SqliteLedger {
    store: Store,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let store = Store::open(path)?;
        store.init_schema()?;
        Ok(Self { store })
    }

    /// Opens an existing database without writing to it. A missing file reads
    /// as an empty ledger and is not created.
    pub fn open_read_only(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Self::memory();
        }
        Ok(Self {
            store: Store::open_read_only(path)?,
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let store = Store::memory()?;
        store.init_schema()?;
        Ok(Self { store })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

type RawRow = (String, String, String, String, String, bool);

fn parse_row(row: &RawRow) -> Option<LedgerEntry> {
    let (_key, kind, artifact, compiled_at, against, authoritative) = row;
    let kind = match kind.as_str() {
        "plan" => EntryKind::Plan,
        "execution" => EntryKind::Execution,
        _ => return None,
    };
    Some(LedgerEntry {
        kind,
        artifact: serde_json::from_str(artifact).ok()?,
        compiled_at: chrono::DateTime::parse_from_rfc3339(compiled_at)
            .ok()?
            .with_timezone(&chrono::Utc),
        compiled_against: serde_json::from_str::<CompiledAgainst>(against).ok()?,
        authoritative: *authoritative,
    })
}

fn push_row(history: &mut CheckHistory, row: &RawRow) {
    match parse_row(row) {
        Some(e) => history.entries.push(e),
        None => history.push_unreadable(),
    }
}

impl Ledger for SqliteLedger {
    fn history(&self, key: &CacheKey) -> anyhow::Result<CheckHistory> {
        let conn = self.store.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT cache_key, kind, artifact_json, compiled_at, compiled_against_json, authoritative
             FROM ledger_entries WHERE cache_key = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![key.as_str()], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
        })?;

        let mut history = CheckHistory::default();
        for row in rows {
            push_row(&mut history, &row?);
        }
        Ok(history)
    }

    fn snapshot(&self) -> anyhow::Result<LedgerSnapshot> {
        let conn = self.store.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT cache_key, kind, artifact_json, compiled_at, compiled_against_json, authoritative
             FROM ledger_entries ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
        })?;

        let mut snapshot = LedgerSnapshot::new();
        for row in rows {
            let row: RawRow = row?;
            let history = snapshot.entry(CacheKey::from(row.0.as_str())).or_default();
            push_row(history, &row);
        }
        Ok(snapshot)
    }

    fn append_cycle(&self, key: &CacheKey, entries: &[LedgerEntry]) -> anyhow::Result<()> {
        let mut conn = self.store.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO ledger_entries(cache_key, kind, artifact_json, compiled_at, compiled_against_json, authoritative)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for e in entries {
                stmt.execute(params![
                    key.as_str(),
                    e.kind.to_string(),
                    serde_json::to_string(&e.artifact)?,
                    e.compiled_at.to_rfc3339(),
                    serde_json::to_string(&e.compiled_against)?,
                    e.authoritative,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
