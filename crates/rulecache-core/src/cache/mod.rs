//! Append-only ledger of compiled artifacts, keyed by check.
//!
//! "Current" is never stored: it is always resolved from the tail of a key's
//! history as the latest well-formed plan/execution pair.

pub mod json;
pub mod sqlite;

pub use json::JsonLedger;
pub use sqlite::SqliteLedger;

use crate::model::{CacheKey, EntryKind, ExecutionArtifact, LedgerEntry};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub trait Ledger: Send + Sync {
    /// Full history of one key, oldest first.
    fn history(&self, key: &CacheKey) -> anyhow::Result<CheckHistory>;

    /// Histories of every key.
    fn snapshot(&self) -> anyhow::Result<LedgerSnapshot>;

    /// Append all entries of one compile cycle atomically: readers observe
    /// either none or all of them.
    fn append_cycle(&self, key: &CacheKey, entries: &[LedgerEntry]) -> anyhow::Result<()>;

    fn backend_name(&self) -> &'static str;
}

pub type LedgerSnapshot = BTreeMap<CacheKey, CheckHistory>;

/// Entries of one key plus the positions of stored records that failed to
/// parse. A position is the number of readable entries stored before the
/// record, so `entries.len()` means "after everything readable".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckHistory {
    pub entries: Vec<LedgerEntry>,
    pub unreadable: Vec<usize>,
}

/// What the tail of a history means for freshness.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a> {
    Empty,
    Corrupt(String),
    /// Latest entry records a capability failure.
    NonAuthoritative(&'a LedgerEntry),
    Current(CurrentPair<'a>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentPair<'a> {
    pub plan: &'a LedgerEntry,
    pub execution: &'a LedgerEntry,
    pub artifact: ExecutionArtifact,
}

impl CheckHistory {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.unreadable.is_empty()
    }

    /// Record an unparsable stored record at the current position.
    pub fn push_unreadable(&mut self) {
        self.unreadable.push(self.entries.len());
    }

    pub fn latest(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Resolve the tail. Unreadable records older than the latest plan entry
    /// are superseded by it and do not matter; one inside or after the tail
    /// pair makes the history corrupt.
    pub fn resolve(&self) -> Resolved<'_> {
        let n = self.entries.len();
        let trailing = self.unreadable.iter().filter(|&&p| p + 1 >= n).count();
        if trailing > 0 {
            return Resolved::Corrupt(format!(
                "{} unreadable ledger entr{}",
                trailing,
                if trailing == 1 { "y" } else { "ies" }
            ));
        }
        let Some(last) = self.entries.last() else {
            return Resolved::Empty;
        };
        if !last.authoritative {
            return Resolved::NonAuthoritative(last);
        }
        if last.kind == EntryKind::Plan {
            return Resolved::Corrupt(format!(
                "plan entry compiled at {} has no execution entry",
                last.compiled_at.to_rfc3339()
            ));
        }

        let n = self.entries.len();
        let plan = match n.checked_sub(2).map(|i| &self.entries[i]) {
            Some(p) if p.kind == EntryKind::Plan && p.authoritative && p.same_cycle(last) => p,
            _ => {
                return Resolved::Corrupt(format!(
                    "execution entry compiled at {} is not paired with a matching plan entry",
                    last.compiled_at.to_rfc3339()
                ))
            }
        };

        match last.execution_artifact() {
            Some(artifact) => Resolved::Current(CurrentPair {
                plan,
                execution: last,
                artifact,
            }),
            None => Resolved::Corrupt("execution artifact has no readable result".into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadWrite,
    /// Inspection only: nothing on disk is created, moved or appended to.
    ReadOnly,
}

/// Pick a backend from the file extension: `.db`, `.sqlite`, `.sqlite3` use
/// SQLite, anything else the JSON ledger file.
pub fn open_ledger(path: &Path) -> anyhow::Result<Arc<dyn Ledger>> {
    open_ledger_with(path, OpenMode::ReadWrite)
}

pub fn open_ledger_read_only(path: &Path) -> anyhow::Result<Arc<dyn Ledger>> {
    open_ledger_with(path, OpenMode::ReadOnly)
}

pub fn open_ledger_with(path: &Path, mode: OpenMode) -> anyhow::Result<Arc<dyn Ledger>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let sqlite = matches!(ext.as_deref(), Some("db") | Some("sqlite") | Some("sqlite3"));
    match (sqlite, mode) {
        (true, OpenMode::ReadWrite) => Ok(Arc::new(SqliteLedger::open(path)?)),
        (true, OpenMode::ReadOnly) => Ok(Arc::new(SqliteLedger::open_read_only(path)?)),
        (false, OpenMode::ReadWrite) => Ok(Arc::new(JsonLedger::open(path)?)),
        (false, OpenMode::ReadOnly) => Ok(Arc::new(JsonLedger::open_read_only(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompiledAgainst;
    use chrono::{TimeZone, Utc};

    fn against(hash: &str) -> CompiledAgainst {
        CompiledAgainst {
            checks_hash: hash.into(),
            schema_cols: [("users".to_string(), vec!["id".to_string()])].into(),
        }
    }

    fn entry(kind: EntryKind, secs: i64, hash: &str, authoritative: bool) -> LedgerEntry {
        let artifact = match kind {
            EntryKind::Plan => serde_json::json!({"steps": []}),
            EntryKind::Execution => serde_json::json!({
                "python_repls": [{"code": "print('PASS')", "stdout": "PASS", "exit_code": 0}],
                "result": {"status": "PASS", "summary": "PASS"}
            }),
        };
        LedgerEntry {
            kind,
            artifact,
            compiled_at: Utc.timestamp_opt(secs, 0).unwrap(),
            compiled_against: against(hash),
            authoritative,
        }
    }

    #[test]
    fn latest_pair_is_current() {
        let h = CheckHistory {
            entries: vec![
                entry(EntryKind::Plan, 1, "a", true),
                entry(EntryKind::Execution, 1, "a", true),
                entry(EntryKind::Plan, 2, "b", true),
                entry(EntryKind::Execution, 2, "b", true),
            ],
            unreadable: vec![],
        };
        match h.resolve() {
            Resolved::Current(pair) => {
                assert_eq!(pair.plan.compiled_against.checks_hash, "b");
                assert_eq!(pair.artifact.result.summary, "PASS");
            }
            other => panic!("expected current pair, got {:?}", other),
        }
    }

    #[test]
    fn dangling_or_mismatched_pairs_are_corrupt() {
        let dangling = CheckHistory {
            entries: vec![entry(EntryKind::Plan, 1, "a", true)],
            unreadable: vec![],
        };
        assert!(matches!(dangling.resolve(), Resolved::Corrupt(_)));

        let mismatched = CheckHistory {
            entries: vec![
                entry(EntryKind::Plan, 1, "a", true),
                entry(EntryKind::Execution, 1, "b", true),
            ],
            unreadable: vec![],
        };
        assert!(matches!(mismatched.resolve(), Resolved::Corrupt(_)));

        let orphan = CheckHistory {
            entries: vec![entry(EntryKind::Execution, 1, "a", true)],
            unreadable: vec![],
        };
        assert!(matches!(orphan.resolve(), Resolved::Corrupt(_)));

        let unreadable_tail = CheckHistory {
            entries: vec![
                entry(EntryKind::Plan, 1, "a", true),
                entry(EntryKind::Execution, 1, "a", true),
            ],
            unreadable: vec![2],
        };
        assert!(matches!(unreadable_tail.resolve(), Resolved::Corrupt(_)));

        let inside_pair = CheckHistory {
            entries: unreadable_tail.entries.clone(),
            unreadable: vec![1],
        };
        assert!(matches!(inside_pair.resolve(), Resolved::Corrupt(_)));
    }

    #[test]
    fn unreadable_records_before_the_latest_pair_are_superseded() {
        let h = CheckHistory {
            entries: vec![
                entry(EntryKind::Plan, 1, "a", true),
                entry(EntryKind::Execution, 1, "a", true),
                entry(EntryKind::Plan, 2, "b", true),
                entry(EntryKind::Execution, 2, "b", true),
            ],
            unreadable: vec![0, 2],
        };
        match h.resolve() {
            Resolved::Current(pair) => assert_eq!(pair.plan.compiled_against.checks_hash, "b"),
            other => panic!("expected current pair, got {:?}", other),
        }
        assert!(!h.is_empty());
    }

    #[test]
    fn failed_tail_is_non_authoritative() {
        let h = CheckHistory {
            entries: vec![
                entry(EntryKind::Plan, 1, "a", true),
                entry(EntryKind::Execution, 1, "a", true),
                entry(EntryKind::Plan, 2, "a", false),
            ],
            unreadable: vec![],
        };
        assert!(matches!(h.resolve(), Resolved::NonAuthoritative(_)));
        assert!(matches!(CheckHistory::default().resolve(), Resolved::Empty));
    }
}
