use super::{CheckHistory, Ledger, LedgerSnapshot, OpenMode};
use crate::model::{CacheKey, LedgerEntry};
use anyhow::Context;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Ledger persisted as one JSON document:
/// `{"<check_id>::<check_name>": [entry, ...], ...}`.
///
/// Entries are kept as raw JSON so records this version cannot parse are
/// carried forward untouched on every rewrite. Each append rewrites the file
/// through a temp file and rename. The in-process mutex serializes writers;
/// this backend does not coordinate between processes.
pub struct JsonLedger {
    path: PathBuf,
    mode: OpenMode,
    state: Mutex<BTreeMap<String, Value>>,
}

impl JsonLedger {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Self::open_with(path, OpenMode::ReadWrite)
    }

    /// Read-only views never move, create or rewrite the file. An unparsable
    /// file is reported and read as empty.
    pub fn open_read_only(path: &Path) -> anyhow::Result<Self> {
        Self::open_with(path, OpenMode::ReadOnly)
    }

    fn open_with(path: &Path, mode: OpenMode) -> anyhow::Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read ledger {}", path.display()))?;
            match serde_json::from_str::<BTreeMap<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) if raw.trim().is_empty() => {
                    tracing::debug!(event = "ledger.empty_file", error = %e);
                    BTreeMap::new()
                }
                Err(e) if mode == OpenMode::ReadOnly => {
                    tracing::warn!(
                        event = "ledger.corrupt",
                        path = %path.display(),
                        error = %e,
                        "ledger file unparsable; left in place"
                    );
                    BTreeMap::new()
                }
                Err(e) => {
                    let aside = quarantine_path(path);
                    std::fs::rename(path, &aside).with_context(|| {
                        format!("failed to move corrupt ledger to {}", aside.display())
                    })?;
                    tracing::warn!(
                        event = "ledger.corrupt",
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "ledger file unparsable; starting a new one"
                    );
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn quarantine_path(path: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{}", stamp));
    path.with_file_name(name)
}

fn parse_history(raw: &Value) -> CheckHistory {
    let mut history = CheckHistory::default();
    let Some(items) = raw.as_array() else {
        history.push_unreadable();
        return history;
    };
    for item in items {
        match serde_json::from_value::<LedgerEntry>(item.clone()) {
            Ok(e) => history.entries.push(e),
            Err(_) => history.push_unreadable(),
        }
    }
    history
}

impl Ledger for JsonLedger {
    fn history(&self, key: &CacheKey) -> anyhow::Result<CheckHistory> {
        let state = self.state.lock().unwrap();
        Ok(state.get(key.as_str()).map(parse_history).unwrap_or_default())
    }

    fn snapshot(&self) -> anyhow::Result<LedgerSnapshot> {
        let state = self.state.lock().unwrap();
        Ok(state
            .iter()
            .map(|(k, v)| (CacheKey::from(k.as_str()), parse_history(v)))
            .collect())
    }

    fn append_cycle(&self, key: &CacheKey, entries: &[LedgerEntry]) -> anyhow::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if self.mode == OpenMode::ReadOnly {
            anyhow::bail!("ledger {} is open read-only", self.path.display());
        }
        let mut state = self.state.lock().unwrap();
        let mut next = state.clone();

        let slot = next
            .entry(key.as_str().to_string())
            .or_insert_with(|| Value::Array(vec![]));
        if !slot.is_array() {
            // keep whatever was stored there as the first (unreadable) record
            let old = std::mem::take(slot);
            *slot = Value::Array(vec![old]);
        }
        if let Value::Array(items) = slot {
            for e in entries {
                items.push(serde_json::to_value(e)?);
            }
        }

        let bytes = serde_json::to_vec_pretty(&next)?;
        crate::storage::write_atomic(&self.path, &bytes)?;
        *state = next;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_file_is_moved_aside() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("workflows.json");
        std::fs::write(&path, "{not json")?;

        let ledger = JsonLedger::open(&path)?;
        assert!(ledger.snapshot()?.is_empty());
        assert!(!path.exists());
        let moved: Vec<_> = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(moved.len(), 1);
        Ok(())
    }

    #[test]
    fn non_array_key_counts_as_unreadable() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("workflows.json");
        std::fs::write(&path, r#"{"CHK-001::A": {"oops": true}, "CHK-002::B": [{"type": "plan"}]}"#)?;

        let ledger = JsonLedger::open(&path)?;
        let snap = ledger.snapshot()?;
        assert_eq!(snap[&CacheKey::from("CHK-001::A")].unreadable, vec![0]);
        assert_eq!(snap[&CacheKey::from("CHK-002::B")].unreadable, vec![0]);
        Ok(())
    }

    #[test]
    fn read_only_open_leaves_an_unparsable_file_in_place() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("workflows.json");
        std::fs::write(&path, "{not json")?;

        let ledger = JsonLedger::open_read_only(&path)?;
        assert!(ledger.snapshot()?.is_empty());
        assert_eq!(std::fs::read_to_string(&path)?, "{not json");
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

        let err = ledger
            .append_cycle(&CacheKey::from("CHK-001::A"), &[entry()])
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert_eq!(std::fs::read_to_string(&path)?, "{not json");
        Ok(())
    }

    fn entry() -> LedgerEntry {
        LedgerEntry {
            kind: crate::model::EntryKind::Plan,
            artifact: serde_json::json!({"steps": []}),
            compiled_at: chrono::Utc::now(),
            compiled_against: crate::model::CompiledAgainst {
                checks_hash: "h".into(),
                schema_cols: Default::default(),
            },
            authoritative: true,
        }
    }
}
