pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  cache_key TEXT NOT NULL,
  kind TEXT NOT NULL,
  artifact_json TEXT NOT NULL,
  compiled_at TEXT NOT NULL,
  compiled_against_json TEXT NOT NULL,
  authoritative INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_ledger_entries_key ON ledger_entries(cache_key, id);

CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);
"#;

pub const SCHEMA_VERSION: &str = "1";
