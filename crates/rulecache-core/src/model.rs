use crate::errors::InputError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A declared business rule, as read from the check registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    #[serde(alias = "id")]
    pub check_id: String,
    #[serde(alias = "name")]
    pub check_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_hint: Option<String>,
    #[serde(default)]
    pub target_table: TargetTables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Fields the registry carries that this crate does not interpret.
    /// They still participate in the check-set fingerprint.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl Check {
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.check_id, &self.check_name)
    }

    /// Normalized set of target tables (trimmed, lowercased, deduplicated).
    pub fn targets(&self) -> Result<BTreeSet<String>, InputError> {
        self.target_table.normalize()
    }
}

/// `target_table` may be authored as `"events, users"` or `["events", "users"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetTables {
    List(Vec<String>),
    Csv(String),
    Other(serde_json::Value),
}

impl Default for TargetTables {
    fn default() -> Self {
        TargetTables::Csv(String::new())
    }
}

impl TargetTables {
    pub fn normalize(&self) -> Result<BTreeSet<String>, InputError> {
        let raw: Vec<&str> = match self {
            TargetTables::List(items) => items.iter().map(String::as_str).collect(),
            TargetTables::Csv(s) => s.split(',').collect(),
            TargetTables::Other(v) => {
                return Err(InputError::MalformedTargets(format!(
                    "expected a string or a list of strings, found {}",
                    v
                )))
            }
        };

        // "users,,events" and ["users", " "] drop the blank item
        let names: BTreeSet<String> = raw
            .into_iter()
            .map(normalize_table)
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Err(InputError::MalformedTargets("no target tables declared".into()));
        }
        Ok(names)
    }
}

fn normalize_table(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Ledger key for a check: `"<check_id>::<check_name>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(check_id: &str, check_name: &str) -> Self {
        CacheKey(format!("{}::{}", check_id, check_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn check_id(&self) -> &str {
        self.0.split("::").next().unwrap_or(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        CacheKey(s.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        CacheKey(s)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    Error,
    Skipped,
}

impl CheckStatus {
    /// Search order matters: a line such as "PASS (0 errors)" is a pass.
    const TOKENS: [(&'static str, CheckStatus); 4] = [
        ("PASS", CheckStatus::Pass),
        ("FAIL", CheckStatus::Fail),
        ("SKIPPED", CheckStatus::Skipped),
        ("ERROR", CheckStatus::Error),
    ];

    /// First status token found in free-form output, if any.
    pub fn find_in(text: &str) -> Option<Self> {
        let upper = text.to_uppercase();
        Self::TOKENS
            .iter()
            .find(|(tok, _)| upper.contains(tok))
            .map(|(_, s)| *s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Error => "ERROR",
            CheckStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of generated code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRun {
    #[serde(alias = "python_repl")]
    pub code: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: CheckStatus,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_stdout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionArtifact {
    #[serde(default)]
    pub python_repls: Vec<CodeRun>,
    pub result: ExecutionResult,
}

impl ExecutionArtifact {
    /// Captured output of the last code run, for ERROR diagnostics.
    pub fn diagnostics(&self) -> Option<String> {
        let last = self.python_repls.last()?;
        let mut out = last.stdout.trim().to_string();
        if let Some(err) = last.stderr.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Plan,
    Execution,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Plan => f.write_str("plan"),
            EntryKind::Execution => f.write_str("execution"),
        }
    }
}

/// Inputs that justified a compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledAgainst {
    pub checks_hash: String,
    /// Only the tables the check targets, with their columns at compile time.
    pub schema_cols: BTreeMap<String, Vec<String>>,
}

impl CompiledAgainst {
    pub fn schema_hash(&self) -> String {
        crate::fingerprint::hash_schema_cols(&self.schema_cols)
    }

    /// Tables whose column list differs between `self` and `other`, including
    /// tables present on only one side.
    pub fn changed_tables(&self, other: &CompiledAgainst) -> Vec<String> {
        let mut names: BTreeSet<&String> = self.schema_cols.keys().collect();
        names.extend(other.schema_cols.keys());
        names
            .into_iter()
            .filter(|t| self.schema_cols.get(*t) != other.schema_cols.get(*t))
            .cloned()
            .collect()
    }
}

/// One append-only record in a check's ledger history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub artifact: serde_json::Value,
    pub compiled_at: DateTime<Utc>,
    pub compiled_against: CompiledAgainst,
    /// False when the entry records a planner/executor failure; such entries
    /// never count as current truth and force a retry.
    #[serde(default = "default_authoritative")]
    pub authoritative: bool,
}

fn default_authoritative() -> bool {
    true
}

impl LedgerEntry {
    pub fn execution_artifact(&self) -> Option<ExecutionArtifact> {
        if self.kind != EntryKind::Execution {
            return None;
        }
        serde_json::from_value(self.artifact.clone()).ok()
    }

    /// Failure detail carried by non-authoritative entries.
    pub fn failure(&self) -> Option<FailureRecord> {
        self.artifact
            .get("error")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether two entries were written by the same compile cycle.
    pub fn same_cycle(&self, other: &LedgerEntry) -> bool {
        self.compiled_at == other.compiled_at && self.compiled_against == other.compiled_against
    }
}

/// Stored under `artifact.error` when a compile cycle failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub class: crate::errors::ErrorClass,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_with(target: TargetTables) -> Check {
        Check {
            check_id: "CHK-001".into(),
            check_name: "A".into(),
            description: None,
            calculation_hint: None,
            target_table: target,
            severity: None,
            enabled: true,
            owner: None,
            tags: vec![],
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn csv_and_list_targets_normalize_identically() {
        let a = check_with(TargetTables::Csv(" Events, users ".into()));
        let b = check_with(TargetTables::List(vec!["users".into(), "events".into()]));
        assert_eq!(a.targets().unwrap(), b.targets().unwrap());
        assert_eq!(
            a.targets().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["events", "users"]
        );
    }

    #[test]
    fn empty_or_non_string_targets_are_malformed() {
        assert!(matches!(
            check_with(TargetTables::Csv(" , ".into())).targets(),
            Err(InputError::MalformedTargets(_))
        ));
        assert!(matches!(
            check_with(TargetTables::Other(serde_json::json!(42))).targets(),
            Err(InputError::MalformedTargets(_))
        ));
    }

    #[test]
    fn check_deserializes_both_target_forms_and_keeps_extras() {
        let c: Check = serde_json::from_value(serde_json::json!({
            "check_id": "CHK-002",
            "check_name": "Unknown users",
            "target_table": ["events", "users"],
            "threshold_pct": 20
        }))
        .unwrap();
        assert!(c.enabled);
        assert_eq!(c.extra.get("threshold_pct"), Some(&serde_json::json!(20)));
        assert_eq!(c.key().as_str(), "CHK-002::Unknown users");
        assert_eq!(c.key().check_id(), "CHK-002");

        let c: Check = serde_json::from_value(serde_json::json!({
            "id": "CHK-003",
            "name": "n",
            "target_table": 7
        }))
        .unwrap();
        assert_eq!(c.key().as_str(), "CHK-003::n");
        assert!(c.targets().is_err());
    }

    #[test]
    fn status_token_search_order() {
        assert_eq!(CheckStatus::find_in("pass: 0 errors"), Some(CheckStatus::Pass));
        assert_eq!(CheckStatus::find_in("FAIL: drop=31%"), Some(CheckStatus::Fail));
        assert_eq!(CheckStatus::find_in("all good"), None);
    }

    #[test]
    fn entry_authority_defaults_to_true() {
        let e: LedgerEntry = serde_json::from_value(serde_json::json!({
            "type": "plan",
            "artifact": {"steps": []},
            "compiled_at": "2026-01-01T00:00:00Z",
            "compiled_against": {"checks_hash": "abc", "schema_cols": {"users": ["id"]}}
        }))
        .unwrap();
        assert!(e.authoritative);
        assert_eq!(e.kind, EntryKind::Plan);
    }
}
