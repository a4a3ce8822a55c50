//! Check registry: the `checks.json` array authored by rule owners.

use crate::model::Check;
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

pub fn load_checks(path: &Path) -> Result<Vec<Check>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read check registry {}", path.display()))?;
    parse_checks(&raw).with_context(|| format!("invalid check registry {}", path.display()))
}

pub fn parse_checks(raw: &str) -> Result<Vec<Check>> {
    let checks: Vec<Check> = serde_json::from_str(raw).context("expected a JSON array of checks")?;

    let mut seen = BTreeSet::new();
    for c in &checks {
        if c.check_id.trim().is_empty() {
            bail!("check '{}' has an empty check_id", c.check_name);
        }
        if !seen.insert(c.key()) {
            bail!("duplicate check key '{}'", c.key());
        }
    }
    Ok(checks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_with_mixed_target_forms() {
        let checks = parse_checks(
            r#"[
              {"check_id": "CHK-001", "check_name": "A", "target_table": "users"},
              {"check_id": "CHK-002", "check_name": "B", "target_table": ["events", "users"], "enabled": false}
            ]"#,
        )
        .unwrap();
        assert_eq!(checks.len(), 2);
        assert!(!checks[1].enabled);
        assert_eq!(checks[1].targets().unwrap().len(), 2);
    }

    #[test]
    fn rejects_duplicates_and_non_arrays() {
        let dup = r#"[{"check_id": "C", "check_name": "A"}, {"check_id": "C", "check_name": "A"}]"#;
        assert!(parse_checks(dup).unwrap_err().to_string().contains("duplicate"));
        assert!(parse_checks(r#"{"check_id": "C"}"#).is_err());
    }
}
