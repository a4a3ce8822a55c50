use crate::errors::InputError;
use crate::model::{Check, CompiledAgainst};
use crate::schema::SchemaSnapshot;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Computes a deterministic fingerprint over the whole check-set.
///
/// Checks are canonicalized before hashing: object keys sorted, string values
/// whitespace-collapsed, target tables normalized to a sorted set, tags
/// sorted, and checks ordered by (check_id, check_name). Two registries that
/// differ only in formatting or declaration order hash identically.
pub fn fingerprint_checks(checks: &[Check]) -> String {
    let mut canon: Vec<(String, String, String)> = checks
        .iter()
        .map(|c| {
            let v = canonical_check(c);
            let s = serde_json::to_string(&v).unwrap_or_default();
            (c.check_id.trim().to_string(), c.check_name.trim().to_string(), s)
        })
        .collect();
    canon.sort();

    let raw = canon
        .into_iter()
        .map(|(_, _, s)| s)
        .collect::<Vec<_>>()
        .join("\n");
    sha256_hex(&raw)
}

/// Computes a fingerprint over the columns of `tables`.
///
/// Table names are sorted; column order is kept, so adding, removing,
/// renaming or reordering a referenced table's columns changes the hash while
/// unrelated tables never do. A table missing from `schemas` is an error.
pub fn fingerprint_schema(
    tables: &BTreeSet<String>,
    schemas: &SchemaSnapshot,
) -> Result<String, InputError> {
    let cols = restrict_schema(tables, schemas)?;
    Ok(hash_schema_cols(&cols))
}

pub fn hash_schema_cols(cols: &BTreeMap<String, Vec<String>>) -> String {
    let raw = cols
        .iter()
        .map(|(t, c)| {
            let c = serde_json::to_string(c).unwrap_or_default();
            format!("{t}={c}")
        })
        .collect::<Vec<_>>()
        .join("\n");
    sha256_hex(&raw)
}

/// The slice of `schemas` covering exactly `tables`.
pub fn restrict_schema(
    tables: &BTreeSet<String>,
    schemas: &SchemaSnapshot,
) -> Result<BTreeMap<String, Vec<String>>, InputError> {
    let mut out = BTreeMap::new();
    for t in tables {
        let cols = schemas
            .columns(t)
            .ok_or_else(|| InputError::UnknownTable { table: t.clone() })?;
        out.insert(t.clone(), cols.to_vec());
    }
    Ok(out)
}

/// Fingerprint record for `check` against the current inputs.
pub fn compiled_against(
    check: &Check,
    checks_hash: &str,
    schemas: &SchemaSnapshot,
) -> Result<CompiledAgainst, InputError> {
    let targets = check.targets()?;
    Ok(CompiledAgainst {
        checks_hash: checks_hash.to_string(),
        schema_cols: restrict_schema(&targets, schemas)?,
    })
}

fn canonical_check(check: &Check) -> Value {
    let mut v = serde_json::to_value(check).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut v {
        // Both authoring forms of target_table must hash the same.
        if let Ok(targets) = check.targets() {
            map.insert(
                "target_table".into(),
                Value::Array(targets.into_iter().map(Value::String).collect()),
            );
        }
        if let Some(Value::Array(tags)) = map.get_mut("tags") {
            tags.sort_by_key(|t| canonical_string(t));
        }
    }
    canonicalize(v)
}

/// Sorted keys and collapsed whitespace, recursively. Keys are re-inserted in
/// sorted order so the result is stable even with serde_json's
/// `preserve_order` feature enabled somewhere in the build.
fn canonicalize(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k.trim().to_string(), canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::String(s) => Value::String(collapse_whitespace(&s)),
        other => other,
    }
}

fn canonical_string(v: &Value) -> String {
    match v {
        Value::String(s) => collapse_whitespace(s),
        other => other.to_string(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetTables;

    fn check(id: &str, name: &str, target: TargetTables) -> Check {
        Check {
            check_id: id.into(),
            check_name: name.into(),
            description: Some("Distinct users drop day over day".into()),
            calculation_hint: Some("compare last two days".into()),
            target_table: target,
            severity: Some("high".into()),
            enabled: true,
            owner: Some("data-eng".into()),
            tags: vec!["daily".into(), "events".into()],
            extra: BTreeMap::new(),
        }
    }

    fn schemas(pairs: &[(&str, &[&str])]) -> SchemaSnapshot {
        SchemaSnapshot::from_tables(
            pairs
                .iter()
                .map(|(t, cols)| (t.to_string(), cols.iter().map(|c| c.to_string()).collect())),
        )
    }

    #[test]
    fn check_fingerprint_ignores_order_whitespace_and_target_form() {
        let a = check("CHK-001", "A", TargetTables::Csv("users, events".into()));
        let b = check("CHK-002", "B", TargetTables::Csv("orders".into()));

        let mut a2 = check("CHK-001", "A", TargetTables::List(vec!["events".into(), "users".into()]));
        a2.description = Some("  Distinct users   drop day\nover day ".into());
        a2.tags = vec!["events".into(), "daily".into()];

        assert_eq!(
            fingerprint_checks(&[a.clone(), b.clone()]),
            fingerprint_checks(&[b, a2])
        );
    }

    #[test]
    fn check_fingerprint_changes_on_content_change() {
        let a = check("CHK-001", "A", TargetTables::Csv("users".into()));
        let mut a2 = a.clone();
        a2.calculation_hint = Some("compare last three days".into());
        assert_ne!(fingerprint_checks(&[a.clone()]), fingerprint_checks(&[a2]));

        let mut a3 = a.clone();
        a3.extra.insert("threshold_pct".into(), serde_json::json!(20));
        assert_ne!(fingerprint_checks(&[a]), fingerprint_checks(&[a3]));
    }

    #[test]
    fn schema_fingerprint_scoped_to_targets() {
        let targets: BTreeSet<String> = ["users".to_string()].into();
        let base = schemas(&[("users", &["id", "email"]), ("events", &["id", "ts"])]);
        let other_changed = schemas(&[("events", &["id", "ts", "kind"]), ("users", &["id", "email"])]);
        assert_eq!(
            fingerprint_schema(&targets, &base).unwrap(),
            fingerprint_schema(&targets, &other_changed).unwrap()
        );

        for cols in [
            &["id", "email", "signup_at"][..],
            &["id"][..],
            &["id", "mail"][..],
            &["email", "id"][..],
        ] {
            let changed = schemas(&[("users", cols), ("events", &["id", "ts"])]);
            assert_ne!(
                fingerprint_schema(&targets, &base).unwrap(),
                fingerprint_schema(&targets, &changed).unwrap(),
                "columns {:?} must change the hash",
                cols
            );
        }
    }

    #[test]
    fn schema_fingerprint_surfaces_missing_table() {
        let targets: BTreeSet<String> = ["orders".to_string()].into();
        let err = fingerprint_schema(&targets, &schemas(&[("users", &["id"])])).unwrap_err();
        assert_eq!(
            err,
            InputError::UnknownTable {
                table: "orders".into()
            }
        );
    }
}
