//! Recompilation decisions. Pure: reads checks, schemas and ledger
//! histories, never calls a capability and never writes.

use crate::cache::{CheckHistory, LedgerSnapshot, Resolved};
use crate::fingerprint::{compiled_against, fingerprint_checks};
use crate::model::{CacheKey, Check};
use crate::schema::SchemaSnapshot;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Fresh,
    Stale { reason: StaleReason },
    Missing { reason: MissingReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StaleReason {
    ChecksChanged,
    SchemaChanged { tables: Vec<String> },
    /// Latest entry recorded a planner/executor failure.
    RetryAfterFailure,
    /// Targets cannot be resolved against the current tables; an attempt is
    /// forced so the problem is surfaced as an error instead of cached.
    Input { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MissingReason {
    NoEntries,
    Corrupt { detail: String },
}

impl Verdict {
    pub fn needs_compile(&self) -> bool {
        !matches!(self, Verdict::Fresh)
    }

    pub fn describe(&self) -> String {
        match self {
            Verdict::Fresh => "fresh".into(),
            Verdict::Stale { reason } => match reason {
                StaleReason::ChecksChanged => "stale: check-set changed".into(),
                StaleReason::SchemaChanged { tables } => {
                    format!("stale: schema changed ({})", tables.join(", "))
                }
                StaleReason::RetryAfterFailure => "stale: retrying after failure".into(),
                StaleReason::Input { message } => format!("stale: {}", message),
            },
            Verdict::Missing { reason } => match reason {
                MissingReason::NoEntries => "missing".into(),
                MissingReason::Corrupt { detail } => format!("missing: corrupt cache ({})", detail),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Schedule {
    pub checks_hash: String,
    pub stale: BTreeSet<CacheKey>,
    pub fresh: BTreeSet<CacheKey>,
    pub missing: BTreeSet<CacheKey>,
    /// Disabled checks: not evaluated, history left untouched.
    pub disabled: BTreeSet<CacheKey>,
    pub verdicts: BTreeMap<CacheKey, Verdict>,
}

impl Schedule {
    pub fn to_compile(&self) -> BTreeSet<CacheKey> {
        self.stale.union(&self.missing).cloned().collect()
    }

    /// Keys whose history was found corrupt, with the detail.
    pub fn corrupt(&self) -> Vec<(&CacheKey, &str)> {
        self.verdicts
            .iter()
            .filter_map(|(k, v)| match v {
                Verdict::Missing {
                    reason: MissingReason::Corrupt { detail },
                } => Some((k, detail.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// Decide for every enabled check whether its cached artifacts can be reused.
pub fn plan(checks: &[Check], schemas: &SchemaSnapshot, ledger: &LedgerSnapshot) -> Schedule {
    let checks_hash = fingerprint_checks(checks);
    let mut schedule = Schedule {
        checks_hash: checks_hash.clone(),
        ..Default::default()
    };

    for check in checks {
        let key = check.key();
        if !check.enabled {
            schedule.disabled.insert(key);
            continue;
        }

        let verdict = decide(check, &checks_hash, schemas, ledger.get(&key));
        tracing::debug!(event = "schedule.decided", key = %key, verdict = %verdict.describe());
        match &verdict {
            Verdict::Fresh => schedule.fresh.insert(key.clone()),
            Verdict::Stale { .. } => schedule.stale.insert(key.clone()),
            Verdict::Missing { reason } => {
                if let MissingReason::Corrupt { detail } = reason {
                    tracing::warn!(event = "ledger.corrupt", key = %key, detail = %detail);
                }
                schedule.missing.insert(key.clone())
            }
        };
        schedule.verdicts.insert(key, verdict);
    }
    schedule
}

/// Verdict for one enabled check given the check-set hash and its history.
pub fn decide(
    check: &Check,
    checks_hash: &str,
    schemas: &SchemaSnapshot,
    history: Option<&CheckHistory>,
) -> Verdict {
    let Some(history) = history.filter(|h| !h.is_empty()) else {
        return Verdict::Missing {
            reason: MissingReason::NoEntries,
        };
    };

    let pair = match history.resolve() {
        Resolved::Empty => {
            return Verdict::Missing {
                reason: MissingReason::NoEntries,
            }
        }
        Resolved::Corrupt(detail) => {
            return Verdict::Missing {
                reason: MissingReason::Corrupt { detail },
            }
        }
        Resolved::NonAuthoritative(_) => {
            return Verdict::Stale {
                reason: StaleReason::RetryAfterFailure,
            }
        }
        Resolved::Current(pair) => pair,
    };

    let current = match compiled_against(check, checks_hash, schemas) {
        Ok(c) => c,
        Err(e) => {
            return Verdict::Stale {
                reason: StaleReason::Input {
                    message: e.to_string(),
                },
            }
        }
    };

    let recorded = &pair.plan.compiled_against;
    if recorded.checks_hash != current.checks_hash {
        return Verdict::Stale {
            reason: StaleReason::ChecksChanged,
        };
    }
    if recorded.schema_cols != current.schema_cols {
        return Verdict::Stale {
            reason: StaleReason::SchemaChanged {
                tables: recorded.changed_tables(&current),
            },
        };
    }
    Verdict::Fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompiledAgainst, EntryKind, LedgerEntry, TargetTables};
    use chrono::Utc;

    fn check(id: &str, target: &str) -> Check {
        Check {
            check_id: id.into(),
            check_name: "A".into(),
            description: None,
            calculation_hint: None,
            target_table: TargetTables::Csv(target.into()),
            severity: None,
            enabled: true,
            owner: None,
            tags: vec![],
            extra: Default::default(),
        }
    }

    fn pair(against: CompiledAgainst, authoritative: bool) -> Vec<LedgerEntry> {
        let at = Utc::now();
        vec![
            LedgerEntry {
                kind: EntryKind::Plan,
                artifact: serde_json::json!({"steps": []}),
                compiled_at: at,
                compiled_against: against.clone(),
                authoritative,
            },
            LedgerEntry {
                kind: EntryKind::Execution,
                artifact: serde_json::json!({"python_repls": [], "result": {"status": "PASS", "summary": "ok"}}),
                compiled_at: at,
                compiled_against: against,
                authoritative,
            },
        ]
    }

    fn schemas(users: &[&str]) -> SchemaSnapshot {
        SchemaSnapshot::from_tables([
            ("users".to_string(), users.iter().map(|s| s.to_string()).collect()),
            ("events".to_string(), vec!["user_id".to_string()]),
        ])
    }

    #[test]
    fn disabled_checks_are_excluded() {
        let mut c = check("CHK-001", "users");
        c.enabled = false;
        let s = plan(&[c.clone()], &schemas(&["id"]), &LedgerSnapshot::new());
        assert!(s.disabled.contains(&c.key()));
        assert!(s.verdicts.is_empty());
        assert!(s.to_compile().is_empty());
    }

    #[test]
    fn fresh_then_schema_change_is_stale() {
        let c = check("CHK-001", "users");
        let s0 = schemas(&["id", "email"]);
        let hash = fingerprint_checks(&[c.clone()]);
        let history = CheckHistory {
            entries: pair(compiled_against(&c, &hash, &s0).unwrap(), true),
            unreadable: vec![],
        };

        assert_eq!(decide(&c, &hash, &s0, Some(&history)), Verdict::Fresh);
        assert_eq!(
            decide(&c, &hash, &schemas(&["id", "email", "signup_at"]), Some(&history)),
            Verdict::Stale {
                reason: StaleReason::SchemaChanged {
                    tables: vec!["users".into()]
                }
            }
        );
        assert_eq!(
            decide(&c, "other-hash", &s0, Some(&history)),
            Verdict::Stale {
                reason: StaleReason::ChecksChanged
            }
        );
    }

    #[test]
    fn non_authoritative_tail_forces_retry_even_when_inputs_match() {
        let c = check("CHK-001", "users");
        let s0 = schemas(&["id"]);
        let hash = fingerprint_checks(&[c.clone()]);
        let history = CheckHistory {
            entries: pair(compiled_against(&c, &hash, &s0).unwrap(), false),
            unreadable: vec![],
        };
        assert_eq!(
            decide(&c, &hash, &s0, Some(&history)),
            Verdict::Stale {
                reason: StaleReason::RetryAfterFailure
            }
        );
    }

    #[test]
    fn unknown_table_with_history_is_stale() {
        let c = check("CHK-001", "users");
        let s0 = schemas(&["id"]);
        let hash = fingerprint_checks(&[c.clone()]);
        let history = CheckHistory {
            entries: pair(compiled_against(&c, &hash, &s0).unwrap(), true),
            unreadable: vec![],
        };
        let v = decide(&c, &hash, &SchemaSnapshot::default(), Some(&history));
        assert!(matches!(
            v,
            Verdict::Stale {
                reason: StaleReason::Input { .. }
            }
        ));
    }

    #[test]
    fn corrupt_history_is_missing() {
        let c = check("CHK-001", "users");
        let history = CheckHistory {
            entries: vec![],
            unreadable: vec![0, 0],
        };
        let v = decide(&c, "h", &schemas(&["id"]), Some(&history));
        assert!(matches!(
            v,
            Verdict::Missing {
                reason: MissingReason::Corrupt { .. }
            }
        ));
    }
}
