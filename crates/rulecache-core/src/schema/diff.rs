use super::SchemaSnapshot;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Same column set, different order.
    pub reordered: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDiff {
    pub added_tables: Vec<String>,
    pub removed_tables: Vec<String>,
    pub changed: BTreeMap<String, TableChange>,
}

impl SchemaDiff {
    pub fn between(previous: &SchemaSnapshot, current: &SchemaSnapshot) -> Self {
        let mut diff = SchemaDiff::default();

        for (table, cols) in &current.tables {
            let Some(prev_cols) = previous.tables.get(table) else {
                diff.added_tables.push(table.clone());
                continue;
            };
            if prev_cols == cols {
                continue;
            }
            let prev_set: BTreeSet<&String> = prev_cols.iter().collect();
            let cur_set: BTreeSet<&String> = cols.iter().collect();
            let change = TableChange {
                added: cols
                    .iter()
                    .filter(|c| !prev_set.contains(c))
                    .cloned()
                    .collect(),
                removed: prev_cols
                    .iter()
                    .filter(|c| !cur_set.contains(c))
                    .cloned()
                    .collect(),
                reordered: prev_set == cur_set,
            };
            diff.changed.insert(table.clone(), change);
        }

        diff.removed_tables = previous
            .tables
            .keys()
            .filter(|t| !current.tables.contains_key(*t))
            .cloned()
            .collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added_tables.is_empty() && self.removed_tables.is_empty() && self.changed.is_empty()
    }

    /// Every table touched by the diff, sorted.
    pub fn touched_tables(&self) -> Vec<String> {
        let mut all: BTreeSet<String> = self.changed.keys().cloned().collect();
        all.extend(self.added_tables.iter().cloned());
        all.extend(self.removed_tables.iter().cloned());
        all.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(pairs: &[(&str, &[&str])]) -> SchemaSnapshot {
        SchemaSnapshot::from_tables(
            pairs
                .iter()
                .map(|(t, c)| (t.to_string(), c.iter().map(|s| s.to_string()).collect())),
        )
    }

    #[test]
    fn reports_column_and_table_changes() {
        let prev = snap(&[("users", &["id", "email"]), ("orders", &["id"]), ("events", &["a", "b"])]);
        let cur = snap(&[
            ("users", &["id", "email", "signup_at"]),
            ("events", &["b", "a"]),
            ("sessions", &["id"]),
        ]);

        let d = SchemaDiff::between(&prev, &cur);
        assert_eq!(d.added_tables, vec!["sessions"]);
        assert_eq!(d.removed_tables, vec!["orders"]);
        assert_eq!(d.changed["users"].added, vec!["signup_at"]);
        assert!(!d.changed["users"].reordered);
        assert!(d.changed["events"].reordered);
        assert_eq!(d.touched_tables(), vec!["events", "orders", "sessions", "users"]);
    }

    #[test]
    fn identical_snapshots_have_empty_diff() {
        let s = snap(&[("users", &["id"])]);
        assert!(SchemaDiff::between(&s, &s).is_empty());
    }
}
