use crate::engine::{CheckOutcome, Disposition, RunReport};
use crate::model::CheckStatus;
use crate::scheduler::Schedule;
use crate::schema::SchemaDiff;
use std::fmt::Write;

fn icon(o: &CheckOutcome) -> &'static str {
    match o.status {
        Some(CheckStatus::Pass) => "✅",
        Some(CheckStatus::Fail) => "❌",
        Some(CheckStatus::Skipped) => "⏭️ ",
        Some(CheckStatus::Error) => "💥",
        None => "⏸️ ",
    }
}

fn origin(o: &CheckOutcome) -> String {
    match o.disposition {
        Disposition::Reused => "cached".into(),
        Disposition::Disabled => "disabled".into(),
        Disposition::Compiled => {
            let why = o
                .verdict
                .as_ref()
                .map(|v| v.describe())
                .unwrap_or_else(|| "compiled".into());
            match o.duration_ms {
                Some(ms) => format!("compiled, {} ({:.1}s)", why, ms as f64 / 1000.0),
                None => format!("compiled, {}", why),
            }
        }
    }
}

/// Per-check lines plus a totals line.
pub fn format_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nRunning {} checks...", report.outcomes.len());

    for o in &report.outcomes {
        let status = o.status.map(|s| s.as_str()).unwrap_or("-");
        let _ = writeln!(
            out,
            "{} {:<32} {:<7} {}  [{}]",
            icon(o),
            o.key,
            status,
            o.summary,
            origin(o)
        );
        if o.is_error() {
            if let Some(class) = o.error_class {
                let retry = if o.authoritative { "" } else { ", will retry" };
                let _ = writeln!(out, "    ({} error{})", class, retry);
            }
            if let Some(diag) = o.diagnostics.as_deref().filter(|d| *d != o.summary) {
                for line in diag.lines() {
                    let _ = writeln!(out, "    | {}", line);
                }
            }
        } else if o.recovered_from_corruption() {
            if let Some(diag) = o.diagnostics.as_deref() {
                let _ = writeln!(out, "    (recovered: {})", diag);
            }
        }
    }

    let _ = writeln!(out, "\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let _ = writeln!(
        out,
        "Summary: {} passed, {} failed, {} skipped, {} error | {} compiled, {} cached, {} disabled",
        report.count(CheckStatus::Pass),
        report.count(CheckStatus::Fail),
        report.count(CheckStatus::Skipped),
        report.count(CheckStatus::Error),
        report.compiled(),
        report.schedule.fresh.len(),
        report.schedule.disabled.len(),
    );
    out
}

pub fn print_summary(report: &RunReport) {
    eprint!("{}", format_summary(report));
}

/// Dry-run view: verdict per check without compiling anything.
pub fn format_schedule(schedule: &Schedule) -> String {
    let mut out = String::new();
    for (key, verdict) in &schedule.verdicts {
        let _ = writeln!(out, "{:<32} {}", key, verdict.describe());
    }
    for key in &schedule.disabled {
        let _ = writeln!(out, "{:<32} disabled", key);
    }
    let _ = writeln!(
        out,
        "{} fresh, {} stale, {} missing, {} disabled",
        schedule.fresh.len(),
        schedule.stale.len(),
        schedule.missing.len(),
        schedule.disabled.len()
    );
    out
}

pub fn format_schema_diff(diff: &SchemaDiff) -> String {
    let mut out = String::new();
    for t in &diff.added_tables {
        let _ = writeln!(out, "+ table {}", t);
    }
    for t in &diff.removed_tables {
        let _ = writeln!(out, "- table {}", t);
    }
    for (t, change) in &diff.changed {
        let mut parts = Vec::new();
        if !change.added.is_empty() {
            parts.push(format!("+{}", change.added.join(", +")));
        }
        if !change.removed.is_empty() {
            parts.push(format!("-{}", change.removed.join(", -")));
        }
        if change.reordered {
            parts.push("reordered".into());
        }
        let _ = writeln!(out, "~ table {}: {}", t, parts.join("; "));
    }
    out
}
