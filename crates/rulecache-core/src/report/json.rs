use crate::engine::RunReport;
use std::path::Path;

pub fn to_json(report: &RunReport) -> serde_json::Value {
    serde_json::json!({
        "ok": report.exit_ok(),
        "checks_hash": report.schedule.checks_hash,
        "outcomes": report.outcomes,
    })
}

pub fn write_json(report: &RunReport, out: &Path) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(&to_json(report))?;
    crate::storage::write_atomic(out, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CheckOutcome, Disposition};
    use crate::model::{CacheKey, CheckStatus};
    use crate::scheduler::{Schedule, Verdict};

    #[test]
    fn outcomes_serialize_with_lowercase_disposition() {
        let report = RunReport {
            outcomes: vec![CheckOutcome {
                key: CacheKey::from("CHK-001::A"),
                disposition: Disposition::Reused,
                status: Some(CheckStatus::Pass),
                summary: "PASS: ok".into(),
                verdict: Some(Verdict::Fresh),
                authoritative: true,
                error_class: None,
                diagnostics: None,
                appended: 0,
                duration_ms: Some(0),
            }],
            schedule: Schedule::default(),
        };
        let v = to_json(&report);
        assert_eq!(v["ok"], true);
        assert_eq!(v["outcomes"][0]["key"], "CHK-001::A");
        assert_eq!(v["outcomes"][0]["disposition"], "reused");
        assert_eq!(v["outcomes"][0]["status"], "PASS");
        assert_eq!(v["outcomes"][0]["verdict"]["verdict"], "fresh");
    }
}
