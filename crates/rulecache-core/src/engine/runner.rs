use super::pipeline::{CompileOutcome, CompilePipeline};
use crate::cache::{LedgerSnapshot, Resolved};
use crate::errors::{CompileError, ErrorClass};
use crate::model::{CacheKey, Check, CheckStatus};
use crate::scheduler::{self, MissingReason, Schedule, Verdict};
use crate::schema::SchemaSnapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Current pair reused without calling any capability.
    Reused,
    Compiled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub key: CacheKey,
    pub disposition: Disposition,
    /// `None` for disabled checks.
    pub status: Option<CheckStatus>,
    pub summary: String,
    pub verdict: Option<Verdict>,
    pub authoritative: bool,
    pub error_class: Option<ErrorClass>,
    pub diagnostics: Option<String>,
    pub appended: usize,
    pub duration_ms: Option<u64>,
}

impl CheckOutcome {
    fn compiled(verdict: Option<Verdict>, out: CompileOutcome) -> Self {
        // a clean recompile of a corrupt history still reports what it replaced
        let recovered = match (&verdict, &out.error) {
            (
                Some(Verdict::Missing {
                    reason: MissingReason::Corrupt { detail },
                }),
                None,
            ) if out.status != CheckStatus::Error => Some(CompileError::Corruption(detail.clone())),
            _ => None,
        };
        let error = out.error.as_ref().or(recovered.as_ref());
        Self {
            key: out.key,
            disposition: Disposition::Compiled,
            status: Some(out.status),
            summary: out.summary,
            authoritative: out.authoritative,
            error_class: error.map(|e| e.class()),
            diagnostics: match &recovered {
                Some(e) => Some(e.to_string()),
                None => out.diagnostics,
            },
            verdict,
            appended: out.appended,
            duration_ms: Some(out.duration_ms),
        }
    }

    fn disabled(key: CacheKey) -> Self {
        Self {
            key,
            disposition: Disposition::Disabled,
            status: None,
            summary: "disabled".into(),
            verdict: None,
            authoritative: true,
            error_class: None,
            diagnostics: None,
            appended: 0,
            duration_ms: None,
        }
    }

    fn task_failed(key: CacheKey, verdict: Option<Verdict>, message: String) -> Self {
        Self {
            key,
            disposition: Disposition::Compiled,
            status: Some(CheckStatus::Error),
            summary: message.clone(),
            verdict,
            authoritative: false,
            error_class: None,
            diagnostics: Some(message),
            appended: 0,
            duration_ms: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == Some(CheckStatus::Error)
    }

    /// Compiled cleanly over a history that could not be resolved.
    pub fn recovered_from_corruption(&self) -> bool {
        !self.is_error() && self.error_class == Some(ErrorClass::Corruption)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// In registry order.
    pub outcomes: Vec<CheckOutcome>,
    pub schedule: Schedule,
}

impl RunReport {
    /// True when no check ended the pass with status ERROR.
    pub fn exit_ok(&self) -> bool {
        !self.outcomes.iter().any(CheckOutcome::is_error)
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == Some(status))
            .count()
    }

    pub fn compiled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.disposition == Disposition::Compiled)
            .count()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }
}

/// One scheduling pass plus bounded-parallel compiles of everything that is
/// not fresh. Each check is isolated: nothing one compile does can abort another.
pub struct WorkflowRunner {
    pub pipeline: CompilePipeline,
    pub parallel: usize,
}

impl WorkflowRunner {
    pub fn new(pipeline: CompilePipeline, parallel: usize) -> Self {
        Self {
            pipeline,
            parallel: parallel.max(1),
        }
    }

    /// Scheduler verdicts only; calls no capability and writes nothing.
    pub fn schedule(&self, checks: &[Check], schemas: &SchemaSnapshot) -> anyhow::Result<Schedule> {
        let snapshot = self.pipeline.ledger.snapshot()?;
        Ok(scheduler::plan(checks, schemas, &snapshot))
    }

    pub async fn run(&self, checks: &[Check], schemas: &SchemaSnapshot) -> anyhow::Result<RunReport> {
        let snapshot = self.pipeline.ledger.snapshot()?;
        let schedule = scheduler::plan(checks, schemas, &snapshot);
        tracing::info!(
            event = "schedule.planned",
            fresh = schedule.fresh.len(),
            stale = schedule.stale.len(),
            missing = schedule.missing.len(),
            disabled = schedule.disabled.len()
        );

        let mut results: BTreeMap<CacheKey, CheckOutcome> = BTreeMap::new();
        for key in &schedule.disabled {
            results.insert(key.clone(), CheckOutcome::disabled(key.clone()));
        }
        for key in &schedule.fresh {
            results.insert(key.clone(), reuse(key, &snapshot));
        }

        let to_compile = schedule.to_compile();
        let sem = Arc::new(Semaphore::new(self.parallel));
        let schemas = Arc::new(schemas.clone());
        let checks_hash: Arc<str> = Arc::from(schedule.checks_hash.as_str());
        let mut handles = Vec::new();

        for check in checks.iter().filter(|c| to_compile.contains(&c.key())) {
            let permit = sem.clone().acquire_owned().await?;
            let pipeline = self.pipeline.clone();
            let check = check.clone();
            let schemas = schemas.clone();
            let checks_hash = checks_hash.clone();
            let key = check.key();
            let h = tokio::spawn(async move {
                let _permit = permit;
                pipeline.compile(&check, &checks_hash, &schemas).await
            });
            handles.push((key, h));
        }

        for (key, h) in handles {
            let verdict = schedule.verdicts.get(&key).cloned();
            let outcome = match h.await {
                Ok(out) => CheckOutcome::compiled(verdict, out),
                Err(e) => {
                    tracing::error!(event = "compile.task_failed", key = %key, error = %e);
                    CheckOutcome::task_failed(key.clone(), verdict, format!("join error: {}", e))
                }
            };
            results.insert(key, outcome);
        }

        let mut outcomes = Vec::with_capacity(results.len());
        for check in checks {
            if let Some(o) = results.remove(&check.key()) {
                outcomes.push(o);
            }
        }
        Ok(RunReport { outcomes, schedule })
    }
}

fn reuse(key: &CacheKey, snapshot: &LedgerSnapshot) -> CheckOutcome {
    let resolved = snapshot.get(key).map(|h| h.resolve());
    let (status, summary, diagnostics) = match resolved {
        Some(Resolved::Current(pair)) => {
            let r = &pair.artifact.result;
            let diag = (r.status == CheckStatus::Error)
                .then(|| pair.artifact.diagnostics())
                .flatten();
            (r.status, r.summary.clone(), diag)
        }
        // the scheduler only calls a key fresh when it resolved to a pair
        _ => (CheckStatus::Error, "cached pair vanished".to_string(), None),
    };
    tracing::info!(event = "cache.hit", key = %key, status = %status);
    CheckOutcome {
        key: key.clone(),
        disposition: Disposition::Reused,
        status: Some(status),
        summary,
        verdict: Some(Verdict::Fresh),
        authoritative: true,
        error_class: None,
        diagnostics,
        appended: 0,
        duration_ms: Some(0),
    }
}
