use super::locks::KeyLocks;
use crate::cache::Ledger;
use crate::errors::{CapabilityError, CompileError, Stage};
use crate::fingerprint::compiled_against;
use crate::model::{
    CacheKey, Check, CheckStatus, CompiledAgainst, EntryKind, ExecutionArtifact, FailureRecord,
    LedgerEntry,
};
use crate::providers::{CompileContext, Executor, Planner};
use crate::schema::SchemaSnapshot;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub planner: Duration,
    pub executor: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            planner: Duration::from_secs(120),
            executor: Duration::from_secs(300),
        }
    }
}

/// Result of one compile attempt, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutcome {
    pub key: CacheKey,
    pub status: CheckStatus,
    pub summary: String,
    /// Whether the appended entries count as current truth.
    pub authoritative: bool,
    pub error: Option<CompileError>,
    /// Ledger entries written by this attempt.
    pub appended: usize,
    pub diagnostics: Option<String>,
    pub duration_ms: u64,
}

/// Planner then executor for one check, then a single ledger append.
///
/// The append is the last step and the only write, so dropping the future
/// at any earlier await leaves the ledger untouched.
#[derive(Clone)]
pub struct CompilePipeline {
    pub planner: Arc<dyn Planner>,
    pub executor: Arc<dyn Executor>,
    pub ledger: Arc<dyn Ledger>,
    pub locks: KeyLocks,
    pub timeouts: Timeouts,
}

impl CompilePipeline {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        ledger: Arc<dyn Ledger>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            planner,
            executor,
            ledger,
            locks: KeyLocks::new(),
            timeouts,
        }
    }

    pub async fn compile(
        &self,
        check: &Check,
        checks_hash: &str,
        schemas: &SchemaSnapshot,
    ) -> CompileOutcome {
        let key = check.key();
        let _guard = self.locks.acquire(&key).await;
        let started = Instant::now();
        tracing::info!(
            event = "compile.start",
            key = %key,
            planner = self.planner.name(),
            executor = self.executor.name()
        );

        let against = match compiled_against(check, checks_hash, schemas) {
            Ok(a) => a,
            Err(e) => return self.failed(key, e.into(), 0, started),
        };
        let ctx = CompileContext {
            check: check.clone(),
            schema_cols: against.schema_cols.clone(),
        };

        let plan = match self.plan(&ctx).await {
            Ok(plan) => plan,
            Err(cap) => {
                let entries = vec![failure_entry(
                    EntryKind::Plan,
                    json!({ "error": failure_record(&cap) }),
                    against,
                    Utc::now(),
                )];
                return self.commit_failure(key, entries, cap, started);
            }
        };

        let artifact = match self.execute(&plan, &ctx).await {
            Ok(artifact) => artifact,
            Err(cap) => {
                let exec = json!({
                    "python_repls": [],
                    "result": { "status": "ERROR", "summary": cap.to_string() },
                    "error": failure_record(&cap),
                });
                let at = Utc::now();
                let entries = vec![
                    failure_entry(EntryKind::Plan, plan, against.clone(), at),
                    failure_entry(EntryKind::Execution, exec, against, at),
                ];
                return self.commit_failure(key, entries, cap, started);
            }
        };

        self.commit(key, plan, artifact, against, started)
    }

    async fn plan(&self, ctx: &CompileContext) -> Result<Value, CapabilityError> {
        let limit = self.timeouts.planner;
        let plan = match tokio::time::timeout(limit, self.planner.compile_plan(ctx)).await {
            Err(_) => {
                return Err(CapabilityError::Timeout {
                    stage: Stage::Plan,
                    seconds: limit.as_secs(),
                })
            }
            Ok(res) => res.map_err(|e| CapabilityError::from_anyhow(Stage::Plan, e))?,
        };
        if !plan.is_object() {
            return Err(CapabilityError::Malformed {
                stage: Stage::Plan,
                message: "plan is not a JSON object".into(),
            });
        }
        Ok(plan)
    }

    async fn execute(
        &self,
        plan: &Value,
        ctx: &CompileContext,
    ) -> Result<ExecutionArtifact, CapabilityError> {
        let limit = self.timeouts.executor;
        match tokio::time::timeout(limit, self.executor.run(plan, ctx)).await {
            Err(_) => Err(CapabilityError::Timeout {
                stage: Stage::Execute,
                seconds: limit.as_secs(),
            }),
            Ok(res) => res.map_err(|e| CapabilityError::from_anyhow(Stage::Execute, e)),
        }
    }

    fn commit(
        &self,
        key: CacheKey,
        plan: Value,
        artifact: ExecutionArtifact,
        against: CompiledAgainst,
        started: Instant,
    ) -> CompileOutcome {
        let compiled_at = Utc::now();
        let exec_value = match serde_json::to_value(&artifact) {
            Ok(v) => v,
            Err(e) => return self.failed(key, CompileError::Storage(e.to_string()), 0, started),
        };
        let entries = [
            LedgerEntry {
                kind: EntryKind::Plan,
                artifact: plan,
                compiled_at,
                compiled_against: against.clone(),
                authoritative: true,
            },
            LedgerEntry {
                kind: EntryKind::Execution,
                artifact: exec_value,
                compiled_at,
                compiled_against: against,
                authoritative: true,
            },
        ];
        if let Err(e) = self.ledger.append_cycle(&key, &entries) {
            return self.failed(key, CompileError::Storage(format!("{:#}", e)), 0, started);
        }

        let outcome = CompileOutcome {
            status: artifact.result.status,
            summary: artifact.result.summary.clone(),
            authoritative: true,
            error: None,
            appended: entries.len(),
            diagnostics: if artifact.result.status == CheckStatus::Error {
                artifact.diagnostics()
            } else {
                None
            },
            duration_ms: started.elapsed().as_millis() as u64,
            key,
        };
        tracing::info!(
            event = "compile.finished",
            key = %outcome.key,
            status = %outcome.status,
            appended = outcome.appended,
            duration_ms = outcome.duration_ms
        );
        outcome
    }

    fn commit_failure(
        &self,
        key: CacheKey,
        entries: Vec<LedgerEntry>,
        cap: CapabilityError,
        started: Instant,
    ) -> CompileOutcome {
        match self.ledger.append_cycle(&key, &entries) {
            Ok(()) => self.failed(key, cap.into(), entries.len(), started),
            Err(e) => {
                tracing::error!(
                    event = "ledger.append_failed",
                    key = %key,
                    error = %format!("{:#}", e)
                );
                self.failed(key, cap.into(), 0, started)
            }
        }
    }

    fn failed(
        &self,
        key: CacheKey,
        err: CompileError,
        appended: usize,
        started: Instant,
    ) -> CompileOutcome {
        tracing::warn!(
            event = "compile.failed",
            key = %key,
            class = %err.class(),
            retryable = err.is_retryable(),
            appended,
            error = %err
        );
        CompileOutcome {
            key,
            status: CheckStatus::Error,
            summary: err.to_string(),
            authoritative: false,
            diagnostics: Some(err.to_string()),
            error: Some(err),
            appended,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn failure_record(cap: &CapabilityError) -> FailureRecord {
    FailureRecord {
        class: CompileError::Capability(cap.clone()).class(),
        message: cap.to_string(),
    }
}

fn failure_entry(
    kind: EntryKind,
    artifact: Value,
    against: CompiledAgainst,
    compiled_at: DateTime<Utc>,
) -> LedgerEntry {
    LedgerEntry {
        kind,
        artifact,
        compiled_at,
        compiled_against: against,
        authoritative: false,
    }
}
