//! Scripted capabilities for tests and offline runs.

use super::static_plan::static_plan;
use super::{CompileContext, Executor, Planner};
use crate::errors::{CapabilityError, Stage};
use crate::model::{CheckStatus, CodeRun, ExecutionArtifact, ExecutionResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum FakeBehaviour {
    /// Planner: static plan. Executor: one clean run reporting PASS.
    Ok,
    /// Executor only: one clean run reporting this status.
    Status(CheckStatus),
    /// Raise an unclassified error (counts as unavailable).
    Fail(String),
    /// Return something the engine must reject as malformed.
    Malformed,
    /// Never complete; only a timeout or cancellation ends the call.
    Hang,
}

/// Per-check behaviour plus invocation bookkeeping shared by both fakes.
#[derive(Debug)]
struct Script {
    default: FakeBehaviour,
    overrides: Mutex<HashMap<String, FakeBehaviour>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Script {
    fn new(default: FakeBehaviour) -> Self {
        Self {
            default,
            overrides: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    fn behaviour_for(&self, check_id: &str) -> FakeBehaviour {
        self.overrides
            .lock()
            .unwrap()
            .get(check_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    async fn enter(&self, check_id: &str) -> FakeBehaviour {
        self.calls.lock().unwrap().push(check_id.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let b = self.behaviour_for(check_id);
        if b == FakeBehaviour::Hang {
            std::future::pending::<()>().await;
        }
        b
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

macro_rules! script_accessors {
    ($ty:ty) => {
        impl $ty {
            pub fn with_delay(mut self, delay: Duration) -> Self {
                self.script.delay = delay;
                self
            }

            /// Change the behaviour for one check id from now on.
            pub fn set(&self, check_id: &str, behaviour: FakeBehaviour) {
                self.script
                    .overrides
                    .lock()
                    .unwrap()
                    .insert(check_id.to_string(), behaviour);
            }

            pub fn clear(&self, check_id: &str) {
                self.script.overrides.lock().unwrap().remove(check_id);
            }

            pub fn calls(&self) -> usize {
                self.script.calls.lock().unwrap().len()
            }

            pub fn calls_for(&self, check_id: &str) -> usize {
                self.script
                    .calls
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|c| c.as_str() == check_id)
                    .count()
            }

            /// Highest number of concurrent calls observed.
            pub fn peak_in_flight(&self) -> usize {
                self.script.peak_in_flight.load(Ordering::SeqCst)
            }
        }
    };
}

#[derive(Debug)]
pub struct FakePlanner {
    script: Script,
}

impl FakePlanner {
    pub fn new(default: FakeBehaviour) -> Self {
        Self {
            script: Script::new(default),
        }
    }
}

impl Default for FakePlanner {
    fn default() -> Self {
        Self::new(FakeBehaviour::Ok)
    }
}

script_accessors!(FakePlanner);

/// Decrements the in-flight counter even when the call is cancelled.
struct InFlight<'a>(&'a Script);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

#[async_trait]
impl Planner for FakePlanner {
    async fn compile_plan(&self, ctx: &CompileContext) -> anyhow::Result<Value> {
        let _guard = InFlight(&self.script);
        match self.script.enter(&ctx.check.check_id).await {
            FakeBehaviour::Fail(msg) => anyhow::bail!(msg),
            FakeBehaviour::Malformed => Ok(Value::String("not a plan".into())),
            _ => Ok(static_plan(ctx)),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Debug)]
pub struct FakeExecutor {
    script: Script,
}

impl FakeExecutor {
    pub fn new(default: FakeBehaviour) -> Self {
        Self {
            script: Script::new(default),
        }
    }

    pub fn passing() -> Self {
        Self::new(FakeBehaviour::Ok)
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::passing()
    }
}

script_accessors!(FakeExecutor);

fn artifact(status: CheckStatus, ctx: &CompileContext) -> ExecutionArtifact {
    let tables: Vec<&str> = ctx.schema_cols.keys().map(String::as_str).collect();
    let summary = format!("{}: {} over {}", status, ctx.check.check_name, tables.join(", "));
    let exit_code = if status == CheckStatus::Error { 1 } else { 0 };
    ExecutionArtifact {
        python_repls: vec![CodeRun {
            code: format!("# {}\nprint({:?})", ctx.check.key(), summary),
            stdout: format!("{}\n", summary),
            stderr: None,
            exit_code,
        }],
        result: ExecutionResult {
            status,
            summary: summary.clone(),
            raw_stdout: Some(format!("{}\n", summary)),
        },
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn run(&self, _plan: &Value, ctx: &CompileContext) -> anyhow::Result<ExecutionArtifact> {
        let _guard = InFlight(&self.script);
        match self.script.enter(&ctx.check.check_id).await {
            FakeBehaviour::Status(s) => Ok(artifact(s, ctx)),
            FakeBehaviour::Fail(msg) => anyhow::bail!(msg),
            FakeBehaviour::Malformed => Err(CapabilityError::Malformed {
                stage: Stage::Execute,
                message: "fake executor produced no result".into(),
            }
            .into()),
            _ => Ok(artifact(CheckStatus::Pass, ctx)),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
