//! Planner and executor capabilities. Both are opaque and possibly
//! nondeterministic; the engine only sees these traits.

pub mod fake;
pub mod llm;
pub mod python;
pub mod static_plan;

use crate::config::{ProviderKind, WorkflowConfig};
use crate::model::{Check, ExecutionArtifact};
use crate::plan_log::PlanLog;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// What a capability gets to see for one check: the check itself and the
/// columns of its own target tables only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileContext {
    pub check: Check,
    pub schema_cols: BTreeMap<String, Vec<String>>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Structured plan for one check. Must be a JSON object.
    async fn compile_plan(&self, ctx: &CompileContext) -> anyhow::Result<serde_json::Value>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(
        &self,
        plan: &serde_json::Value,
        ctx: &CompileContext,
    ) -> anyhow::Result<ExecutionArtifact>;
    fn name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct Capabilities {
    pub planner: Arc<dyn Planner>,
    pub executor: Arc<dyn Executor>,
}

/// Wire up the planner/executor pair selected in the config.
pub fn build_capabilities(cfg: &WorkflowConfig) -> anyhow::Result<Capabilities> {
    let caps = &cfg.capabilities;
    match caps.provider {
        ProviderKind::Fake => Ok(Capabilities {
            planner: Arc::new(static_plan::StaticPlanner),
            executor: Arc::new(fake::FakeExecutor::passing()),
        }),
        ProviderKind::Openai => {
            let plan_log = Arc::new(PlanLog::new(cfg.plan_log_path()));
            let planner_client = Arc::new(llm::openai::OpenAIClient::from_env(
                caps.planner_model.clone(),
            ));
            let executor_client = Arc::new(llm::openai::OpenAIClient::from_env(
                caps.executor_model.clone(),
            ));
            let workdir = cfg
                .data_dir
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| cfg.data_dir.clone());
            let runner = python::PythonRunner {
                python: caps.python.clone(),
                workdir,
                data_dir: cfg.data_dir.clone(),
                timeout: Duration::from_secs(caps.code_timeout_seconds),
            };
            Ok(Capabilities {
                planner: Arc::new(llm::planner::LlmPlanner::new(planner_client, Some(plan_log))),
                executor: Arc::new(llm::executor::LlmExecutor::new(
                    executor_client,
                    runner,
                    caps.max_code_runs,
                )),
            })
        }
    }
}
