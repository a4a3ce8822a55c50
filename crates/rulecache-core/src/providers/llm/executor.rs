use super::{strip_fences, ChatMessage, LlmClient};
use crate::errors::{CapabilityError, Stage};
use crate::model::{CheckStatus, CodeRun, ExecutionArtifact, ExecutionResult};
use crate::providers::python::PythonRunner;
use crate::providers::{CompileContext, Executor};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You write a single self-contained Python script using pandas \
that implements the given plan. Read each table from os.path.join(os.environ['DATA_DIR'], \
'<table>.csv'). The last line printed must be '<STATUS>: <one line summary>' where STATUS \
is one of PASS, FAIL, SKIPPED, ERROR. Reply with the code only, in one ```python block.";

pub struct LlmExecutor {
    client: Arc<dyn LlmClient>,
    runner: PythonRunner,
    max_code_runs: u32,
}

impl LlmExecutor {
    pub fn new(client: Arc<dyn LlmClient>, runner: PythonRunner, max_code_runs: u32) -> Self {
        Self {
            client,
            runner,
            max_code_runs: max_code_runs.max(1),
        }
    }

    async fn ask_for_code(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let resp = self.client.chat(messages).await?;
        let code = strip_fences(&resp.text);
        if code.is_empty() {
            return Err(CapabilityError::Malformed {
                stage: Stage::Execute,
                message: "model returned no code".into(),
            }
            .into());
        }
        Ok(code.to_string())
    }
}

/// Status from the first PASS/FAIL/SKIPPED/ERROR token in stdout, summary
/// from its last non-empty line. No token means ERROR.
pub fn derive_result(run: &CodeRun) -> ExecutionResult {
    let status = CheckStatus::find_in(&run.stdout).unwrap_or(CheckStatus::Error);
    let summary = last_line(&run.stdout)
        .or_else(|| run.stderr.as_deref().and_then(last_line))
        .unwrap_or("no output")
        .to_string();
    ExecutionResult {
        status,
        summary,
        raw_stdout: Some(run.stdout.clone()),
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

#[async_trait]
impl Executor for LlmExecutor {
    async fn run(&self, plan: &Value, ctx: &CompileContext) -> anyhow::Result<ExecutionArtifact> {
        let inputs = json!({
            "plan": plan,
            "check": ctx.check,
            "schema": ctx.schema_cols,
        });
        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Implement this plan.\n{}",
                serde_json::to_string_pretty(&inputs).unwrap_or_default()
            )),
        ];

        let mut runs: Vec<CodeRun> = Vec::new();
        for attempt in 1..=self.max_code_runs {
            let code = self.ask_for_code(&messages).await?;
            let run = self.runner.run(&code).await?;
            tracing::debug!(
                event = "code.run",
                check_id = %ctx.check.check_id,
                attempt,
                exit_code = run.exit_code
            );
            let failed = run.exit_code != 0;
            let stderr = run.stderr.clone().unwrap_or_default();
            runs.push(run);
            if !failed {
                break;
            }
            messages.push(ChatMessage::assistant(format!("```python\n{}\n```", code)));
            messages.push(ChatMessage::user(format!(
                "The script exited with an error:\n{}\nReturn the full corrected script.",
                stderr
            )));
        }

        let result = match runs.last() {
            Some(last) => derive_result(last),
            None => ExecutionResult {
                status: CheckStatus::Error,
                summary: "no code was run".into(),
                raw_stdout: None,
            },
        };
        Ok(ExecutionArtifact {
            python_repls: runs,
            result,
        })
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}
