use super::{extract_json_object, ChatMessage, LlmClient};
use crate::errors::{CapabilityError, Stage};
use crate::plan_log::{PlanLog, PlanLogRecord};
use crate::providers::{CompileContext, Planner};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You plan data-quality checks over CSV tables. \
Reply with a single JSON object and nothing else. The object must contain \
\"steps\" (an ordered array of {\"id\", \"action\", \"inputs\"} objects covering \
loading the target tables, computing the metrics, deciding the status and \
emitting a summary) and \"output_contract\" describing the final stdout line \
as \"<PASS|FAIL|SKIPPED|ERROR>: <summary>\". Use only the tables and columns \
you are given.";

pub struct LlmPlanner {
    client: Arc<dyn LlmClient>,
    log: Option<Arc<PlanLog>>,
}

impl LlmPlanner {
    pub fn new(client: Arc<dyn LlmClient>, log: Option<Arc<PlanLog>>) -> Self {
        Self { client, log }
    }

    fn messages(ctx: &CompileContext) -> Vec<ChatMessage> {
        let inputs = json!({
            "check": ctx.check,
            "schema": ctx.schema_cols,
        });
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Plan this check.\n{}",
                serde_json::to_string_pretty(&inputs).unwrap_or_default()
            )),
        ]
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn compile_plan(&self, ctx: &CompileContext) -> anyhow::Result<Value> {
        let messages = Self::messages(ctx);
        let resp = self.client.chat(&messages).await?;

        if let Some(log) = &self.log {
            let record = PlanLogRecord {
                ts: chrono::Utc::now().to_rfc3339(),
                check_id: ctx.check.check_id.clone(),
                model: resp.model.clone(),
                prompt_msgs: serde_json::to_value(&messages)?,
                response_text: resp.text.clone(),
                inputs: json!({ "schema": ctx.schema_cols }),
            };
            // best effort: a lost log line never fails the plan
            if let Err(e) = log.append(&record) {
                tracing::warn!(event = "plan_log.write_failed", error = %e);
            }
        }

        let plan = extract_json_object(&resp.text).ok_or_else(|| CapabilityError::Malformed {
            stage: Stage::Plan,
            message: "response is not a JSON object".into(),
        })?;
        if !plan.get("steps").is_some_and(Value::is_array) {
            return Err(CapabilityError::Malformed {
                stage: Stage::Plan,
                message: "plan has no \"steps\" array".into(),
            }
            .into());
        }
        Ok(plan)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Check;
    use crate::providers::llm::LlmResponse;

    struct Canned(&'static str);

    #[async_trait]
    impl LlmClient for Canned {
        async fn chat(&self, _messages: &[ChatMessage]) -> anyhow::Result<LlmResponse> {
            Ok(LlmResponse {
                text: self.0.into(),
                provider: "canned".into(),
                model: "canned-1".into(),
                meta: json!({}),
            })
        }
        fn provider_name(&self) -> &'static str {
            "canned"
        }
        fn model(&self) -> &str {
            "canned-1"
        }
    }

    fn ctx() -> CompileContext {
        let check: Check = serde_json::from_value(json!({
            "check_id": "CHK-001",
            "check_name": "A",
            "target_table": "users",
        }))
        .unwrap();
        CompileContext {
            check,
            schema_cols: [("users".to_string(), vec!["id".to_string()])].into(),
        }
    }

    #[tokio::test]
    async fn fenced_plan_is_accepted_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(PlanLog::new(dir.path().join("plan_prompt_log.jsonl")));
        let planner = LlmPlanner::new(
            Arc::new(Canned("```json\n{\"steps\": [{\"id\": \"load\"}]}\n```")),
            Some(log.clone()),
        );
        let plan = planner.compile_plan(&ctx()).await.unwrap();
        assert_eq!(plan["steps"][0]["id"], "load");

        let records = log.tail(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].check_id, "CHK-001");
        assert_eq!(records[0].model, "canned-1");
    }

    #[tokio::test]
    async fn non_plan_reply_is_malformed() {
        let planner = LlmPlanner::new(Arc::new(Canned("{\"answer\": 42}")), None);
        let err = planner.compile_plan(&ctx()).await.unwrap_err();
        let cap = CapabilityError::from_anyhow(Stage::Plan, err);
        assert!(matches!(cap, CapabilityError::Malformed { .. }));
    }
}
