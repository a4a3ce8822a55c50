use super::{CompileContext, Planner};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Deterministic planner: the same four steps for every check, filled in
/// from the check's own fields. Needs no model access.
pub struct StaticPlanner;

pub fn static_plan(ctx: &CompileContext) -> Value {
    let check = &ctx.check;
    let tables: Vec<Value> = ctx
        .schema_cols
        .iter()
        .map(|(t, cols)| json!({ "table": t, "columns": cols }))
        .collect();

    json!({
        "check_id": check.check_id,
        "check_name": check.check_name,
        "steps": [
            { "id": "load_tables", "tables": tables },
            {
                "id": "compute_metrics",
                "hint": check.calculation_hint.clone().unwrap_or_default(),
                "description": check.description.clone().unwrap_or_default(),
            },
            { "id": "decide_status", "statuses": ["PASS", "FAIL", "SKIPPED", "ERROR"] },
            { "id": "emit_summary" }
        ],
        "output_contract": {
            "stdout_last_line": "<STATUS>: <one line summary>"
        }
    })
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn compile_plan(&self, ctx: &CompileContext) -> anyhow::Result<Value> {
        Ok(static_plan(ctx))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
