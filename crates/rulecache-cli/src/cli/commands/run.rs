use super::{exit_codes, Workflow};
use crate::cli::args::RunArgs;
use rulecache_core::cache::OpenMode;
use rulecache_core::engine::{CompilePipeline, Timeouts, WorkflowRunner};
use rulecache_core::providers::build_capabilities;
use rulecache_core::report::{console, json};
use std::time::Duration;

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let wf = match Workflow::load(&args.workflow, OpenMode::ReadWrite) {
        Ok(wf) => wf,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    wf.log_schema_changes();

    let caps = build_capabilities(&wf.cfg)?;
    let timeouts = Timeouts {
        planner: Duration::from_secs(wf.cfg.settings.planner_timeout_seconds),
        executor: Duration::from_secs(wf.cfg.settings.executor_timeout_seconds),
    };
    let pipeline = CompilePipeline::new(caps.planner, caps.executor, wf.ledger.clone(), timeouts);
    let parallel = args.parallel.unwrap_or(wf.cfg.settings.parallel);
    let runner = WorkflowRunner::new(pipeline, parallel);

    let report = runner.run(&wf.checks, &wf.schemas).await?;
    wf.save_snapshot()?;

    console::print_summary(&report);
    if let Some(out) = &args.report_json {
        json::write_json(&report, out)?;
        eprintln!("wrote {}", out.display());
    }

    if report.exit_ok() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::CHECK_ERROR)
    }
}
