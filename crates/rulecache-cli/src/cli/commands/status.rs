use super::{exit_codes, Workflow};
use crate::cli::args::StatusArgs;
use rulecache_core::cache::OpenMode;
use rulecache_core::report::console;
use rulecache_core::scheduler;

/// Dry run: verdicts only, nothing is compiled and no snapshot is saved.
pub fn run(args: StatusArgs) -> anyhow::Result<i32> {
    let wf = match Workflow::load(&args.workflow, OpenMode::ReadOnly) {
        Ok(wf) => wf,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let schedule = scheduler::plan(&wf.checks, &wf.schemas, &wf.ledger.snapshot()?);

    if args.format == "json" {
        let out = serde_json::json!({
            "schedule": schedule,
            "schema_diff": wf.diff,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        if let Some(diff) = wf.diff.as_ref().filter(|d| !d.is_empty()) {
            println!("Schema changes since last run:");
            print!("{}", console::format_schema_diff(diff));
            println!();
        }
        print!("{}", console::format_schedule(&schedule));
    }
    Ok(exit_codes::OK)
}
