use super::{exit_codes, resolve_config};
use crate::cli::args::PlanLogArgs;
use rulecache_core::plan_log::PlanLog;

pub fn run(args: PlanLogArgs) -> anyhow::Result<i32> {
    let cfg = resolve_config(&args.workflow)?;
    let log = PlanLog::new(cfg.plan_log_path());
    let records = log.tail(args.tail)?;
    if records.is_empty() {
        eprintln!("no planner interactions logged at {}", log.path().display());
        return Ok(exit_codes::OK);
    }
    for r in records {
        println!("{}  {}  {}", r.ts, r.check_id, r.model);
        for line in r.response_text.lines() {
            println!("    {}", line);
        }
    }
    Ok(exit_codes::OK)
}
