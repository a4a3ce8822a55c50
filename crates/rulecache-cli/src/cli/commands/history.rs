use super::{exit_codes, resolve_config};
use crate::cli::args::HistoryArgs;
use rulecache_core::cache::{open_ledger_read_only, Resolved};
use rulecache_core::model::{CacheKey, LedgerEntry};

pub fn run(args: HistoryArgs) -> anyhow::Result<i32> {
    let cfg = resolve_config(&args.workflow)?;
    let ledger = open_ledger_read_only(&cfg.ledger_path())?;

    let keys: Vec<CacheKey> = if args.check.contains("::") {
        vec![CacheKey::from(args.check.as_str())]
    } else {
        ledger
            .snapshot()?
            .into_keys()
            .filter(|k| k.check_id() == args.check)
            .collect()
    };
    if keys.is_empty() {
        eprintln!("no ledger entries for {}", args.check);
        return Ok(exit_codes::CHECK_ERROR);
    }

    for key in keys {
        let history = ledger.history(&key)?;
        println!("{} ({} entries)", key, history.len());
        for (i, entry) in history.entries.iter().enumerate() {
            if args.full {
                println!("{}", serde_json::to_string_pretty(entry)?);
            } else {
                println!("  {:>3} {}", i, describe(entry));
            }
        }
        match history.resolve() {
            Resolved::Current(pair) => println!(
                "  current: {} ({})",
                pair.artifact.result.status, pair.plan.compiled_at
            ),
            Resolved::NonAuthoritative(_) => println!("  current: none, last cycle failed"),
            Resolved::Corrupt(detail) => println!("  current: none, {}", detail),
            Resolved::Empty => println!("  current: none"),
        }
    }
    Ok(exit_codes::OK)
}

fn describe(entry: &LedgerEntry) -> String {
    let detail = if let Some(f) = entry.failure() {
        format!("{} error: {}", f.class, f.message)
    } else if let Some(a) = entry.execution_artifact() {
        format!("{} {} ({} runs)", a.result.status, a.result.summary, a.python_repls.len())
    } else {
        let steps = entry
            .artifact
            .get("steps")
            .and_then(|s| s.as_array())
            .map_or(0, |s| s.len());
        format!("{} steps", steps)
    };
    let flag = if entry.authoritative { "" } else { " [non-authoritative]" };
    format!(
        "{:<9} {} checks={} schema={}{}  {}",
        entry.kind,
        entry.compiled_at.to_rfc3339(),
        short(&entry.compiled_against.checks_hash),
        short(&entry.compiled_against.schema_hash()),
        flag,
        detail
    )
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
