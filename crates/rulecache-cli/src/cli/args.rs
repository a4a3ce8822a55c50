use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rulecache",
    version,
    about = "Recompile-on-change cache for generated business-rule checks"
)]
pub struct Cli {
    /// log output format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Schedule and compile every stale or missing check
    Run(RunArgs),
    /// Show scheduler verdicts and schema changes without compiling
    Status(StatusArgs),
    /// Print the ledger history of one check
    History(HistoryArgs),
    /// Show the most recent planner interactions
    PlanLog(PlanLogArgs),
    /// Write a sample workflow config
    Init(InitArgs),
    Version,
}

/// Options shared by every command that reads a workflow.
#[derive(clap::Args, Debug, Clone)]
pub struct WorkflowArgs {
    #[arg(long, default_value = "rulecache.yaml")]
    pub config: PathBuf,

    /// path to checks.json (overrides config)
    #[arg(long)]
    pub checks: Option<PathBuf>,

    /// directory of <table>.csv sources (overrides config)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// directory holding the ledger, schema snapshot and plan log (overrides config)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// explicit ledger file; .db/.sqlite selects the SQLite backend
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// capability provider: openai|fake
    #[arg(long, env = "RULECACHE_PROVIDER")]
    pub provider: Option<String>,

    /// fail on unknown config keys instead of warning
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,

    /// max concurrent compiles (overrides config)
    #[arg(long)]
    pub parallel: Option<usize>,

    /// also write the run report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,

    /// text|json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Clone)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,

    /// cache key ("<id>::<name>") or bare check id
    #[arg(long)]
    pub check: String,

    /// dump full artifacts instead of one line per entry
    #[arg(long)]
    pub full: bool,
}

#[derive(Parser, Clone)]
pub struct PlanLogArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,

    #[arg(long, default_value_t = 5)]
    pub tail: usize,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "rulecache.yaml")]
    pub config: PathBuf,

    /// overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
