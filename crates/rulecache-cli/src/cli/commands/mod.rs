pub mod history;
pub mod init;
pub mod plan_log;
pub mod run;
pub mod status;

use crate::cli::args::{Cli, Command, WorkflowArgs};
use anyhow::Context;
use rulecache_core::cache::{open_ledger_with, Ledger, OpenMode};
use rulecache_core::config::{load_config, ProviderKind, WorkflowConfig};
use rulecache_core::model::Check;
use rulecache_core::registry::load_checks;
use rulecache_core::report::console::format_schema_diff;
use rulecache_core::schema::{self, SchemaDiff, SchemaSnapshot, SnapshotStore};
use std::sync::Arc;

pub mod exit_codes {
    pub const OK: i32 = 0;
    /// At least one check ended the pass in ERROR.
    pub const CHECK_ERROR: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args).await,
        Command::Status(args) => status::run(args),
        Command::History(args) => history::run(args),
        Command::PlanLog(args) => plan_log::run(args),
        Command::Init(args) => init::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

/// Config with command-line overrides applied.
pub(crate) fn resolve_config(args: &WorkflowArgs) -> anyhow::Result<WorkflowConfig> {
    let mut cfg = load_config(&args.config, args.strict)?;
    if let Some(p) = &args.checks {
        cfg.checks = p.clone();
    }
    if let Some(p) = &args.data_dir {
        cfg.data_dir = p.clone();
    }
    if let Some(p) = &args.cache_dir {
        cfg.cache_dir = p.clone();
    }
    if let Some(p) = &args.ledger {
        cfg.ledger = Some(p.clone());
    }
    if let Some(p) = &args.provider {
        cfg.capabilities.provider = p.parse::<ProviderKind>()?;
    }
    Ok(cfg)
}

/// Everything a command needs to reason about one workflow.
pub(crate) struct Workflow {
    pub cfg: WorkflowConfig,
    pub checks: Vec<Check>,
    pub schemas: SchemaSnapshot,
    pub diff: Option<SchemaDiff>,
    pub ledger: Arc<dyn Ledger>,
}

impl Workflow {
    /// `OpenMode::ReadOnly` for commands that only inspect the ledger.
    pub fn load(args: &WorkflowArgs, mode: OpenMode) -> anyhow::Result<Self> {
        let cfg = resolve_config(args)?;
        let checks = load_checks(&cfg.checks)?;
        let schemas = schema::derive(&cfg.data_dir)?;

        let previous = SnapshotStore::new(cfg.snapshot_path())
            .load()
            .unwrap_or_else(|e| {
                tracing::warn!(event = "schema.snapshot_unreadable", error = %e);
                None
            });
        let diff = previous.map(|prev| SchemaDiff::between(&prev, &schemas));

        let ledger = open_ledger_with(&cfg.ledger_path(), mode)
            .with_context(|| format!("failed to open ledger {}", cfg.ledger_path().display()))?;
        tracing::debug!(
            event = "workflow.loaded",
            checks = checks.len(),
            tables = schemas.len(),
            ledger = ledger.backend_name()
        );

        Ok(Self {
            cfg,
            checks,
            schemas,
            diff,
            ledger,
        })
    }

    pub fn log_schema_changes(&self) {
        match &self.diff {
            Some(diff) if !diff.is_empty() => {
                tracing::info!(
                    event = "schema.changed",
                    tables = ?diff.touched_tables(),
                    "schema changed since last run"
                );
                eprint!("{}", format_schema_diff(diff));
            }
            Some(_) => {}
            None => tracing::info!(event = "schema.first_snapshot", tables = self.schemas.len()),
        }
    }

    pub fn save_snapshot(&self) -> anyhow::Result<()> {
        SnapshotStore::new(self.cfg.snapshot_path()).save(&self.schemas)
    }
}
