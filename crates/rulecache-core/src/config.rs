use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_FILE: &str = "rulecache.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default = "default_checks")]
    pub checks: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Explicit ledger path; defaults to `<cache_dir>/workflows.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<PathBuf>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub capabilities: CapabilitySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default = "default_planner_timeout")]
    pub planner_timeout_seconds: u64,
    #[serde(default = "default_executor_timeout")]
    pub executor_timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Fake,
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::Openai),
            "fake" => Ok(ProviderKind::Fake),
            other => Err(ConfigError(format!(
                "unknown provider '{}' (expected openai or fake)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySettings {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_planner_model")]
    pub planner_model: String,
    #[serde(default = "default_executor_model")]
    pub executor_model: String,
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default = "default_code_timeout")]
    pub code_timeout_seconds: u64,
    #[serde(default = "default_max_code_runs")]
    pub max_code_runs: u32,
}

fn default_checks() -> PathBuf {
    PathBuf::from("checks.json")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cached_mem")
}
fn default_parallel() -> usize {
    4
}
fn default_planner_timeout() -> u64 {
    120
}
fn default_executor_timeout() -> u64 {
    300
}
fn default_provider() -> ProviderKind {
    ProviderKind::Openai
}
fn default_planner_model() -> String {
    "gpt-5-mini".into()
}
fn default_executor_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_python() -> String {
    "python3".into()
}
fn default_code_timeout() -> u64 {
    90
}
fn default_max_code_runs() -> u32 {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            planner_timeout_seconds: default_planner_timeout(),
            executor_timeout_seconds: default_executor_timeout(),
        }
    }
}

impl Default for CapabilitySettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            planner_model: default_planner_model(),
            executor_model: default_executor_model(),
            python: default_python(),
            code_timeout_seconds: default_code_timeout(),
            max_code_runs: default_max_code_runs(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            checks: default_checks(),
            data_dir: default_data_dir(),
            cache_dir: default_cache_dir(),
            ledger: None,
            settings: Settings::default(),
            capabilities: CapabilitySettings::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("workflows.json"))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.cache_dir.join("schema_cols.json")
    }

    pub fn plan_log_path(&self) -> PathBuf {
        self.cache_dir.join("plan_prompt_log.jsonl")
    }

    /// Resolve relative paths against `base` (normally the config file's directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        resolve(&mut self.checks, base);
        resolve(&mut self.data_dir, base);
        resolve(&mut self.cache_dir, base);
        if let Some(ledger) = self.ledger.as_mut() {
            resolve(ledger, base);
        }
    }
}

fn resolve(p: &mut PathBuf, base: &Path) {
    if p.is_relative() && !base.as_os_str().is_empty() {
        *p = base.join(&*p);
    }
}

/// Load a workflow config. A missing file yields defaults resolved against
/// the directory the file would live in.
pub fn load_config(path: &Path, strict: bool) -> Result<WorkflowConfig, ConfigError> {
    let base = path.parent().unwrap_or(Path::new("")).to_path_buf();
    if !path.exists() {
        tracing::debug!(event = "config.defaults", path = %path.display());
        let mut cfg = WorkflowConfig::default();
        cfg.resolve_paths(&base);
        return Ok(cfg);
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;

    let mut cfg = parse_config(&raw, strict)
        .map_err(|ConfigError(msg)| ConfigError(format!("{} (file: {})", msg, path.display())))?;
    cfg.resolve_paths(&base);
    Ok(cfg)
}

pub fn parse_config(raw: &str, strict: bool) -> Result<WorkflowConfig, ConfigError> {
    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let cfg: WorkflowConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    // `x-` and `_` prefixed keys are free for YAML anchors
    let unknown: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    if !unknown.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "Unknown fields detected in strict mode: {:?}",
                unknown
            )));
        }
        tracing::warn!(event = "config.unknown_fields", fields = ?unknown);
    }

    if cfg.version != 0 && cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: 0, {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if cfg.settings.parallel == 0 {
        return Err(ConfigError("settings.parallel must be at least 1".into()));
    }
    if cfg.capabilities.max_code_runs == 0 {
        return Err(ConfigError("capabilities.max_code_runs must be at least 1".into()));
    }
    Ok(cfg)
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(
        path,
        r#"version: 1
checks: checks.json
data_dir: data
cache_dir: cached_mem
settings:
  parallel: 4
  planner_timeout_seconds: 120
  executor_timeout_seconds: 300
capabilities:
  provider: openai
  planner_model: gpt-5-mini
  executor_model: gpt-4.1-mini
  python: python3
  code_timeout_seconds: 90
  max_code_runs: 2
"#,
    )
    .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_resolved_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("rulecache.yaml"), false).unwrap();
        assert_eq!(cfg.settings.parallel, 4);
        assert_eq!(cfg.capabilities.provider, ProviderKind::Openai);
        assert_eq!(cfg.data_dir, dir.path().join("data"));
        assert_eq!(cfg.ledger_path(), dir.path().join("cached_mem/workflows.json"));
    }

    #[test]
    fn sample_config_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rulecache.yaml");
        write_sample_config(&path).unwrap();
        let cfg = load_config(&path, true).unwrap();
        assert_eq!(cfg.capabilities.max_code_runs, 2);
        assert_eq!(cfg.checks, dir.path().join("checks.json"));
    }

    #[test]
    fn unknown_keys_fail_only_in_strict_mode() {
        let raw = "version: 1\nsettings:\n  paralel: 2\nx-anchor: 1\n";
        assert!(parse_config(raw, false).is_ok());
        let err = parse_config(raw, true).unwrap_err();
        assert!(err.0.contains("settings.paralel"), "{}", err);
    }

    #[test]
    fn rejects_unsupported_version_and_zero_parallel() {
        assert!(parse_config("version: 7\n", false).is_err());
        assert!(parse_config("settings:\n  parallel: 0\n", false).is_err());
    }

    #[test]
    fn explicit_sqlite_ledger_path_is_resolved() {
        let mut cfg = parse_config("ledger: state/ledger.db\nprovider_unused: 1\n", false).unwrap();
        cfg.resolve_paths(Path::new("/srv/wf"));
        assert_eq!(cfg.ledger_path(), PathBuf::from("/srv/wf/state/ledger.db"));
    }
}
