//! JSONL log of every planner model call, kept for auditing prompts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLogRecord {
    pub ts: String,
    pub check_id: String,
    pub model: String,
    pub prompt_msgs: serde_json::Value,
    pub response_text: String,
    #[serde(default)]
    pub inputs: serde_json::Value,
}

pub struct PlanLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PlanLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &PlanLogRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open plan log {}", self.path.display()))?;
        f.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Last `n` readable records, oldest first. Malformed lines are skipped.
    pub fn tail(&self, n: usize) -> Result<Vec<PlanLogRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read plan log {}", self.path.display()))?;
        let mut records: Vec<PlanLogRecord> = raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }
}
