use crate::model::CodeRun;
use anyhow::Context;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Exit code recorded when a code run is killed on timeout.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Runs generated code in a fresh interpreter process.
#[derive(Debug, Clone)]
pub struct PythonRunner {
    pub python: String,
    pub workdir: PathBuf,
    /// Exposed to the code as `DATA_DIR`.
    pub data_dir: PathBuf,
    pub timeout: Duration,
}

impl PythonRunner {
    /// Run `code` to completion. Failing to start the interpreter is an
    /// error; a nonzero exit or a timeout is a normal [`CodeRun`].
    pub async fn run(&self, code: &str) -> anyhow::Result<CodeRun> {
        let child = Command::new(&self.python)
            .arg("-c")
            .arg(code)
            .current_dir(&self.workdir)
            .env("DATA_DIR", &self.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start interpreter '{}'", self.python))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.context("failed to collect interpreter output")?;
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                Ok(CodeRun {
                    code: code.to_string(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: if stderr.trim().is_empty() { None } else { Some(stderr) },
                    exit_code: output.status.code().unwrap_or(TIMEOUT_EXIT_CODE),
                })
            }
            Err(_) => {
                tracing::warn!(
                    event = "code.timeout",
                    seconds = self.timeout.as_secs(),
                    "generated code exceeded its time limit"
                );
                Ok(CodeRun {
                    code: code.to_string(),
                    stdout: String::new(),
                    stderr: Some(format!("timed out after {}s", self.timeout.as_secs())),
                    exit_code: TIMEOUT_EXIT_CODE,
                })
            }
        }
    }
}
