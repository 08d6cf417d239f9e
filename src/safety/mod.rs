pub mod command_filter;
pub mod defaults;
pub mod workspace;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use command_filter::{BlockedCommand, CommandFilter};
use workspace::WorkspaceGuard;

use crate::config::AppConfig;
use crate::exec::{execute_shell, ExecResult};

/// Guardrails shared by the built-in file and shell tools: the command
/// blocklist, the workspace write boundary and the shell timeout.
///
/// These checks run after the capability gate has allowed the step. All shell
/// execution from tools goes through [`SafetyLayer::execute`].
pub struct SafetyLayer {
    command_filter: CommandFilter,
    workspace_guard: WorkspaceGuard,
    timeout_secs: u64,
    security_log_path: PathBuf,
}

impl SafetyLayer {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let command_filter = CommandFilter::new(&config.blocked_patterns)
            .map_err(|e| anyhow::anyhow!("Failed to compile command filter patterns: {}", e))?;

        let workspace_guard = WorkspaceGuard::new(&config.workspace)
            .map_err(|e| anyhow::anyhow!("Failed to initialize workspace guard: {}", e))?;

        Ok(Self {
            command_filter,
            workspace_guard,
            timeout_secs: config.shell_timeout_secs,
            security_log_path: config.security_log_path.clone(),
        })
    }

    /// Run a shell command in the workspace unless the blocklist refuses it.
    ///
    /// A refused command is not an error: it comes back as an [`ExecResult`]
    /// with the refusal JSON in `stderr` and exit code 126.
    pub async fn execute(&self, command: &str) -> anyhow::Result<ExecResult> {
        if let Some(blocked) = self.command_filter.check(command) {
            tracing::warn!(command = %command, reason = %blocked.reason, "Command blocked");
            self.log_blocked_command(&blocked);
            return Ok(ExecResult {
                stdout: String::new(),
                stderr: blocked.to_json().to_string(),
                exit_code: Some(126),
                timed_out: false,
            });
        }

        Ok(execute_shell(command, self.workspace_guard.canonical_root(), self.timeout_secs).await?)
    }

    pub fn workspace(&self) -> &WorkspaceGuard {
        &self.workspace_guard
    }

    pub fn workspace_root(&self) -> &Path {
        self.workspace_guard.canonical_root()
    }

    /// Append one JSON line per refused command. Write failures are only traced.
    fn log_blocked_command(&self, blocked: &BlockedCommand) {
        let mut entry = blocked.to_json();
        entry["timestamp"] = serde_json::Value::String(Utc::now().to_rfc3339());
        let line = format!("{entry}\n");

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.security_log_path)
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(e) = result {
            tracing::warn!(
                "Failed to write security log at {}: {}",
                self.security_log_path.display(),
                e
            );
        }
    }
}
