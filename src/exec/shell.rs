use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::ExecError;

/// Result of a shell command execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Run `sh -c <command>` in `cwd`, killing the process after `timeout_secs`.
///
/// A timeout is reported through `timed_out`, not as an error.
pub async fn execute_shell(
    command: &str,
    cwd: &Path,
    timeout_secs: u64,
) -> Result<ExecResult, ExecError> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

    // Dropping the wait future on timeout drops the child, which kills it.
    match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(ExecError::ProcessFailed(e.to_string())),
        Err(_) => {
            tracing::warn!(command = %command, timeout_secs, "Command timed out");
            Ok(ExecResult {
                stdout: String::new(),
                stderr: format!("command timed out after {timeout_secs}s"),
                exit_code: None,
                timed_out: true,
            })
        }
    }
}
