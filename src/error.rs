use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors returned by policy mutations on the capability registry.
///
/// Gate checks never produce these; a denied step is a [`crate::policy::GateDecision`].
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Unknown capability type: `{0}`")]
    UnknownCapability(String),

    #[error("The `unknown` capability is a sentinel and cannot be enabled")]
    SentinelLocked,

    #[error("Unknown execution profile: `{0}`")]
    UnknownProfile(String),

    #[error("Invalid execution mode: `{0}` (expected `manual` or `disabled`)")]
    InvalidMode(String),
}

/// Errors related to safety guardrails (command filtering, workspace enforcement).
#[derive(Debug, thiserror::Error)]
pub enum GuardrailError {
    #[error("Command blocked: `{command}` - {reason}")]
    CommandBlocked { command: String, reason: String },

    #[error("Write outside workspace: `{path}` is not within `{workspace}`")]
    WriteOutsideWorkspace { path: PathBuf, workspace: PathBuf },
}

/// Errors related to shell command execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn shell process: {0}")]
    SpawnFailed(String),

    #[error("Process execution failed: {0}")]
    ProcessFailed(String),
}

/// Errors related to the agent pipeline and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("LLM backend not reachable at {url}: {message}")]
    BackendUnavailable { url: String, message: String },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Agent turn cancelled")]
    Cancelled,

    #[error("Sub-agent limit reached ({running}/{max} running)")]
    SubagentLimit { running: usize, max: usize },
}
