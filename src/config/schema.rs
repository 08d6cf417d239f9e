use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::orchestration::heartbeat::HeartbeatConfig;

/// The TOML file structure for warden.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub agent: Option<AgentSection>,
    pub safety: Option<SafetyConfig>,
    pub heartbeat: Option<HeartbeatSection>,
    pub subagents: Option<SubagentSection>,
    /// Tool name -> specialist roles allowed to see it.
    pub specialists: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub model: Option<String>,
    pub workspace: Option<String>,
    pub ollama_url: Option<String>,
    pub policy_file: Option<String>,
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AgentSection {
    pub max_iterations: Option<usize>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SafetyConfig {
    pub shell_timeout_secs: Option<u64>,
    /// If specified, fully replaces the default blocklist.
    pub blocked_patterns: Option<Vec<BlocklistEntry>>,
    pub security_log: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlocklistEntry {
    pub pattern: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatSection {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubagentSection {
    pub max_running: Option<usize>,
    pub retention_secs: Option<u64>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub ollama_url: String,
    pub workspace: PathBuf,
    pub policy_path: PathBuf,
    pub stream: bool,
    pub max_iterations: usize,
    pub system_prompt: String,
    pub shell_timeout_secs: u64,
    pub blocked_patterns: Vec<(String, String)>,
    pub security_log_path: PathBuf,
    pub heartbeat: HeartbeatConfig,
    pub max_running_subagents: usize,
    pub subagent_retention_secs: u64,
    pub specialists: BTreeMap<String, Vec<String>>,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub model: Option<String>,
    pub ollama_url: Option<String>,
    pub workspace: Option<PathBuf>,
    pub policy_path: Option<PathBuf>,
    pub stream: Option<bool>,
    pub max_iterations: Option<usize>,
    pub system_prompt: Option<String>,
    pub shell_timeout_secs: Option<u64>,
    pub blocked_patterns: Option<Vec<(String, String)>>,
    pub security_log_path: Option<PathBuf>,
    pub heartbeat_enabled: Option<bool>,
    pub heartbeat_interval_ms: Option<u64>,
    pub heartbeat_prompt: Option<String>,
    pub max_running_subagents: Option<usize>,
    pub subagent_retention_secs: Option<u64>,
    pub specialists: Option<BTreeMap<String, Vec<String>>>,
}

impl ConfigFile {
    /// Flatten the sectioned file into a [`PartialConfig`].
    pub fn to_partial(self) -> PartialConfig {
        let general = self.general;
        let agent = self.agent;
        let safety = self.safety;
        let heartbeat = self.heartbeat;
        let subagents = self.subagents;

        let (model, workspace, ollama_url, policy_path, stream) = match general {
            Some(g) => (
                g.model,
                g.workspace.map(PathBuf::from),
                g.ollama_url,
                g.policy_file.map(PathBuf::from),
                g.stream,
            ),
            None => (None, None, None, None, None),
        };

        let (shell_timeout_secs, blocked_patterns, security_log_path) = match safety {
            Some(s) => (
                s.shell_timeout_secs,
                s.blocked_patterns
                    .map(|entries| entries.into_iter().map(|e| (e.pattern, e.reason)).collect()),
                s.security_log.map(PathBuf::from),
            ),
            None => (None, None, None),
        };

        PartialConfig {
            model,
            ollama_url,
            workspace,
            policy_path,
            stream,
            max_iterations: agent.as_ref().and_then(|a| a.max_iterations),
            system_prompt: agent.and_then(|a| a.system_prompt),
            shell_timeout_secs,
            blocked_patterns,
            security_log_path,
            heartbeat_enabled: heartbeat.as_ref().and_then(|h| h.enabled),
            heartbeat_interval_ms: heartbeat.as_ref().and_then(|h| h.interval_ms),
            heartbeat_prompt: heartbeat.and_then(|h| h.prompt),
            max_running_subagents: subagents.as_ref().and_then(|s| s.max_running),
            subagent_retention_secs: subagents.and_then(|s| s.retention_secs),
            specialists: self.specialists,
        }
    }
}
