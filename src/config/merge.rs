use super::schema::{AppConfig, PartialConfig};
use crate::orchestration::heartbeat::{HeartbeatConfig, DEFAULT_HEARTBEAT_PROMPT};
use crate::safety::defaults::default_blocklist;
use std::path::PathBuf;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful assistant acting on the user's machine. \
Use the provided tools when an action is required. Tool results tell you whether \
an action was allowed; never retry an action the policy refused.";

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For blocked_patterns and specialists: REPLACE semantics.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            model: self.model.or(fallback.model),
            ollama_url: self.ollama_url.or(fallback.ollama_url),
            workspace: self.workspace.or(fallback.workspace),
            policy_path: self.policy_path.or(fallback.policy_path),
            stream: self.stream.or(fallback.stream),
            max_iterations: self.max_iterations.or(fallback.max_iterations),
            system_prompt: self.system_prompt.or(fallback.system_prompt),
            shell_timeout_secs: self.shell_timeout_secs.or(fallback.shell_timeout_secs),
            blocked_patterns: self.blocked_patterns.or(fallback.blocked_patterns),
            security_log_path: self.security_log_path.or(fallback.security_log_path),
            heartbeat_enabled: self.heartbeat_enabled.or(fallback.heartbeat_enabled),
            heartbeat_interval_ms: self.heartbeat_interval_ms.or(fallback.heartbeat_interval_ms),
            heartbeat_prompt: self.heartbeat_prompt.or(fallback.heartbeat_prompt),
            max_running_subagents: self.max_running_subagents.or(fallback.max_running_subagents),
            subagent_retention_secs: self
                .subagent_retention_secs
                .or(fallback.subagent_retention_secs),
            specialists: self.specialists.or(fallback.specialists),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    /// `default_policy_path` is used when no source names a policy file.
    pub fn finalize(self, default_policy_path: Option<PathBuf>) -> AppConfig {
        let workspace = self
            .workspace
            .unwrap_or_else(|| PathBuf::from("./workspace"));
        let security_log_path = self
            .security_log_path
            .unwrap_or_else(|| workspace.join("security.log"));
        let policy_path = self
            .policy_path
            .or(default_policy_path)
            .unwrap_or_else(|| workspace.join(".warden").join("policy.json"));

        AppConfig {
            model: self.model.unwrap_or_else(|| "llama3.2".to_string()),
            ollama_url: self
                .ollama_url
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            workspace,
            policy_path,
            stream: self.stream.unwrap_or(true),
            max_iterations: self.max_iterations.unwrap_or(8).max(1),
            system_prompt: self
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            shell_timeout_secs: self.shell_timeout_secs.unwrap_or(30),
            blocked_patterns: self.blocked_patterns.unwrap_or_else(default_blocklist),
            security_log_path,
            heartbeat: HeartbeatConfig {
                enabled: self.heartbeat_enabled.unwrap_or(false),
                interval_ms: self.heartbeat_interval_ms.unwrap_or(30 * 60 * 1000),
                prompt: self
                    .heartbeat_prompt
                    .unwrap_or_else(|| DEFAULT_HEARTBEAT_PROMPT.to_string()),
            },
            max_running_subagents: self.max_running_subagents.unwrap_or(8),
            subagent_retention_secs: self.subagent_retention_secs.unwrap_or(3600),
            specialists: self.specialists.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_values_win() {
        let cli = PartialConfig {
            model: Some("qwen2.5:7b".into()),
            ..Default::default()
        };
        let file = PartialConfig {
            model: Some("llama3.2".into()),
            shell_timeout_secs: Some(5),
            ..Default::default()
        };
        let merged = cli.with_fallback(file).finalize(None);
        assert_eq!(merged.model, "qwen2.5:7b");
        assert_eq!(merged.shell_timeout_secs, 5);
    }

    #[test]
    fn defaults_fill_gaps() {
        let config = PartialConfig::default().finalize(None);
        assert_eq!(config.workspace, PathBuf::from("./workspace"));
        assert_eq!(config.policy_path, PathBuf::from("./workspace/.warden/policy.json"));
        assert!(!config.heartbeat.enabled);
        assert!(!config.blocked_patterns.is_empty());
        assert_eq!(config.max_iterations, 8);
    }

    #[test]
    fn zero_iterations_clamped() {
        let config = PartialConfig {
            max_iterations: Some(0),
            ..Default::default()
        }
        .finalize(None);
        assert_eq!(config.max_iterations, 1);
    }
}
