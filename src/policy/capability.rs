use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Capability type of the sentinel used for unclassified actions.
pub const UNKNOWN: &str = "unknown";

/// A named class of agent action subject to enable/disable policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    #[serde(rename = "type")]
    pub kind: String,
    /// Informational capabilities (`false`) never gate a runnable action.
    pub executable: bool,
    pub enabled: bool,
    pub description: String,
}

/// Global execution switch, independent of per-capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Steps may run; approval per step is the planner's concern.
    Manual,
    /// No executable capability may run.
    Disabled,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Manual => "manual",
            ExecutionMode::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ExecutionMode::Manual),
            "disabled" => Ok(ExecutionMode::Disabled),
            other => Err(PolicyError::InvalidMode(other.to_string())),
        }
    }
}

/// Returns the built-in capability catalog, all disabled.
///
/// The `unknown` sentinel is always last.
pub fn default_capabilities() -> Vec<Capability> {
    let entries: [(&str, bool, &str); 14] = [
        ("read_file", true, "Read file contents from disk"),
        ("write_file", true, "Create or overwrite files in the workspace"),
        ("edit_file", true, "Modify existing files in place"),
        ("delete_file", true, "Remove files from disk"),
        ("list_directory", true, "List directory entries"),
        ("run_command", true, "Execute shell commands"),
        ("git", true, "Run git operations"),
        ("clipboard", true, "Read or write the system clipboard"),
        ("screenshot", true, "Capture the screen"),
        ("web_fetch", true, "Fetch remote URLs"),
        ("send_message", true, "Send messages to chat channels"),
        ("spawn_subagent", true, "Start and manage background sub-agents"),
        ("analyze_content", false, "Analyze content already in the conversation"),
        (UNKNOWN, false, "Unclassified action"),
    ];

    entries
        .into_iter()
        .map(|(kind, executable, description)| Capability {
            kind: kind.to_string(),
            executable,
            enabled: false,
            description: description.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_keys_are_unique() {
        let caps = default_capabilities();
        let mut kinds: Vec<&str> = caps.iter().map(|c| c.kind.as_str()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), caps.len());
    }

    #[test]
    fn sentinel_is_not_executable() {
        let caps = default_capabilities();
        let unknown = caps.iter().find(|c| c.kind == UNKNOWN).unwrap();
        assert!(!unknown.executable);
        assert!(!unknown.enabled);
    }

    #[test]
    fn mode_parses_only_valid_values() {
        assert_eq!("manual".parse::<ExecutionMode>().unwrap(), ExecutionMode::Manual);
        assert_eq!("disabled".parse::<ExecutionMode>().unwrap(), ExecutionMode::Disabled);
        assert!("auto".parse::<ExecutionMode>().is_err());
        assert!("Manual".parse::<ExecutionMode>().is_err());
    }
}
