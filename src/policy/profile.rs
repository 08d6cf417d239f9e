use std::collections::BTreeSet;

use serde::Serialize;

use super::capability::{default_capabilities, ExecutionMode};

/// Name recorded as the active profile once live state diverges from a template.
pub const CUSTOM_PROFILE: &str = "custom";

/// Name of the profile applied when no persisted policy exists.
pub const BOOTSTRAP_PROFILE: &str = "safe";

/// An immutable template of capability settings plus an execution mode.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub execution_mode: ExecutionMode,
    pub enabled_caps: BTreeSet<String>,
}

fn caps(kinds: &[&str]) -> BTreeSet<String> {
    kinds.iter().map(|k| k.to_string()).collect()
}

/// The built-in profile templates.
pub fn builtin_profiles() -> Vec<ExecutionProfile> {
    let all_executable = default_capabilities()
        .into_iter()
        .filter(|c| c.executable)
        .map(|c| c.kind)
        .collect();

    vec![
        ExecutionProfile {
            name: "safe",
            description: "Every capability disabled",
            execution_mode: ExecutionMode::Manual,
            enabled_caps: BTreeSet::new(),
        },
        ExecutionProfile {
            name: "editor",
            description: "Read, write and edit files",
            execution_mode: ExecutionMode::Manual,
            enabled_caps: caps(&["read_file", "write_file", "edit_file"]),
        },
        ExecutionProfile {
            name: "developer",
            description: "File editing, shell commands, git and sub-agents",
            execution_mode: ExecutionMode::Manual,
            enabled_caps: caps(&[
                "read_file",
                "write_file",
                "edit_file",
                "list_directory",
                "run_command",
                "git",
                "spawn_subagent",
            ]),
        },
        ExecutionProfile {
            name: "full",
            description: "Every executable capability enabled",
            execution_mode: ExecutionMode::Manual,
            enabled_caps: all_executable,
        },
        ExecutionProfile {
            name: "locked",
            description: "Execution disabled globally",
            execution_mode: ExecutionMode::Disabled,
            enabled_caps: BTreeSet::new(),
        },
    ]
}

/// Look up a built-in profile by name.
pub fn find_profile(name: &str) -> Option<ExecutionProfile> {
    builtin_profiles().into_iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::capability::UNKNOWN;

    #[test]
    fn custom_is_not_a_template() {
        assert!(find_profile(CUSTOM_PROFILE).is_none());
    }

    #[test]
    fn bootstrap_profile_exists() {
        assert!(find_profile(BOOTSTRAP_PROFILE).is_some());
    }

    #[test]
    fn full_never_includes_informational_caps() {
        let full = find_profile("full").unwrap();
        assert!(!full.enabled_caps.contains("analyze_content"));
        assert!(!full.enabled_caps.contains(UNKNOWN));
        assert!(full.enabled_caps.contains("run_command"));
    }
}
