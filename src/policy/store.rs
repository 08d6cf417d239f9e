//! On-disk form of the policy state.
//!
//! The file is a JSON object `{executionMode, capabilities, activeProfile}`.
//! Loading is field-by-field tolerant: a bad mode or a bad capability entry is
//! dropped on its own instead of rejecting the file.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;

use super::capability::ExecutionMode;

/// Serialized policy state, rewritten on every mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFile {
    pub execution_mode: ExecutionMode,
    pub capabilities: BTreeMap<String, bool>,
    pub active_profile: String,
}

/// Fields recovered from a policy file. Invalid fields are `None` / absent.
#[derive(Debug, Default, PartialEq)]
pub struct LoadedPolicy {
    pub execution_mode: Option<ExecutionMode>,
    pub capabilities: BTreeMap<String, bool>,
    pub active_profile: Option<String>,
}

#[derive(Debug)]
pub enum LoadOutcome {
    /// No file on disk.
    Missing,
    Loaded(LoadedPolicy),
    /// The file exists but could not be read or is not a JSON object.
    Unreadable(String),
}

/// Read the policy file once.
pub fn load(path: &Path) -> LoadOutcome {
    match std::fs::read_to_string(path) {
        Ok(contents) => match parse(&contents) {
            Some(loaded) => LoadOutcome::Loaded(loaded),
            None => LoadOutcome::Unreadable(format!("{} is not a JSON object", path.display())),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => LoadOutcome::Missing,
        Err(e) => LoadOutcome::Unreadable(format!("failed to read {}: {e}", path.display())),
    }
}

/// Parse policy file contents. Returns `None` only when the top level is not an object.
pub fn parse(contents: &str) -> Option<LoadedPolicy> {
    let root: Value = serde_json::from_str(contents).ok()?;
    let obj = root.as_object()?;

    let execution_mode = obj
        .get("executionMode")
        .and_then(Value::as_str)
        .and_then(|s| match s.parse::<ExecutionMode>() {
            Ok(mode) => Some(mode),
            Err(e) => {
                tracing::warn!("Ignoring persisted execution mode: {e}");
                None
            }
        });

    let mut capabilities = BTreeMap::new();
    if let Some(caps) = obj.get("capabilities").and_then(Value::as_object) {
        for (kind, value) in caps {
            match value.as_bool() {
                Some(enabled) => {
                    capabilities.insert(kind.clone(), enabled);
                }
                None => tracing::warn!(capability = %kind, "Ignoring non-boolean capability flag"),
            }
        }
    }

    let active_profile = obj
        .get("activeProfile")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(LoadedPolicy {
        execution_mode,
        capabilities,
        active_profile,
    })
}

/// Write the policy file atomically (temp file in the same directory, then rename).
pub fn save(path: &Path, file: &PolicyFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(file)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_keeps_valid_fields() {
        let loaded = parse(
            r#"{"executionMode":"disabled","capabilities":{"read_file":true},"activeProfile":"editor"}"#,
        )
        .unwrap();
        assert_eq!(loaded.execution_mode, Some(ExecutionMode::Disabled));
        assert_eq!(loaded.capabilities.get("read_file"), Some(&true));
        assert_eq!(loaded.active_profile.as_deref(), Some("editor"));
    }

    #[test]
    fn parse_drops_invalid_mode_and_entries_individually() {
        let loaded = parse(
            r#"{"executionMode":"yolo","capabilities":{"read_file":"yes","write_file":true}}"#,
        )
        .unwrap();
        assert_eq!(loaded.execution_mode, None);
        assert!(!loaded.capabilities.contains_key("read_file"));
        assert_eq!(loaded.capabilities.get("write_file"), Some(&true));
        assert_eq!(loaded.active_profile, None);
    }

    #[test]
    fn parse_rejects_non_objects() {
        assert!(parse("[1,2,3]").is_none());
        assert!(parse("not json").is_none());
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("policy.json");
        let file = PolicyFile {
            execution_mode: ExecutionMode::Manual,
            capabilities: BTreeMap::from([("git".to_string(), true)]),
            active_profile: "custom".to_string(),
        };
        save(&path, &file).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"executionMode\": \"manual\""));

        match load(&path) {
            LoadOutcome::Loaded(loaded) => {
                assert_eq!(loaded.capabilities.get("git"), Some(&true));
                assert_eq!(loaded.active_profile.as_deref(), Some("custom"));
            }
            other => panic!("expected loaded policy, got {other:?}"),
        }
    }

    #[test]
    fn load_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(load(&tmp.path().join("none.json")), LoadOutcome::Missing));
    }
}
