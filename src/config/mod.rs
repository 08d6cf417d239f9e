pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Load configuration by merging global, workspace, and CLI sources.
/// Precedence: CLI > workspace config > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: global config, or the file named by --config
    let global = match &cli.config {
        Some(path) => load_toml_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?
            .unwrap_or_default(),
        None => load_global_config(),
    };

    let workspace_path = cli
        .workspace
        .clone()
        .or_else(|| global.workspace.clone())
        .unwrap_or_else(|| PathBuf::from("./workspace"));

    // Layer 2: workspace/warden.toml
    let workspace = load_toml_file(&workspace_path.join("warden.toml"))
        .unwrap_or_else(|e| {
            tracing::warn!("{e:#}");
            None
        })
        .unwrap_or_default();

    // Layer 3: CLI args
    let cli_partial = cli_to_partial(cli);

    Ok(cli_partial
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize(global_policy_path()))
}

/// Returns empty PartialConfig if the file is missing or unreadable.
fn load_global_config() -> PartialConfig {
    let Some(path) = global_config_path() else {
        tracing::debug!("Could not determine global config directory");
        return PartialConfig::default();
    };
    match load_toml_file(&path) {
        Ok(partial) => partial.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("{e:#}");
            PartialConfig::default()
        }
    }
}

/// Parse a TOML config file. `Ok(None)` when the file does not exist.
fn load_toml_file(path: &Path) -> Result<Option<PartialConfig>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let file = parse_config(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            tracing::info!("Loaded config from {}", path.display());
            Ok(Some(file))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Ok(None)
        }
        Err(source) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse TOML config contents into a [`PartialConfig`].
pub fn parse_config(contents: &str) -> Result<PartialConfig, toml::de::Error> {
    toml::from_str::<ConfigFile>(contents).map(ConfigFile::to_partial)
}

/// Linux: ~/.config/warden/warden.toml
/// macOS: ~/Library/Application Support/warden/warden.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "warden")
        .map(|dirs| dirs.config_dir().join("warden.toml"))
}

/// The process-wide policy file lives in the platform data directory.
fn global_policy_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "warden").map(|dirs| dirs.data_dir().join("policy.json"))
}

fn cli_to_partial(cli: &Cli) -> PartialConfig {
    let mut partial = PartialConfig {
        model: cli.model.clone(),
        workspace: cli.workspace.clone(),
        policy_path: cli.policy.clone(),
        ..Default::default()
    };
    match &cli.command {
        Commands::Run { no_stream: true, .. } => partial.stream = Some(false),
        Commands::Heartbeat {
            interval_ms,
            prompt,
        } => {
            partial.heartbeat_interval_ms = *interval_ms;
            partial.heartbeat_prompt = prompt.clone();
            // Running the heartbeat command implies enabling it.
            partial.heartbeat_enabled = Some(true);
        }
        _ => {}
    }
    partial
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_toml_is_a_parse_error_naming_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "[general\nmodel = 1").unwrap();
        match load_toml_file(&path) {
            Err(ConfigError::ParseError { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(load_toml_file(&dir.path().join("missing.toml")).unwrap().is_none());
    }

    #[test]
    fn parses_every_section() {
        let partial = parse_config(
            r#"
            [general]
            model = "qwen2.5:7b"
            stream = false

            [agent]
            max_iterations = 3

            [safety]
            shell_timeout_secs = 10
            blocked_patterns = [{ pattern = "rm", reason = "no rm" }]

            [heartbeat]
            enabled = true
            interval_ms = 5000
            prompt = "check in"

            [subagents]
            max_running = 2

            [specialists]
            run_command = ["coder"]
            "#,
        )
        .unwrap();

        let config = partial.finalize(None);
        assert_eq!(config.model, "qwen2.5:7b");
        assert!(!config.stream);
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.blocked_patterns, vec![("rm".to_string(), "no rm".to_string())]);
        assert!(config.heartbeat.enabled);
        assert_eq!(config.heartbeat.interval_ms, 5000);
        assert_eq!(config.heartbeat.prompt, "check in");
        assert_eq!(config.max_running_subagents, 2);
        assert_eq!(config.specialists["run_command"], vec!["coder".to_string()]);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(parse_config("[general\nmodel = ").is_err());
    }
}
