//! Built-in tool set.
//!
//! File and shell tools go through the shared [`SafetyLayer`]: writes are
//! held to the workspace and shell commands are filtered and time-limited.
//! These checks come after the capability gate, not instead of it.

mod fs;
mod message;
mod shell;
mod subagent;

use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};

use super::ToolRegistry;
use crate::safety::SafetyLayer;

pub use fs::{EditFile, ListDirectory, ReadFile, WriteFile};
pub use message::SendMessage;
pub use shell::RunCommand;
pub use subagent::{CancelSubagent, SpawnSubagent, SubagentStatusTool};

pub fn register_builtin_tools(registry: &mut ToolRegistry, safety: Arc<SafetyLayer>) {
    registry.register(ReadFile::new(Arc::clone(&safety)));
    registry.register(ListDirectory::new(Arc::clone(&safety)));
    registry.register(WriteFile::new(Arc::clone(&safety)));
    registry.register(EditFile::new(Arc::clone(&safety)));
    registry.register(RunCommand::new(safety));
    registry.register(SpawnSubagent);
    registry.register(SubagentStatusTool);
    registry.register(CancelSubagent);
    registry.register(SendMessage);
}

fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("missing or invalid '{key}' argument"))
}

fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}
