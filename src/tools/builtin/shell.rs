use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::required_str;
use crate::safety::SafetyLayer;
use crate::tools::{Tool, ToolContext, ToolDefinition, ToolResult};

pub struct RunCommand {
    safety: Arc<SafetyLayer>,
}

impl RunCommand {
    pub fn new(safety: Arc<SafetyLayer>) -> Self {
        Self { safety }
    }
}

#[async_trait]
impl Tool for RunCommand {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "run_command",
            "run_command",
            "Run a shell command (`sh -c`) in the workspace. Returns stdout, stderr, \
             exit_code and timed_out. Commands are checked against a blocklist.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" }
            },
            "required": ["command"]
        }))
    }

    async fn execute(&self, args: &Map<String, Value>, _ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let command = required_str(args, "command")?;
        let exec = self.safety.execute(command).await?;

        let error = if exec.timed_out {
            Some("command timed out".to_string())
        } else {
            match exec.exit_code {
                Some(0) => None,
                Some(code) => Some(format!("command exited with status {code}")),
                None => Some("command was terminated by a signal".to_string()),
            }
        };

        let mut result = ToolResult::ok(serde_json::to_value(&exec)?);
        if let Some(error) = error {
            result.success = false;
            result.error = Some(error);
        }
        Ok(result)
    }
}
