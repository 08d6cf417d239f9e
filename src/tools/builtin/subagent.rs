//! Tools that drive the supervisor. Sub-agents cannot spawn further sub-agents.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{optional_str, required_str};
use crate::orchestration::manager::SubagentManager;
use crate::orchestration::types::{Origin, SpawnRequest, SubagentStatus};
use crate::tools::{Tool, ToolContext, ToolDefinition, ToolResult};

fn supervisor(ctx: &ToolContext) -> Result<&SubagentManager, ToolResult> {
    ctx.subagents
        .as_ref()
        .ok_or_else(|| ToolResult::failure("sub-agent supervisor is not available"))
}

pub struct SpawnSubagent;

#[async_trait]
impl Tool for SpawnSubagent {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "spawn_subagent",
            "spawn_subagent",
            "Start a background sub-agent on a task. Returns immediately with its id; \
             poll with subagent_status.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "What the sub-agent should do" },
                "name": { "type": "string" },
                "notify": { "type": "boolean", "description": "Message this chat when it finishes" },
                "specialist": { "type": "string", "description": "Must match the current role if given" }
            },
            "required": ["task"]
        }))
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        if ctx.subagent_id.is_some() {
            return Ok(ToolResult::failure("sub-agents cannot spawn further sub-agents"));
        }
        let manager = match supervisor(ctx) {
            Ok(m) => m,
            Err(result) => return Ok(result),
        };

        let origin = match (&ctx.channel_type, &ctx.chat_id) {
            (Some(channel_type), Some(chat_id)) => Some(Origin {
                channel_type: channel_type.clone(),
                chat_id: chat_id.clone(),
            }),
            _ => None,
        };
        // A sub-agent runs with the caller's scope, never a wider one.
        let requested = optional_str(args, "specialist");
        if let Some(role) = requested
            && ctx.specialist.as_deref() != Some(role)
        {
            return Ok(ToolResult::denied(format!(
                "cannot spawn a `{role}` sub-agent from a {} turn",
                ctx.specialist.as_deref().map_or("unscoped".to_string(), |s| format!("`{s}`"))
            )));
        }

        let request = SpawnRequest {
            task: required_str(args, "task")?.to_string(),
            name: optional_str(args, "name").map(str::to_string),
            notify: args.get("notify").and_then(Value::as_bool).unwrap_or(false),
            origin,
            specialist: ctx.specialist.clone(),
        };

        match manager.spawn(request) {
            Ok(info) => Ok(ToolResult::ok(serde_json::to_value(info)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

pub struct SubagentStatusTool;

#[async_trait]
impl Tool for SubagentStatusTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "subagent_status",
            "spawn_subagent",
            "Get one sub-agent by id, or list sub-agents optionally filtered by status.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "status": { "type": "string", "enum": ["running", "completed", "failed", "cancelled"] }
            }
        }))
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let manager = match supervisor(ctx) {
            Ok(m) => m,
            Err(result) => return Ok(result),
        };

        if let Some(id) = optional_str(args, "id") {
            return Ok(match manager.get_status(id) {
                Some(info) => ToolResult::ok(serde_json::to_value(info)?),
                None => ToolResult::failure(format!("no sub-agent with id {id}")),
            });
        }

        let status = match optional_str(args, "status").map(str::parse::<SubagentStatus>) {
            None => None,
            Some(Ok(s)) => Some(s),
            Some(Err(e)) => return Ok(ToolResult::failure(e)),
        };
        let list = manager.list(status);
        Ok(ToolResult::ok(json!({ "count": list.len(), "subagents": list })))
    }
}

pub struct CancelSubagent;

#[async_trait]
impl Tool for CancelSubagent {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "cancel_subagent",
            "spawn_subagent",
            "Cancel a running sub-agent. Work already in progress may still finish, \
             but its result is discarded.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        }))
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let manager = match supervisor(ctx) {
            Ok(m) => m,
            Err(result) => return Ok(result),
        };
        let id = required_str(args, "id")?;
        let cancelled = manager.cancel(id);
        Ok(ToolResult::ok(json!({ "id": id, "cancelled": cancelled })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::super::test_support::ctx;
    use super::*;
    use crate::agent::{Agent, AgentRequest};

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        async fn process(&self, request: AgentRequest) -> anyhow::Result<String> {
            Ok(format!("{} as {:?}", request.prompt, request.specialist))
        }
    }

    fn ctx_with_manager() -> (ToolContext, SubagentManager) {
        let manager = SubagentManager::new(Arc::new(Echo), CancellationToken::new(), 4);
        let mut ctx = ctx();
        ctx.subagents = Some(manager.clone());
        (ctx, manager)
    }

    #[tokio::test]
    async fn spawn_returns_running_record() {
        let (mut ctx, manager) = ctx_with_manager();
        ctx.specialist = Some("coder".into());
        let args = json!({"task": "index", "specialist": "coder"}).as_object().unwrap().clone();
        let result = SpawnSubagent.execute(&args, &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["status"], "running");

        let id = result.data["id"].as_str().unwrap();
        let info = manager.wait_for(id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(info.record.result.as_deref(), Some("index as Some(\"coder\")"));
    }

    #[tokio::test]
    async fn spawn_inherits_caller_scope() {
        let (mut ctx, manager) = ctx_with_manager();
        ctx.specialist = Some("writer".into());
        let args = json!({"task": "draft"}).as_object().unwrap().clone();
        let result = SpawnSubagent.execute(&args, &ctx).await.unwrap();
        let id = result.data["id"].as_str().unwrap();
        let info = manager.wait_for(id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(info.record.result.as_deref(), Some("draft as Some(\"writer\")"));
    }

    #[tokio::test]
    async fn spawn_refuses_a_different_specialist() {
        let (mut ctx, manager) = ctx_with_manager();
        ctx.specialist = Some("writer".into());
        let args = json!({"task": "deploy", "specialist": "ops"}).as_object().unwrap().clone();
        let result = SpawnSubagent.execute(&args, &ctx).await.unwrap();
        assert!(result.denied);
        assert!(manager.list(None).is_empty());

        ctx.specialist = None;
        let result = SpawnSubagent.execute(&args, &ctx).await.unwrap();
        assert!(result.denied);
        assert!(manager.list(None).is_empty());
    }

    #[tokio::test]
    async fn nested_spawn_is_refused() {
        let (mut ctx, manager) = ctx_with_manager();
        ctx.subagent_id = Some("parent".into());
        let args = json!({"task": "again"}).as_object().unwrap().clone();
        let result = SpawnSubagent.execute(&args, &ctx).await.unwrap();
        assert!(!result.success);
        assert!(manager.list(None).is_empty());
    }

    #[tokio::test]
    async fn without_supervisor_is_a_failure() {
        let args = json!({"task": "x"}).as_object().unwrap().clone();
        let result = SpawnSubagent.execute(&args, &ctx()).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn status_rejects_bad_filter_and_cancel_reports_false() {
        let (ctx, _manager) = ctx_with_manager();
        let bad = json!({"status": "zombie"}).as_object().unwrap().clone();
        assert!(!SubagentStatusTool.execute(&bad, &ctx).await.unwrap().success);

        let cancel = json!({"id": "missing"}).as_object().unwrap().clone();
        let result = CancelSubagent.execute(&cancel, &ctx).await.unwrap();
        assert_eq!(result.data["cancelled"], false);
    }
}
