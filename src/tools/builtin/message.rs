use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{optional_str, required_str};
use crate::agent::router::OutboundMessage;
use crate::tools::{Tool, ToolContext, ToolDefinition, ToolResult};

/// Send a message through the router, to the current chat unless another
/// target is given.
pub struct SendMessage;

#[async_trait]
impl Tool for SendMessage {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "send_message",
            "send_message",
            "Send a message to a chat. Defaults to the chat this request came from.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "chat_id": { "type": "string" },
                "channel_type": { "type": "string" }
            },
            "required": ["content"]
        }))
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let Some(router) = &ctx.router else {
            return Ok(ToolResult::failure("no message router is configured"));
        };
        let content = required_str(args, "content")?;
        let chat_id = optional_str(args, "chat_id").or(ctx.chat_id.as_deref());
        let channel_type = optional_str(args, "channel_type").or(ctx.channel_type.as_deref());
        let (Some(chat_id), Some(channel_type)) = (chat_id, channel_type) else {
            return Ok(ToolResult::failure("send_message: no target chat"));
        };

        router
            .send_to_channel(OutboundMessage {
                content: content.to_string(),
                chat_id: chat_id.to_string(),
                channel_type: channel_type.to_string(),
            })
            .await
            .context("router rejected the message")?;

        Ok(ToolResult::ok(json!({
            "delivered": true,
            "chat_id": chat_id,
            "channel_type": channel_type,
        })))
    }
}
