//! The agent processing path and its collaborator seams.
//!
//! [`Agent`] is the single entry point shared by the foreground request path,
//! sub-agent spawns and heartbeat ticks. [`pipeline::AgentPipeline`] is the
//! implementation: LLM call, normalize, scope, gate, execute.

pub mod approval;
pub mod backend;
pub mod pipeline;
pub mod router;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// One invocation of the agent.
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub prompt: String,
    /// Set for heartbeat turns that no user asked for.
    pub proactive: bool,
    pub specialist: Option<String>,
    pub channel_type: Option<String>,
    pub chat_id: Option<String>,
    /// Set when the invocation runs as a background sub-agent.
    pub subagent_id: Option<String>,
    /// Checked between pipeline iterations; in-flight calls are not interrupted.
    pub cancel: CancellationToken,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn proactive(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            proactive: true,
            ..Default::default()
        }
    }

    pub fn with_specialist(mut self, specialist: impl Into<String>) -> Self {
        self.specialist = Some(specialist.into());
        self
    }

    pub fn with_channel(mut self, channel_type: impl Into<String>, chat_id: impl Into<String>) -> Self {
        self.channel_type = Some(channel_type.into());
        self.chat_id = Some(chat_id.into());
        self
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    /// Run one agent turn and return its final text.
    async fn process(&self, request: AgentRequest) -> anyhow::Result<String>;
}
