use async_trait::async_trait;
use serde::Serialize;

/// A message addressed to one chat on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub content: String,
    pub chat_id: String,
    pub channel_type: String,
}

/// Multi-channel transport. Having no router is valid: callers then render
/// return values themselves.
#[async_trait]
pub trait Router: Send + Sync {
    async fn send_to_channel(&self, message: OutboundMessage) -> anyhow::Result<()>;
}
