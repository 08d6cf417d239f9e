use async_trait::async_trait;

use crate::normalize::ToolCall;

/// Per-step approval hook consulted while the execution mode is `manual`.
///
/// The confirmation flow itself (asking a human) lives with the caller.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve(&self, call: &ToolCall, capability: &str) -> bool;
}
