//! Events emitted by the background entry points.
//!
//! The sub-agent manager and the heartbeat publish on an optional unbounded
//! channel; whoever holds the receiver decides what to do with them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::orchestration::types::{SubagentId, SubagentStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    SubagentStatusChanged {
        id: SubagentId,
        name: String,
        status: SubagentStatus,
    },
    HeartbeatBeat {
        timestamp: DateTime<Utc>,
        response: String,
    },
    HeartbeatError {
        timestamp: DateTime<Utc>,
        error: String,
    },
}

pub type EventSender = UnboundedSender<AgentEvent>;

/// Send if a channel is attached; a closed receiver is not an error.
pub(crate) fn emit(tx: Option<&EventSender>, event: AgentEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}
