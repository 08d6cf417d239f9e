//! Background task supervisor.
//!
//! [`SubagentManager`] is the single source of truth for spawned sub-agents.
//! It wraps a `HashMap` behind `Arc<Mutex<..>>`; every status transition
//! happens under that lock, so a record leaves `running` exactly once.
//!
//! **Cancellation model:** each record holds a [`CancellationToken`] that is a
//! child of the manager's root token. Cancelling is bookkeeping first: the
//! record becomes `cancelled` immediately, and the token only asks the running
//! pipeline to stop at its next iteration boundary. Whatever the task returns
//! afterwards is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::types::{Origin, SpawnRequest, SubagentId, SubagentInfo, SubagentRecord, SubagentStatus};
use crate::agent::router::{OutboundMessage, Router};
use crate::agent::{Agent, AgentRequest};
use crate::error::AgentError;
use crate::event::{emit, AgentEvent, EventSender};

const NOTICE_PREVIEW_CHARS: usize = 500;

struct SubagentEntry {
    record: SubagentRecord,
    cancel_token: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
    origin: Option<Origin>,
}

/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct SubagentManager {
    entries: Arc<Mutex<HashMap<SubagentId, SubagentEntry>>>,
    agent: Arc<dyn Agent>,
    router: Option<Arc<dyn Router>>,
    event_tx: Option<EventSender>,
    root_cancel_token: CancellationToken,
    max_running: usize,
}

impl SubagentManager {
    /// - `agent`: the processing path every spawn runs.
    /// - `root_cancel_token`: cancelling it asks every record to stop.
    /// - `max_running`: spawns beyond this many running records are refused.
    pub fn new(agent: Arc<dyn Agent>, root_cancel_token: CancellationToken, max_running: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            agent,
            router: None,
            event_tx: None,
            root_cancel_token,
            max_running,
        }
    }

    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SubagentId, SubagentEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_status(&self, record: &SubagentRecord) {
        emit(
            self.event_tx.as_ref(),
            AgentEvent::SubagentStatusChanged {
                id: record.id.clone(),
                name: record.name.clone(),
                status: record.status,
            },
        );
    }

    /// Register a record and start the invocation on a tokio task.
    ///
    /// Returns as soon as the record exists; the snapshot is always `running`.
    pub fn spawn(&self, request: SpawnRequest) -> Result<SubagentInfo, AgentError> {
        let id = uuid::Uuid::new_v4().to_string();
        let name = request
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("subagent-{}", &id[..8]));
        let cancel_token = self.root_cancel_token.child_token();

        let record = SubagentRecord {
            id: id.clone(),
            name,
            task: request.task.clone(),
            status: SubagentStatus::Running,
            result: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
            notify: request.notify,
        };

        {
            let mut entries = self.entries();
            let running = entries
                .values()
                .filter(|e| e.record.status == SubagentStatus::Running)
                .count();
            if running >= self.max_running {
                return Err(AgentError::SubagentLimit {
                    running,
                    max: self.max_running,
                });
            }
            entries.insert(
                id.clone(),
                SubagentEntry {
                    record: record.clone(),
                    cancel_token: cancel_token.clone(),
                    join_handle: None,
                    origin: request.origin.clone(),
                },
            );
        }

        tracing::info!(id = %id, name = %record.name, "Spawned sub-agent");
        self.emit_status(&record);

        let agent_request = AgentRequest {
            prompt: request.task,
            specialist: request.specialist,
            channel_type: request.origin.as_ref().map(|o| o.channel_type.clone()),
            chat_id: request.origin.as_ref().map(|o| o.chat_id.clone()),
            subagent_id: Some(id.clone()),
            cancel: cancel_token,
            ..Default::default()
        };

        let manager = self.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let outcome = manager.agent.process(agent_request).await;
            manager.settle(&task_id, outcome).await;
        });

        if let Some(entry) = self.entries().get_mut(&id) {
            entry.join_handle = Some(handle);
        }

        Ok(SubagentInfo::snapshot(&record))
    }

    /// Apply the task outcome. Ignored unless the record is still running.
    async fn settle(&self, id: &SubagentId, outcome: anyhow::Result<String>) {
        let (record, origin) = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(id) else {
                tracing::debug!(id = %id, "Settled sub-agent was already removed");
                return;
            };
            if entry.record.status != SubagentStatus::Running {
                tracing::debug!(id = %id, status = %entry.record.status, "Ignoring late settlement");
                return;
            }

            match outcome {
                Ok(result) => {
                    entry.record.status = SubagentStatus::Completed;
                    entry.record.result = Some(result);
                }
                Err(_) if entry.cancel_token.is_cancelled() => {
                    entry.record.status = SubagentStatus::Cancelled;
                }
                Err(e) => {
                    entry.record.status = SubagentStatus::Failed;
                    entry.record.error = Some(format!("{e:#}"));
                }
            }
            entry.record.end_time = Some(Utc::now());
            (entry.record.clone(), entry.origin.clone())
        };

        match record.status {
            SubagentStatus::Failed => {
                tracing::warn!(id = %id, error = ?record.error, "Sub-agent failed");
            }
            status => tracing::info!(id = %id, %status, "Sub-agent settled"),
        }
        self.emit_status(&record);

        if record.notify {
            self.send_notice(&record, origin).await;
        }
    }

    async fn send_notice(&self, record: &SubagentRecord, origin: Option<Origin>) {
        let (Some(router), Some(origin)) = (&self.router, origin) else {
            tracing::debug!(id = %record.id, "No router or origin, skipping completion notice");
            return;
        };

        let body = match (record.status, &record.result, &record.error) {
            (SubagentStatus::Completed, Some(result), _) => {
                format!("Sub-agent `{}` completed:\n{}", record.name, preview(result))
            }
            (_, _, Some(error)) => format!("Sub-agent `{}` failed: {}", record.name, preview(error)),
            (status, _, _) => format!("Sub-agent `{}` finished ({status})", record.name),
        };

        let message = OutboundMessage {
            content: body,
            chat_id: origin.chat_id,
            channel_type: origin.channel_type,
        };
        if let Err(e) = router.send_to_channel(message).await {
            tracing::warn!(id = %record.id, "Failed to deliver completion notice: {e:#}");
        }
    }

    pub fn get_status(&self, id: &str) -> Option<SubagentInfo> {
        self.entries().get(id).map(|e| SubagentInfo::snapshot(&e.record))
    }

    /// Snapshots, optionally filtered by status, oldest first.
    pub fn list(&self, status: Option<SubagentStatus>) -> Vec<SubagentInfo> {
        let mut infos: Vec<SubagentInfo> = self
            .entries()
            .values()
            .filter(|e| status.is_none_or(|s| e.record.status == s))
            .map(|e| SubagentInfo::snapshot(&e.record))
            .collect();
        infos.sort_by_key(|i| i.record.start_time);
        infos
    }

    /// Mark a running record `cancelled` and signal its token.
    ///
    /// Returns `false` for unknown or already-terminal records.
    pub fn cancel(&self, id: &str) -> bool {
        let record = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            if entry.record.status != SubagentStatus::Running {
                return false;
            }
            entry.record.status = SubagentStatus::Cancelled;
            entry.record.end_time = Some(Utc::now());
            entry.cancel_token.cancel();
            entry.record.clone()
        };
        tracing::info!(id = %id, "Cancelled sub-agent");
        self.emit_status(&record);
        true
    }

    /// Remove terminal records that ended at least `max_age` ago. Running
    /// records are never removed. Returns how many were removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let now = Utc::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| match e.record.end_time {
            Some(end) if e.record.status.is_terminal() => now - end < max_age,
            _ => true,
        });
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Reaped finished sub-agents");
        }
        removed
    }

    /// Poll until the record is terminal or `timeout` elapses, then return
    /// the latest snapshot.
    pub async fn wait_for(&self, id: &str, timeout: Duration) -> Option<SubagentInfo> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let info = self.get_status(id)?;
            if info.record.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Some(info);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Run [`cleanup`](Self::cleanup) every `every` until the root token is cancelled.
    pub fn start_reaper(&self, every: Duration, max_age: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = manager.root_cancel_token.cancelled() => break,
                    _ = ticker.tick() => {
                        manager.cleanup(max_age);
                    }
                }
            }
        })
    }

    /// Cancel the root token, await tasks with a per-handle timeout of 5
    /// seconds, then mark anything still running as cancelled.
    pub async fn shutdown_all(&self) {
        self.root_cancel_token.cancel();

        let handles: Vec<JoinHandle<()>> = self
            .entries()
            .values_mut()
            .filter_map(|e| e.join_handle.take())
            .collect();

        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }

        let now = Utc::now();
        let mut entries = self.entries();
        for entry in entries.values_mut() {
            if entry.record.status == SubagentStatus::Running {
                entry.record.status = SubagentStatus::Cancelled;
                entry.record.end_time = Some(now);
            }
        }
    }

    pub fn running_count(&self) -> usize {
        self.entries()
            .values()
            .filter(|e| e.record.status == SubagentStatus::Running)
            .count()
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > NOTICE_PREVIEW_CHARS {
        let cut: String = text.chars().take(NOTICE_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
