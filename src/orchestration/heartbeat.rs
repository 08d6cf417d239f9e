//! Proactive scheduler: invokes the agent on a fixed interval without user input.
//!
//! The scheduler only emits [`AgentEvent::HeartbeatBeat`] and
//! [`AgentEvent::HeartbeatError`]; routing a response anywhere is up to
//! whoever holds the event receiver.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentRequest};
use crate::event::{emit, AgentEvent, EventSender};

pub const DEFAULT_HEARTBEAT_PROMPT: &str = "Heartbeat check. Review pending work in the workspace \
and report anything that needs attention. If nothing does, say so in one line.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub prompt: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 30 * 60 * 1000,
            prompt: DEFAULT_HEARTBEAT_PROMPT.to_string(),
        }
    }
}

/// Partial update for [`Heartbeat::update_config`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatUpdate {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatStatus {
    pub running: bool,
    pub enabled: bool,
    pub interval_ms: u64,
    pub prompt: String,
    pub beats: u64,
    pub errors: u64,
    pub last_beat: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Result of one beat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeatOutcome {
    Response(String),
    Error(String),
    /// No agent is attached.
    Skipped,
}

#[derive(Debug, Default)]
struct BeatStats {
    beats: u64,
    errors: u64,
    last_beat: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct Timer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct Heartbeat {
    config: Arc<Mutex<HeartbeatConfig>>,
    timer: Arc<Mutex<Option<Timer>>>,
    stats: Arc<Mutex<BeatStats>>,
    agent: Option<Arc<dyn Agent>>,
    event_tx: Option<EventSender>,
}

impl Heartbeat {
    pub fn new(config: HeartbeatConfig, agent: Option<Arc<dyn Agent>>) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            timer: Arc::new(Mutex::new(None)),
            stats: Arc::new(Mutex::new(BeatStats::default())),
            agent,
            event_tx: None,
        }
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> HeartbeatConfig {
        lock(&self.config).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer).as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Start the recurring timer. The first beat fires one interval from now.
    ///
    /// Returns whether a timer is running afterwards. Starting while disabled,
    /// without an agent, or with a zero interval is a logged no-op.
    pub fn start(&self) -> bool {
        let config = self.config();
        if !config.enabled {
            tracing::info!("Heartbeat disabled, not starting");
            return false;
        }
        if self.agent.is_none() {
            tracing::info!("Heartbeat has no agent attached, not starting");
            return false;
        }
        if config.interval_ms == 0 {
            tracing::warn!("Heartbeat interval is zero, not starting");
            return false;
        }

        let mut timer = lock(&self.timer);
        if timer.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return true;
        }

        let period = Duration::from_millis(config.interval_ms);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let heartbeat = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        heartbeat.beat().await;
                    }
                }
            }
            tracing::debug!("Heartbeat timer stopped");
        });

        *timer = Some(Timer { cancel, handle });
        tracing::info!(interval_ms = config.interval_ms, "Heartbeat started");
        true
    }

    /// Stop the timer. A beat already in flight runs to completion.
    pub fn stop(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.cancel.cancel();
            tracing::info!("Heartbeat stopped");
        }
    }

    /// Beat once now, regardless of `enabled`.
    pub async fn trigger(&self) -> BeatOutcome {
        self.beat().await
    }

    async fn beat(&self) -> BeatOutcome {
        let Some(agent) = &self.agent else {
            return BeatOutcome::Skipped;
        };
        let prompt = lock(&self.config).prompt.clone();
        let timestamp = Utc::now();

        match agent.process(AgentRequest::proactive(prompt)).await {
            Ok(response) => {
                {
                    let mut stats = lock(&self.stats);
                    stats.beats += 1;
                    stats.last_beat = Some(timestamp);
                }
                tracing::debug!(chars = response.len(), "Heartbeat beat");
                emit(
                    self.event_tx.as_ref(),
                    AgentEvent::HeartbeatBeat {
                        timestamp,
                        response: response.clone(),
                    },
                );
                BeatOutcome::Response(response)
            }
            Err(e) => {
                let error = format!("{e:#}");
                {
                    let mut stats = lock(&self.stats);
                    stats.errors += 1;
                    stats.last_error = Some(error.clone());
                }
                tracing::warn!("Heartbeat failed: {error}");
                emit(
                    self.event_tx.as_ref(),
                    AgentEvent::HeartbeatError {
                        timestamp,
                        error: error.clone(),
                    },
                );
                BeatOutcome::Error(error)
            }
        }
    }

    /// Apply a partial update.
    ///
    /// Disabling stops the timer. Enabling starts it when stopped. Changing
    /// the interval or prompt of a running timer restarts it.
    pub fn update_config(&self, update: HeartbeatUpdate) {
        let (was_enabled, retimed, config) = {
            let mut config = lock(&self.config);
            let was_enabled = config.enabled;
            let mut retimed = false;
            if let Some(enabled) = update.enabled {
                config.enabled = enabled;
            }
            if let Some(interval_ms) = update.interval_ms
                && interval_ms != config.interval_ms
            {
                config.interval_ms = interval_ms;
                retimed = true;
            }
            if let Some(prompt) = update.prompt
                && prompt != config.prompt
            {
                config.prompt = prompt;
                retimed = true;
            }
            (was_enabled, retimed, config.clone())
        };

        let running = self.is_running();
        if !config.enabled {
            self.stop();
        } else if !running {
            if !was_enabled {
                self.start();
            }
        } else if retimed {
            self.stop();
            self.start();
        }
    }

    pub fn status(&self) -> HeartbeatStatus {
        let config = self.config();
        let stats = lock(&self.stats);
        HeartbeatStatus {
            running: self.is_running(),
            enabled: config.enabled,
            interval_ms: config.interval_ms,
            prompt: config.prompt,
            beats: stats.beats,
            errors: stats.errors,
            last_beat: stats.last_beat,
            last_error: stats.last_error.clone(),
        }
    }
}
