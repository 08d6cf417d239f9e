//! Process wiring: one policy, one tool registry, one pipeline, and the two
//! background entry points in front of it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::approval::ApprovalGate;
use crate::agent::backend::{LlmBackend, OllamaBackend};
use crate::agent::pipeline::{AgentPipeline, PipelineSettings};
use crate::agent::router::Router;
use crate::agent::Agent;
use crate::config::AppConfig;
use crate::event::AgentEvent;
use crate::orchestration::heartbeat::Heartbeat;
use crate::orchestration::manager::SubagentManager;
use crate::policy::CapabilityRegistry;
use crate::safety::SafetyLayer;
use crate::tools::builtin::register_builtin_tools;
use crate::tools::ToolRegistry;

/// Optional collaborators supplied by the embedding process.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub router: Option<Arc<dyn Router>>,
    pub approval: Option<Arc<dyn ApprovalGate>>,
}

pub struct Runtime {
    pub config: AppConfig,
    pub policy: Arc<CapabilityRegistry>,
    pub safety: Arc<SafetyLayer>,
    pub tools: Arc<ToolRegistry>,
    pub pipeline: Arc<AgentPipeline>,
    pub subagents: SubagentManager,
    pub heartbeat: Heartbeat,
    shutdown: CancellationToken,
    events: Option<UnboundedReceiver<AgentEvent>>,
}

impl Runtime {
    /// Wire everything against the configured Ollama endpoint.
    pub fn build(config: AppConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        let backend = Arc::new(OllamaBackend::new(&config.ollama_url));
        Self::with_backend(config, backend, collaborators)
    }

    pub fn with_backend(
        config: AppConfig,
        backend: Arc<dyn LlmBackend>,
        collaborators: Collaborators,
    ) -> anyhow::Result<Self> {
        let policy = Arc::new(CapabilityRegistry::load(config.policy_path.clone()));
        let safety = Arc::new(SafetyLayer::new(&config).context("Failed to initialize safety layer")?);

        tracing::info!(
            workspace = %safety.workspace_root().display(),
            timeout_secs = config.shell_timeout_secs,
            blocklist_patterns = config.blocked_patterns.len(),
            "Safety layer initialized"
        );

        let mut tools = ToolRegistry::new();
        register_builtin_tools(&mut tools, Arc::clone(&safety));
        for (tool, roles) in &config.specialists {
            if !tools.restrict(tool, roles) {
                tracing::warn!(tool = %tool, "Specialist restriction names an unknown tool");
            }
        }
        let tools = Arc::new(tools);

        let mut pipeline = AgentPipeline::new(
            backend,
            Arc::clone(&tools),
            Arc::clone(&policy),
            PipelineSettings::from_config(&config),
        );
        if let Some(router) = &collaborators.router {
            pipeline = pipeline.with_router(Arc::clone(router));
        }
        if let Some(gate) = collaborators.approval {
            pipeline = pipeline.with_approval(gate);
        }
        let pipeline = Arc::new(pipeline);
        let agent: Arc<dyn Agent> = pipeline.clone();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let mut subagents = SubagentManager::new(Arc::clone(&agent), shutdown.clone(), config.max_running_subagents)
            .with_events(event_tx.clone());
        if let Some(router) = collaborators.router {
            subagents = subagents.with_router(router);
        }
        pipeline.attach_subagents(subagents.clone());

        let heartbeat = Heartbeat::new(config.heartbeat.clone(), Some(agent)).with_events(event_tx);

        Ok(Self {
            config,
            policy,
            safety,
            tools,
            pipeline,
            subagents,
            heartbeat,
            shutdown,
            events: Some(event_rx),
        })
    }

    /// Hand out the event receiver. Only the first caller gets it.
    ///
    /// Events queue up until the receiver is drained or dropped; callers that
    /// do not consume them should drop it.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<AgentEvent>> {
        self.events.take()
    }

    /// Start the periodic sub-agent reaper and, when enabled, the heartbeat.
    pub fn start_background(&self) -> JoinHandle<()> {
        let retention = Duration::from_secs(self.config.subagent_retention_secs);
        let every = (retention / 4).clamp(Duration::from_secs(1), Duration::from_secs(300));
        self.heartbeat.start();
        self.subagents.start_reaper(every, retention)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn shutdown(&self) {
        self.heartbeat.stop();
        self.subagents.shutdown_all().await;
        self.shutdown.cancel();
    }
}
