//! One agent turn: LLM call, normalize, scope, gate, execute, feed back.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::approval::ApprovalGate;
use super::backend::{ChatRequest, LlmBackend};
use super::router::Router;
use super::{Agent, AgentRequest};
use crate::config::AppConfig;
use crate::error::AgentError;
use crate::normalize::{normalize, ToolCall};
use crate::orchestration::manager::SubagentManager;
use crate::policy::{CapabilityRegistry, GateDecision, UNKNOWN};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

const PROACTIVE_NOTE: &str = "This turn was started by the scheduler, not by a user message. \
If nothing needs attention, reply briefly and do not call tools.";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub max_iterations: usize,
    pub system_prompt: String,
    pub stream: bool,
    pub workspace: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_iterations: config.max_iterations,
            system_prompt: config.system_prompt.clone(),
            stream: config.stream,
            workspace: Some(config.workspace.clone()),
        }
    }
}

/// One dispatched tool call and what came of it.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub call: ToolCall,
    /// Resolved capability, `unknown` for tools that are not registered.
    pub capability: String,
    pub result: ToolResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub content: String,
    pub steps: Vec<StepRecord>,
    pub iterations: usize,
    /// The iteration limit was hit while the model still wanted tools.
    pub truncated: bool,
}

pub struct AgentPipeline {
    backend: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    policy: Arc<CapabilityRegistry>,
    router: Option<Arc<dyn Router>>,
    approval: Option<Arc<dyn ApprovalGate>>,
    subagents: OnceLock<SubagentManager>,
    settings: PipelineSettings,
}

impl AgentPipeline {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        tools: Arc<ToolRegistry>,
        policy: Arc<CapabilityRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            backend,
            tools,
            policy,
            router: None,
            approval: None,
            subagents: OnceLock::new(),
            settings,
        }
    }

    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_approval(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = Some(gate);
        self
    }

    /// Make the supervisor reachable from tool contexts. Only the first call wins.
    pub fn attach_subagents(&self, manager: SubagentManager) -> bool {
        self.subagents.set(manager).is_ok()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn system_prompt(&self, request: &AgentRequest) -> String {
        let mut prompt = self.settings.system_prompt.clone();
        if let Some(specialist) = &request.specialist {
            prompt.push_str(&format!("\n\nYou are acting as the `{specialist}` specialist."));
        }
        if request.proactive {
            prompt.push_str("\n\n");
            prompt.push_str(PROACTIVE_NOTE);
        }
        prompt
    }

    fn tool_context(&self, request: &AgentRequest) -> ToolContext {
        ToolContext {
            channel_type: request.channel_type.clone(),
            chat_id: request.chat_id.clone(),
            subagents: self.subagents.get().cloned(),
            router: self.router.clone(),
            policy: Arc::clone(&self.policy),
            workspace: self.settings.workspace.clone(),
            specialist: request.specialist.clone(),
            subagent_id: request.subagent_id.clone(),
            proactive: request.proactive,
        }
    }

    /// Run the tool loop until the model answers without tool calls or the
    /// iteration limit is reached.
    pub async fn run_turn(&self, request: &AgentRequest) -> Result<TurnOutcome, AgentError> {
        let specialist = request.specialist.as_deref();
        let tools: Vec<Value> = self
            .tools
            .get_tools_for_specialist(specialist)
            .iter()
            .map(|d| d.to_schema())
            .collect();
        let ctx = self.tool_context(request);

        let mut messages = vec![
            json!({ "role": "system", "content": self.system_prompt(request) }),
            json!({ "role": "user", "content": request.prompt }),
        ];
        let mut steps = Vec::new();
        let mut last_content = String::new();
        let max_iterations = self.settings.max_iterations.max(1);

        for iteration in 1..=max_iterations {
            if request.cancel.is_cancelled() {
                tracing::info!(iteration, "Turn cancelled between iterations");
                return Err(AgentError::Cancelled);
            }

            let raw = self
                .backend
                .chat(ChatRequest {
                    model: self.settings.model.clone(),
                    messages: messages.clone(),
                    stream: self.settings.stream,
                    tools: tools.clone(),
                })
                .await?;
            let message = normalize(&raw);
            tracing::debug!(iteration, calls = message.tool_calls.len(), source = ?message.source, "Model replied");

            if message.tool_calls.is_empty() {
                return Ok(TurnOutcome {
                    content: message.content,
                    steps,
                    iterations: iteration,
                    truncated: false,
                });
            }

            let wire_calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|c| json!({ "function": { "name": c.name, "arguments": c.arguments } }))
                .collect();
            messages.push(json!({
                "role": "assistant",
                "content": message.content,
                "tool_calls": wire_calls,
            }));
            last_content = message.content;

            for call in message.tool_calls {
                let (capability, result) = self.dispatch(&call, specialist, &ctx).await;
                messages.push(json!({
                    "role": "tool",
                    "content": result.to_json_string(),
                    "tool_name": call.name,
                }));
                steps.push(StepRecord {
                    call,
                    capability,
                    result,
                });
            }
        }

        tracing::warn!(max_iterations, "Iteration limit reached with tool calls pending");
        Ok(TurnOutcome {
            content: last_content,
            steps,
            iterations: max_iterations,
            truncated: true,
        })
    }

    /// Scope, gate and execute one call. Refusals come back as denied results.
    async fn dispatch(&self, call: &ToolCall, specialist: Option<&str>, ctx: &ToolContext) -> (String, ToolResult) {
        let Some(definition) = self.tools.get(&call.name) else {
            tracing::warn!(tool = %call.name, "Model called an unregistered tool");
            return (UNKNOWN.to_string(), ToolResult::failure(format!("Unknown tool: {}", call.name)));
        };

        if !definition.is_visible_to(specialist) {
            tracing::warn!(tool = %call.name, specialist = ?specialist, "Call outside specialist scope refused");
            let who = specialist.unwrap_or("(none)");
            return (
                definition.capability.clone(),
                ToolResult::denied(format!("tool `{}` is not available to specialist `{who}`", call.name)),
            );
        }

        match self.policy.check(&definition.capability) {
            GateDecision::Denied { capability, reason } => {
                tracing::info!(tool = %call.name, capability = %capability, ?reason, "Step denied by policy");
                let message = reason.message(&capability);
                (capability, ToolResult::denied(message))
            }
            GateDecision::Allowed {
                capability,
                requires_approval,
            } => {
                if requires_approval
                    && let Some(gate) = &self.approval
                    && !gate.approve(call, &capability).await
                {
                    tracing::info!(tool = %call.name, capability = %capability, "Step rejected by approval gate");
                    return (capability, ToolResult::denied("step was not approved"));
                }
                tracing::info!(tool = %call.name, capability = %capability, "Executing tool");
                let result = self.tools.execute(&call.name, &call.arguments, ctx).await;
                (capability, result)
            }
        }
    }
}

#[async_trait]
impl Agent for AgentPipeline {
    async fn process(&self, request: AgentRequest) -> anyhow::Result<String> {
        Ok(self.run_turn(&request).await?.content)
    }
}
