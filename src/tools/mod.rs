//! Tool registry and specialist scoping.
//!
//! Every tool declares the capability that classifies it and, optionally, the
//! specialist roles allowed to see it. [`ToolRegistry::get_tools_for_specialist`]
//! is what the model is shown; the pipeline repeats the same membership test
//! at dispatch time so a hallucinated call outside the scope is still refused.
//!
//! Executors never surface errors to the caller: unknown tools and failing
//! executors both come back as a [`ToolResult`] with `success: false`.

pub mod builtin;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::agent::router::Router;
use crate::orchestration::manager::SubagentManager;
use crate::policy::CapabilityRegistry;

/// Schema and classification of a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    /// Capability type the gate checks before this tool runs.
    pub capability: String,
    /// `None` means visible to every specialist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialists: Option<BTreeSet<String>>,
}

impl ToolDefinition {
    pub fn new(name: &str, capability: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
            capability: capability.to_string(),
            specialists: None,
        }
    }

    pub fn with_schema(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_specialists<I, S>(mut self, specialists: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specialists = Some(specialists.into_iter().map(Into::into).collect());
        self
    }

    /// Unrestricted tools are visible to everyone, including callers without a role.
    /// Restricted tools require a matching role.
    pub fn is_visible_to(&self, specialist: Option<&str>) -> bool {
        match (&self.specialists, specialist) {
            (None, _) => true,
            (Some(allowed), Some(id)) => allowed.contains(id),
            (Some(_), None) => false,
        }
    }

    /// Function-tool schema in the shape chat endpoints expect.
    pub fn to_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Outcome of a tool execution as reported back to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the policy (scope, capability or approval) refused the step.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub denied: bool,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ToolResult {
    /// Success payload; non-object values are wrapped under `result`.
    pub fn ok(data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("result".to_string(), other)]),
        };
        Self {
            success: true,
            error: None,
            denied: false,
            data,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            denied: false,
            data: Map::new(),
        }
    }

    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            denied: true,
            ..Self::failure(error)
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| json!({"success": false, "error": e.to_string()}).to_string())
    }
}

/// Request-scoped state handed to every executor.
#[derive(Clone)]
pub struct ToolContext {
    pub channel_type: Option<String>,
    pub chat_id: Option<String>,
    pub subagents: Option<SubagentManager>,
    pub router: Option<Arc<dyn Router>>,
    pub policy: Arc<CapabilityRegistry>,
    pub workspace: Option<PathBuf>,
    /// Role the current turn is scoped to. Spawned sub-agents inherit it.
    pub specialist: Option<String>,
    /// Set when the current turn itself runs as a sub-agent.
    pub subagent_id: Option<String>,
    pub proactive: bool,
}

impl ToolContext {
    /// Context with only a policy attached.
    pub fn new(policy: Arc<CapabilityRegistry>) -> Self {
        Self {
            channel_type: None,
            chat_id: None,
            subagents: None,
            router: None,
            policy,
            workspace: None,
            specialist: None,
            subagent_id: None,
            proactive: false,
        }
    }
}

/// An executor: `(args, context) -> result`.
///
/// Returning `Err` is allowed; the registry converts it into a failed
/// [`ToolResult`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext) -> anyhow::Result<ToolResult>;
}

struct RegisteredTool {
    definition: ToolDefinition,
    tool: Arc<dyn Tool>,
}

/// Name -> executor map. Built at startup, then shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let definition = tool.definition();
        if self.tools.contains_key(&definition.name) {
            tracing::warn!(tool = %definition.name, "Replacing registered tool");
        }
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                tool: Arc::new(tool),
            },
        );
    }

    /// Replace a tool's specialist allow-list. Returns false for unknown tools.
    pub fn restrict(&mut self, name: &str, specialists: &[String]) -> bool {
        match self.tools.get_mut(name) {
            Some(entry) => {
                entry.definition.specialists = Some(specialists.iter().cloned().collect());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    pub fn capability_for(&self, name: &str) -> Option<&str> {
        self.get(name).map(|d| d.capability.as_str())
    }

    pub fn is_visible_to(&self, name: &str, specialist: Option<&str>) -> bool {
        self.get(name).is_some_and(|d| d.is_visible_to(specialist))
    }

    /// All definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Definitions visible to `specialist`, sorted by name.
    pub fn get_tools_for_specialist(&self, specialist: Option<&str>) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| t.definition.is_visible_to(specialist))
            .map(|t| t.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Run a tool by name. Unknown names and executor errors become failed results.
    pub async fn execute(&self, name: &str, args: &Map<String, Value>, ctx: &ToolContext) -> ToolResult {
        let Some(entry) = self.tools.get(name) else {
            return ToolResult::failure(format!("Unknown tool: {name}"));
        };
        match entry.tool.execute(args, ctx).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %name, "Tool execution failed: {e:#}");
                ToolResult::failure(format!("{name}: {e:#}"))
            }
        }
    }
}
