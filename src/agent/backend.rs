//! LLM backend seam and the Ollama implementation.
//!
//! The pipeline only consumes `content` and `tool_calls` from the returned
//! message object; everything else is left as-is for the normalizer.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::AgentError;

/// Request sent to the chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

/// A chat endpoint returning one message object `{content, tool_calls?}`.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<Value, AgentError>;
}

/// Ollama `/api/chat` over HTTP.
pub struct OllamaBackend {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Verify Ollama answers and the model is pulled.
    pub async fn check_ready(&self, model: &str) -> Result<(), AgentError> {
        let root = format!("{}/", self.base_url);
        self.http
            .get(&root)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| AgentError::BackendUnavailable {
                url: root.clone(),
                message: format!("Is Ollama running? {e}"),
            })?;

        let resp = self
            .http
            .post(format!("{}/api/show", self.base_url))
            .json(&json!({ "model": model }))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| AgentError::LlmError(format!("Failed to query model info: {e}")))?;

        if !resp.status().is_success() {
            return Err(AgentError::LlmError(format!(
                "Model '{model}' not found (HTTP {}). Run `ollama pull {model}` to download it.",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn chat(&self, request: ChatRequest) -> Result<Value, AgentError> {
        let url = format!("{}/api/chat", self.base_url);
        let mut resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::BackendUnavailable {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::LlmError(format!("HTTP {status}: {body}")));
        }

        if !request.stream {
            let body: Value = resp
                .json()
                .await
                .map_err(|e| AgentError::LlmError(format!("Invalid response body: {e}")))?;
            return Ok(body.get("message").cloned().unwrap_or(body));
        }

        let mut assembler = StreamAssembler::default();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| AgentError::LlmError(format!("Stream interrupted: {e}")))?
        {
            assembler.push_bytes(&chunk);
        }
        assembler.finish()
    }
}

/// Reassembles a line-delimited chat stream into one message object.
///
/// Accepts Ollama NDJSON (`{"message": {...}, "done": bool}`) and
/// OpenAI-style SSE lines (`data: {"choices": [{"delta": {...}}]}`), whose
/// tool-call deltas are merged by index.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    pending: Vec<u8>,
    content: String,
    tool_calls: Vec<Value>,
    /// index -> (name, concatenated argument text)
    indexed_calls: BTreeMap<u64, (String, String)>,
    error: Option<String>,
}

impl StreamAssembler {
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.push_line(&String::from_utf8_lossy(&line));
        }
    }

    pub fn push_line(&mut self, line: &str) {
        let line = line.trim();
        let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if line.is_empty() || line == "[DONE]" {
            return;
        }

        let event: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Skipping unparseable stream line: {e}");
                return;
            }
        };

        if let Some(err) = event.get("error") {
            self.error = Some(match err {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            return;
        }

        let delta = event
            .get("message")
            .or_else(|| event.pointer("/choices/0/delta"))
            .or_else(|| event.pointer("/choices/0/message"));
        let Some(delta) = delta else {
            return;
        };

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            self.content.push_str(text);
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                match call.get("index").and_then(Value::as_u64) {
                    Some(index) => self.merge_indexed(index, call),
                    None => self.tool_calls.push(call.clone()),
                }
            }
        }
    }

    fn merge_indexed(&mut self, index: u64, call: &Value) {
        let slot = self.indexed_calls.entry(index).or_default();
        if let Some(name) = call.pointer("/function/name").and_then(Value::as_str) {
            slot.0.push_str(name);
        }
        match call.pointer("/function/arguments") {
            Some(Value::String(part)) => slot.1.push_str(part),
            Some(other) if !other.is_null() => slot.1 = other.to_string(),
            _ => {}
        }
    }

    pub fn finish(mut self) -> Result<Value, AgentError> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.push_line(&String::from_utf8_lossy(&rest));
        }

        let mut tool_calls = self.tool_calls;
        tool_calls.extend(self.indexed_calls.into_values().map(|(name, arguments)| {
            json!({ "function": { "name": name, "arguments": arguments } })
        }));

        if let Some(error) = self.error {
            if self.content.is_empty() && tool_calls.is_empty() {
                return Err(AgentError::LlmError(error));
            }
            tracing::warn!("Stream reported an error after partial output: {error}");
        }

        let mut message = json!({ "role": "assistant", "content": self.content });
        if !tool_calls.is_empty() {
            message["tool_calls"] = Value::Array(tool_calls);
        }
        Ok(message)
    }
}
