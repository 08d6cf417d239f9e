//! Tool-call normalization.
//!
//! Models report tool calls in several shapes: a structured `tool_calls` field
//! (OpenAI-style function wrappers, flat `{name, arguments}` objects, string
//! encoded arguments), or JSON objects embedded in the free-text content,
//! sometimes fenced in a code block or wrapped in a `<tool_call>` tag.
//! [`normalize`] resolves all of them into canonical [`ToolCall`] records.
//!
//! Normalization never fails. Anything that cannot be recovered is dropped
//! and logged.

mod extract;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use extract::{find_json_objects, strip_fragments};

/// The only shape a tool executor ever receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Where the tool calls of a normalized message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallSource {
    Structured,
    Content,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMessage {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip)]
    pub source: ToolCallSource,
}

/// The wire shapes a single tool-call entry can take.
#[derive(Debug)]
enum WireShape<'a> {
    /// `{"function": {"name": ..., "arguments": ...}}`
    FunctionWrapper {
        name: Option<&'a Value>,
        arguments: Option<&'a Value>,
    },
    /// `{"name": ..., "arguments" | "parameters" | "args": ...}`
    Flat {
        name: Option<&'a Value>,
        arguments: Option<&'a Value>,
    },
}

const ARGUMENT_KEYS: [&str; 3] = ["arguments", "parameters", "args"];

/// Free text only counts `name`/`function.name` with `arguments`/`parameters`
/// or `function.arguments`.
const EMBEDDED_ARGUMENT_KEYS: [&str; 2] = ["arguments", "parameters"];

fn argument_field(obj: &Map<String, Value>) -> Option<&Value> {
    ARGUMENT_KEYS.iter().find_map(|k| obj.get(*k))
}

impl<'a> WireShape<'a> {
    fn classify(entry: &'a Value) -> Option<Self> {
        let obj = entry.as_object()?;
        match obj.get("function").and_then(Value::as_object) {
            Some(function) => Some(WireShape::FunctionWrapper {
                name: function.get("name").or_else(|| obj.get("name")),
                arguments: argument_field(function).or_else(|| argument_field(obj)),
            }),
            None => Some(WireShape::Flat {
                name: obj.get("name"),
                arguments: argument_field(obj),
            }),
        }
    }

    fn parts(&self) -> (Option<&'a Value>, Option<&'a Value>) {
        match *self {
            WireShape::FunctionWrapper { name, arguments } | WireShape::Flat { name, arguments } => {
                (name, arguments)
            }
        }
    }

    /// Shape of a JSON object found in free text, when it is an explicit call.
    fn classify_embedded(value: &'a Value) -> Option<Self> {
        let obj = value.as_object()?;
        let function = obj.get("function").and_then(Value::as_object);
        let name = obj
            .get("name")
            .filter(|v| v.is_string())
            .or_else(|| function?.get("name").filter(|v| v.is_string()))?;
        let arguments = EMBEDDED_ARGUMENT_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .or_else(|| function?.get("arguments"))?;
        Some(WireShape::Flat {
            name: Some(name),
            arguments: Some(arguments),
        })
    }

    fn into_tool_call(self) -> Option<ToolCall> {
        let (name, arguments) = self.parts();
        let name = name.and_then(Value::as_str).map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return None;
        }
        Some(ToolCall {
            name: name.to_string(),
            arguments: coerce_arguments(arguments),
        })
    }
}

/// Coerce an argument payload into an argument map.
///
/// JSON strings are parsed (one level of double encoding is tolerated); empty
/// strings, parse failures and non-object values become an empty map.
pub fn coerce_arguments(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => parse_argument_string(s, 1),
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            tracing::debug!(kind = %value_kind(other), "Non-object tool arguments replaced with {{}}");
            Map::new()
        }
    }
}

fn parse_argument_string(s: &str, depth: u8) -> Map<String, Value> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        Ok(Value::String(inner)) if depth > 0 => parse_argument_string(&inner, depth - 1),
        Ok(_) => Map::new(),
        Err(e) => {
            tracing::debug!("Unparseable tool arguments replaced with {{}}: {e}");
            Map::new()
        }
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extract textual content from a message object.
fn message_content(obj: &Map<String, Value>) -> String {
    match obj.get("content") {
        Some(Value::String(s)) => s.clone(),
        // Content-part arrays: [{"type": "text", "text": "..."}]
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| match p {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => o.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// Structured tool-call entries, or `None` when the message has none.
fn structured_entries(obj: &Map<String, Value>) -> Option<Vec<&Value>> {
    let field = obj
        .get("tool_calls")
        .or_else(|| obj.get("toolCalls"))
        .or_else(|| obj.get("function_call"))?;
    let entries: Vec<&Value> = match field {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![field],
        _ => Vec::new(),
    };
    (!entries.is_empty()).then_some(entries)
}

/// Normalize a raw model message into canonical tool calls.
///
/// `raw` may be a message object, a response wrapping one under `message`,
/// or a bare string of content.
pub fn normalize(raw: &Value) -> NormalizedMessage {
    let obj = match raw {
        Value::String(content) => return from_content(content),
        Value::Object(obj) => obj,
        other => {
            tracing::warn!(kind = %value_kind(other), "Model message is not an object; ignoring");
            return NormalizedMessage {
                content: String::new(),
                tool_calls: Vec::new(),
                source: ToolCallSource::None,
            };
        }
    };

    let obj = match obj.get("message").and_then(Value::as_object) {
        Some(inner) if !obj.contains_key("content") && !obj.contains_key("tool_calls") => inner,
        _ => obj,
    };

    let content = message_content(obj);

    if let Some(entries) = structured_entries(obj) {
        let tool_calls: Vec<ToolCall> = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let call = WireShape::classify(entry).and_then(WireShape::into_tool_call);
                if call.is_none() {
                    tracing::warn!(index, "Dropping structured tool call without a name");
                }
                call
            })
            .collect();
        if !tool_calls.is_empty() {
            return NormalizedMessage {
                content,
                tool_calls,
                source: ToolCallSource::Structured,
            };
        }
        // Every entry was dropped: treat the field as empty and scan the content.
    }

    from_content(&content)
}

/// Scan free text for embedded tool-call objects.
fn from_content(content: &str) -> NormalizedMessage {
    let mut tool_calls = Vec::new();
    let mut matched = Vec::new();

    for (start, end) in find_json_objects(content) {
        let Ok(value) = serde_json::from_str::<Value>(&content[start..end]) else {
            continue;
        };
        let Some(shape) = WireShape::classify_embedded(&value) else {
            continue;
        };
        if let Some(call) = shape.into_tool_call() {
            tool_calls.push(call);
            matched.push((start, end));
        }
    }

    if tool_calls.is_empty() {
        return NormalizedMessage {
            content: content.to_string(),
            tool_calls,
            source: ToolCallSource::None,
        };
    }

    tracing::debug!(count = tool_calls.len(), "Extracted tool calls from content");
    NormalizedMessage {
        content: strip_fragments(content, &matched),
        tool_calls,
        source: ToolCallSource::Content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn extracts_bare_json_from_content() {
        let out = normalize(&json!({"content": r#"{"name":"foo","arguments":{"a":1}}"#}));
        assert_eq!(
            out.tool_calls,
            vec![ToolCall { name: "foo".into(), arguments: args(json!({"a": 1})) }]
        );
        assert_eq!(out.content, "");
        assert_eq!(out.source, ToolCallSource::Content);
    }

    #[test]
    fn parses_string_encoded_arguments() {
        let out = normalize(&json!({
            "content": "",
            "tool_calls": [{"function": {"name": "calc", "arguments": "{\"x\":5}"}}]
        }));
        assert_eq!(out.tool_calls[0].arguments, args(json!({"x": 5})));
    }

    #[test]
    fn accepts_alternate_argument_keys() {
        let out = normalize(&json!({
            "tool_calls": [
                {"name": "a", "parameters": {"p": 1}},
                {"name": "b", "args": "{\"q\":2}"},
                {"name": "c"}
            ]
        }));
        let names: Vec<&str> = out.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(out.tool_calls[0].arguments, args(json!({"p": 1})));
        assert_eq!(out.tool_calls[1].arguments, args(json!({"q": 2})));
        assert!(out.tool_calls[2].arguments.is_empty());
    }

    #[test]
    fn bad_argument_strings_become_empty_maps() {
        let out = normalize(&json!({
            "tool_calls": [
                {"function": {"name": "a", "arguments": ""}},
                {"function": {"name": "b", "arguments": "{not json"}},
                {"function": {"name": "c", "arguments": "[1,2]"}},
                {"function": {"name": "d", "arguments": "\"{\\\"k\\\":true}\""}}
            ]
        }));
        assert_eq!(out.tool_calls.len(), 4);
        assert!(out.tool_calls[0].arguments.is_empty());
        assert!(out.tool_calls[1].arguments.is_empty());
        assert!(out.tool_calls[2].arguments.is_empty());
        assert_eq!(out.tool_calls[3].arguments, args(json!({"k": true})));
    }

    #[test]
    fn drops_entries_without_names() {
        let out = normalize(&json!({
            "tool_calls": [
                {"function": {"arguments": {}}},
                {"name": "", "arguments": {}},
                {"name": 42, "arguments": {}},
                "garbage",
                {"name": "ok", "arguments": {}}
            ]
        }));
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "ok");
    }

    #[test]
    fn structured_calls_suppress_content_scan() {
        let out = normalize(&json!({
            "content": r#"{"name":"in_text","arguments":{}}"#,
            "tool_calls": [{"name": "structured", "arguments": {}}]
        }));
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "structured");
        assert!(out.content.contains("in_text"));
    }

    #[test]
    fn empty_structured_field_falls_back_to_content() {
        let out = normalize(&json!({
            "content": r#"{"name":"x","parameters":{"n":1}}"#,
            "tool_calls": []
        }));
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.source, ToolCallSource::Content);
    }

    #[test]
    fn unnamed_structured_entries_fall_back_to_content() {
        let out = normalize(&json!({
            "content": r#"note {"name":"write_file","arguments":{"path":"x"}}"#,
            "tool_calls": [{"function": {"arguments": {}}}]
        }));
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "write_file");
        assert_eq!(out.source, ToolCallSource::Content);
        assert_eq!(out.content, "note");
    }

    #[test]
    fn embedded_calls_need_documented_keys() {
        let text = concat!(
            r#"{"name":"a","args":{"x":1}} "#,
            r#"{"name":"b","function":{"arguments":{}}} "#,
            r#"{"function":{"name":"c"},"arguments":{"y":2}} "#,
            r#"{"function":{"name":"d","args":{}}}"#,
        );
        let out = normalize(&json!({ "content": text }));
        let names: Vec<&str> = out.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(out.tool_calls[1].arguments, args(json!({"y": 2})));
    }

    #[test]
    fn conversational_json_is_not_a_tool_call() {
        let text = r#"Here is the config: {"name":"demo","version":"1.0"} and {"arguments":{}}"#;
        let out = normalize(&json!({ "content": text }));
        assert!(out.tool_calls.is_empty());
        assert_eq!(out.content, text);
    }

    #[test]
    fn strips_fenced_calls_and_keeps_prose() {
        let text = "Let me check.\n```json\n{\"name\":\"read_file\",\"arguments\":{\"path\":\"a.txt\"}}\n```\nDone.";
        let out = normalize(&json!({ "content": text }));
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "read_file");
        assert!(!out.content.contains("```"));
        assert!(out.content.contains("Let me check."));
        assert!(out.content.contains("Done."));
    }

    #[test]
    fn strips_sentinel_tags() {
        let text = "<tool_call>{\"function\":{\"name\":\"git\",\"arguments\":\"{\\\"cmd\\\":\\\"status\\\"}\"}}</tool_call>";
        let out = normalize(&Value::String(text.into()));
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].arguments, args(json!({"cmd": "status"})));
        assert_eq!(out.content, "");
    }

    #[test]
    fn multiple_embedded_calls_keep_order() {
        let text = r#"First {"name":"one","arguments":{}} then {"name":"two","arguments":{"n":2}}"#;
        let out = normalize(&json!({ "content": text }));
        let names: Vec<&str> = out.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
        assert_eq!(out.content, "First  then");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let text = r#"{"name":"write_file","arguments":{"content":"fn main() { println!(\"}\"); }"}}"#;
        let out = normalize(&json!({ "content": text }));
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(
            out.tool_calls[0].arguments["content"],
            json!("fn main() { println!(\"}\"); }")
        );
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let inputs = vec![
            json!({"content": "hi {\"name\":\"a\",\"arguments\":{\"x\":1}}"}),
            json!({"tool_calls": [{"function": {"name": "b", "arguments": "{\"y\":2}"}}]}),
            json!({"content": "no tools here {\"k\": 1}"}),
            json!({
                "content": "note {\"name\":\"write_file\",\"arguments\":{\"path\":\"x\"}}",
                "tool_calls": [{"function": {"arguments": {}}}]
            }),
        ];
        for input in inputs {
            let first = normalize(&input);
            let reencoded = serde_json::to_value(&first).unwrap();
            let second = normalize(&reencoded);
            assert_eq!(first.tool_calls, second.tool_calls);
            assert_eq!(first.content, second.content);
        }
    }

    #[test]
    fn unwraps_response_envelopes_and_content_parts() {
        let out = normalize(&json!({
            "message": {"content": [{"type": "text", "text": "hello"}]}
        }));
        assert_eq!(out.content, "hello");
        assert!(out.tool_calls.is_empty());
    }

    #[test]
    fn non_object_input_yields_nothing() {
        let out = normalize(&json!(42));
        assert!(out.tool_calls.is_empty());
        assert_eq!(out.content, "");
    }
}
