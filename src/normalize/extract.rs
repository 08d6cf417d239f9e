use std::sync::LazyLock;

use regex::Regex;

/// Code fences left with nothing but whitespace, commas or brackets.
static EMPTY_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[\s,\[\]]*```").expect("valid fence pattern")
});

/// Sentinel tags left with nothing but whitespace, commas or brackets.
static EMPTY_SENTINEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:tool_calls?|function_calls?)>[\s,\[\]]*</(?:tool_calls?|function_calls?)>")
        .expect("valid sentinel pattern")
});

static EXTRA_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline pattern"));

/// Find the byte ranges of top-level `{...}` spans that parse as JSON.
///
/// One pass with a stack of open-brace offsets. Quotes only open a string
/// inside a brace, and a raw newline ends one, so stray prose quotes cannot
/// hide the rest of the text. When a balanced span is not valid JSON, the
/// spans nested inside it are tried instead.
pub fn find_json_objects(text: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut balanced = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                '\n' => {
                    in_string = false;
                    escaped = false;
                }
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(offset),
            '}' => {
                if let Some(start) = open.pop() {
                    balanced.push((start, offset + 1));
                }
            }
            _ => {}
        }
    }

    // Stack discipline makes spans nested or disjoint; by start, outer ones come first.
    balanced.sort_unstable_by_key(|&(start, _)| start);
    let mut spans = Vec::new();
    let mut covered = 0;
    for (start, end) in balanced {
        if start < covered {
            continue;
        }
        if serde_json::from_str::<serde_json::Value>(&text[start..end]).is_ok() {
            spans.push((start, end));
            covered = end;
        }
    }
    spans
}

/// Remove matched spans from `text`, then drop fences and sentinel tags that
/// were left empty.
pub fn strip_fragments(text: &str, spans: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for &(start, end) in spans {
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    out.push_str(&text[cursor..]);

    let out = EMPTY_FENCE.replace_all(&out, "");
    let out = EMPTY_SENTINEL.replace_all(&out, "");
    let out = EXTRA_BLANK_LINES.replace_all(&out, "\n\n");
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_top_level_objects_only() {
        let text = r#"a {"x":{"y":1}} b {"z":2}"#;
        let spans = find_json_objects(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].0..spans[0].1], r#"{"x":{"y":1}}"#);
        assert_eq!(&text[spans[1].0..spans[1].1], r#"{"z":2}"#);
    }

    #[test]
    fn recovers_after_unbalanced_prose_brace() {
        let text = r#"use { carefully: {"name":"a","arguments":{}}"#;
        let spans = find_json_objects(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].0..spans[0].1], r#"{"name":"a","arguments":{}}"#);
    }

    #[test]
    fn unclosed_braces_scan_in_linear_time() {
        let mut text = "{".repeat(100_000);
        text.push_str(r#" {"name":"a","arguments":{}}"#);
        let started = std::time::Instant::now();
        let spans = find_json_objects(&text);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].0..], r#"{"name":"a","arguments":{}}"#);
    }

    #[test]
    fn stray_quote_ends_at_line_break() {
        let text = "say { \"hi\n{\"k\":1}";
        let spans = find_json_objects(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].0..spans[0].1], "{\"k\":1}");
    }

    #[test]
    fn invalid_outer_span_yields_inner_objects() {
        let text = r#"{ note: {"a":1} and {"b":2} }"#;
        let spans = find_json_objects(text);
        let found: Vec<&str> = spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(found, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn handles_multibyte_text() {
        let text = "héllo → {\"k\":\"ü\"} ✓";
        let spans = find_json_objects(text);
        assert_eq!(&text[spans[0].0..spans[0].1], "{\"k\":\"ü\"}");
    }

    #[test]
    fn strip_removes_empty_wrappers() {
        let text = "pre\n```json\n[XX, YY]\n```\n\n\n\npost";
        let a = text.find("XX").unwrap();
        let b = text.find("YY").unwrap();
        let out = strip_fragments(text, &[(a, a + 2), (b, b + 2)]);
        assert_eq!(out, "pre\n\npost");
    }

    #[test]
    fn strip_keeps_fences_with_other_content() {
        let text = "```rust\nlet x = 1;\n```";
        assert_eq!(strip_fragments(text, &[]), text);
    }
}
