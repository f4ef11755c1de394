//! Tool requests written as plain text.
//!
//! Some models describe a tool call in prose instead of using structured
//! tool calling. Two shapes are recognised:
//!
//! - `[call tool: name(key=value, ...)]` (also `[调用工具: ...]`)
//! - `name: {key: value, ...}`
//!
//! Only names the dispatcher knows are accepted. Recovered requests get a
//! synthetic id and are marked [`CallSource::TextFallback`].

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use toolweave_core::message::{CallSource, MessageToolCall, ToolArguments};

static EXPLICIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:call tool|调用工具):\s*([^(\]]+)\(([^)]*)\)\]").expect("explicit call pattern is valid")
});

static INLINE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+):\s*\{([^}]*)\}").expect("inline call pattern is valid"));

/// Extract text-form tool requests, in the order they appear per shape.
pub fn parse_text_calls(text: &str, is_known: impl Fn(&str) -> bool) -> Vec<MessageToolCall> {
    let mut calls = Vec::new();

    for caps in EXPLICIT.captures_iter(text) {
        let name = caps[1].trim();
        if is_known(name) {
            calls.push(text_call(name, parse_pairs(&caps[2])));
        }
    }

    for caps in INLINE_OBJECT.captures_iter(text) {
        let name = caps[1].trim();
        if is_known(name) {
            calls.push(text_call(name, parse_object_body(&caps[2])));
        }
    }

    calls
}

fn text_call(name: &str, arguments: Map<String, Value>) -> MessageToolCall {
    MessageToolCall {
        id: format!("text-{}", uuid::Uuid::new_v4().simple()),
        name: name.to_string(),
        arguments: ToolArguments::Structured(arguments),
        source: CallSource::TextFallback,
    }
}

/// `{...}` body: JSON when it parses, otherwise loose pairs.
fn parse_object_body(body: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(&format!("{{{body}}}")) {
        Ok(Value::Object(map)) => map,
        _ => parse_pairs(body),
    }
}

/// Comma-separated `key=value` or `key: value` pairs. Values are kept as
/// strings with one level of matching quotes removed.
fn parse_pairs(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for pair in raw.split(',') {
        let Some((key, value)) = pair.split_once('=').or_else(|| pair.split_once(':')) else {
            continue;
        };
        let key = unquote(key.trim());
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(unquote(value.trim()).to_string()));
    }
    map
}

fn unquote(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(name: &str) -> bool {
        matches!(name, "web_search" | "send_email")
    }

    fn args(call: &MessageToolCall) -> &Map<String, Value> {
        match &call.arguments {
            ToolArguments::Structured(map) => map,
            ToolArguments::Text(t) => panic!("expected structured arguments, got {t:?}"),
        }
    }

    #[test]
    fn call_patterns_compile() {
        assert!(EXPLICIT.is_match("[call tool: a(b=c)]"));
        assert!(INLINE_OBJECT.is_match("a: {b: c}"));
    }

    #[test]
    fn explicit_form() {
        let calls = parse_text_calls(r#"Sure. [call tool: web_search(query="rust", limit=5)]"#, known);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[0].source, CallSource::TextFallback);
        assert!(calls[0].id.starts_with("text-"));
        assert_eq!(args(&calls[0])["query"], "rust");
        assert_eq!(args(&calls[0])["limit"], "5");
    }

    #[test]
    fn explicit_form_chinese_marker() {
        let calls = parse_text_calls("[调用工具: send_email(to='a@b.c', subject=hi)]", known);
        assert_eq!(calls.len(), 1);
        assert_eq!(args(&calls[0])["to"], "a@b.c");
        assert_eq!(args(&calls[0])["subject"], "hi");
    }

    #[test]
    fn inline_object_json() {
        let calls = parse_text_calls(r#"web_search: {"query": "weather", "limit": 3}"#, known);
        assert_eq!(calls.len(), 1);
        assert_eq!(args(&calls[0])["limit"], 3);
    }

    #[test]
    fn inline_object_loose() {
        let calls = parse_text_calls("web_search: {query: weather today}", known);
        assert_eq!(args(&calls[0])["query"], "weather today");
    }

    #[test]
    fn unknown_names_are_ignored() {
        assert!(parse_text_calls("[call tool: rm_rf(path=/)]", known).is_empty());
        assert!(parse_text_calls("note: {a: 1}", known).is_empty());
        assert!(parse_text_calls("plain answer", known).is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let calls = parse_text_calls(
            "[call tool: web_search(query=a)] [call tool: web_search(query=b)]",
            known,
        );
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].id, calls[1].id);
    }
}
