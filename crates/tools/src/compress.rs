//! Result compression: shrink tool output before it re-enters the prompt.
//!
//! Prose is whitespace-squeezed. Text that is a complete JSON object or
//! array is re-emitted in compact form, like structured output. Nothing here
//! truncates except the `Debug` fallback in [`compress_serializable`]. Every
//! function is idempotent.

use serde::Serialize;
use std::fmt::Debug;
use toolweave_core::tool::ToolOutput;

/// Length of the `Debug` fallback for values that fail to serialize.
pub const DEBUG_FALLBACK_CHARS: usize = 500;

/// Render a tool output as the text recorded in the conversation.
pub fn compress(output: &ToolOutput) -> String {
    match output {
        ToolOutput::Structured(value) => compact_json(value),
        ToolOutput::Text(text) => compress_text(text),
        ToolOutput::Error(text) => squeeze_text(text),
        ToolOutput::Empty => "null".to_string(),
    }
}

/// Minify text that is a JSON object or array; squeeze anything else.
///
/// Many tool providers return their structured results as a JSON string in a
/// text content block. Those are minified the same way as
/// [`ToolOutput::Structured`], keeping key order. Text that only starts like
/// JSON but fails to parse is treated as prose.
pub fn compress_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return compact_json(&value);
        }
    }
    squeeze_text(text)
}

/// Serialize any value to compact JSON, falling back to a bounded `Debug`
/// rendering when serialization fails.
pub fn compress_serializable<T: Serialize + Debug>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json,
        Err(_) => {
            let debug = format!("{value:?}");
            match debug.char_indices().nth(DEBUG_FALLBACK_CHARS) {
                Some((cut, _)) => format!("{}...", &debug[..cut]),
                None => debug,
            }
        }
    }
}

fn compact_json(value: &serde_json::Value) -> String {
    // Serializing a Value only fails on non-string map keys, which Value cannot hold.
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Lightweight whitespace compression for prose.
///
/// - runs of blank lines become a single blank line
/// - runs of spaces or tabs inside a line become one space
/// - trailing whitespace is removed from every line
/// - leading and trailing blank lines are dropped
///
/// Lines inside ``` fences are left exactly as they are, and indented lines
/// (four spaces or a tab) keep their content untouched apart from trailing
/// whitespace.
pub fn squeeze_text(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut pending_blank = false;

    for line in text.lines() {
        let is_fence = line.trim_start().starts_with("```");

        if in_fence && !is_fence {
            out.push(line.to_string());
            continue;
        }

        let trimmed_end = line.trim_end();
        if trimmed_end.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push(String::new());
            pending_blank = false;
        }

        if is_fence {
            in_fence = !in_fence;
            out.push(trimmed_end.to_string());
        } else if trimmed_end.starts_with("    ") || trimmed_end.starts_with('\t') {
            out.push(trimmed_end.to_string());
        } else {
            out.push(collapse_inline(trimmed_end));
        }
    }

    out.join("\n")
}

fn collapse_inline(line: &str) -> String {
    let mut collapsed = String::with_capacity(line.len());
    let mut in_run = false;
    for c in line.chars() {
        if c == ' ' || c == '\t' {
            if !in_run {
                collapsed.push(' ');
            }
            in_run = true;
        } else {
            collapsed.push(c);
            in_run = false;
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn blank_runs_and_inline_spaces() {
        let input = "Inbox   summary:\n\n\n\n3   new\tmessages   \n\n";
        assert_eq!(squeeze_text(input), "Inbox summary:\n\n3 new messages");
    }

    #[test]
    fn indented_lines_keep_indentation() {
        let input = "Result:\n    let  x =  1;\n\tcell   two";
        assert_eq!(squeeze_text(input), "Result:\n    let  x =  1;\n\tcell   two");
    }

    #[test]
    fn fenced_blocks_are_untouched() {
        let input = "before   text\n```\nfn  main()  {}\n\n\n  spaced   \n```\nafter    text";
        assert_eq!(
            squeeze_text(input),
            "before text\n```\nfn  main()  {}\n\n\n  spaced   \n```\nafter text"
        );
    }

    #[test]
    fn json_text_is_minified() {
        let input = "{\n  \"from\": \"alice@example.com\",\n  \"subjects\": [\"a\", \"b\"]\n}";
        assert_eq!(
            compress(&ToolOutput::Text(input.into())),
            r#"{"from":"alice@example.com","subjects":["a","b"]}"#
        );
    }

    #[test]
    fn json_text_matches_structured_output() {
        let value = json!({"results": [{"title": "a", "score": 1}], "total": 1});
        let pretty = serde_json::to_string_pretty(&value).unwrap();
        assert_eq!(
            compress(&ToolOutput::Text(pretty)),
            compress(&ToolOutput::Structured(value))
        );
    }

    #[test]
    fn json_key_order_is_kept() {
        let output = ToolOutput::Structured(json!({"zeta": 1, "alpha": 2}));
        assert_eq!(compress(&output), r#"{"zeta":1,"alpha":2}"#);
    }

    #[test]
    fn broken_json_is_squeezed_instead() {
        assert_eq!(compress_text("{not   json"), "{not json");
    }

    #[test]
    fn empty_and_error_outputs() {
        assert_eq!(compress(&ToolOutput::Empty), "null");
        assert_eq!(
            compress(&ToolOutput::Error("smtp   refused\n\n\nretry".into())),
            "smtp refused\n\nretry"
        );
    }

    #[test]
    fn compression_is_idempotent() {
        let samples = [
            ToolOutput::Text("a    b\n\n\n\n    keep  this\n```\nx   y\n```\n".into()),
            ToolOutput::Text("[1, 2,   3]".into()),
            ToolOutput::Structured(json!({"k": [1, {"n": null}]})),
            ToolOutput::Error("  boom  \n\n\n".into()),
            ToolOutput::Empty,
        ];
        for sample in samples {
            let once = compress(&sample);
            let twice = compress(&ToolOutput::Text(once.clone()));
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn serializable_values() {
        #[derive(Debug, Serialize)]
        struct Mail {
            subject: String,
            unread: bool,
        }
        let mail = Mail {
            subject: "Hi".into(),
            unread: true,
        };
        assert_eq!(compress_serializable(&mail), r#"{"subject":"Hi","unread":true}"#);
    }

    #[test]
    fn unserializable_values_fall_back_to_debug() {
        // Tuple keys cannot become JSON object keys.
        let mut map: HashMap<(u32, u32), String> = HashMap::new();
        map.insert((1, 2), "x".repeat(1000));
        let rendered = compress_serializable(&map);
        assert!(rendered.ends_with("..."));
        assert_eq!(rendered.chars().count(), DEBUG_FALLBACK_CHARS + 3);
    }
}
