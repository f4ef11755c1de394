//! Payload recovery for tool arguments.
//!
//! Models do not always emit clean JSON: arguments arrive truncated, wrapped
//! in prose, or restated several times with corrections. [`recover_payload`]
//! scans the text for every decodable JSON value and keeps the last one.

use serde_json::{Deserializer, Map, Value};

/// Key used when the recovered value is not an object.
pub const SCALAR_KEY: &str = "_value";

/// Recover the final intended object from arbitrary text.
///
/// Never fails. Text without any decodable value yields an empty map, which
/// callers treat as "no usable arguments".
pub fn recover_payload(text: &str) -> Map<String, Value> {
    match last_value(text) {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(Value::Array(items)) if matches!(items.first(), Some(Value::Object(_))) => {
            match items.into_iter().next() {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            }
        }
        Some(other) => {
            let mut map = Map::new();
            map.insert(SCALAR_KEY.to_string(), other);
            map
        }
    }
}

/// Scan left to right and return the last value that decoded cleanly.
fn last_value(text: &str) -> Option<Value> {
    let mut last = None;
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        pos += rest.len() - trimmed.len();

        let mut stream = Deserializer::from_str(&text[pos..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                last = Some(value);
                pos += stream.byte_offset().max(1);
            }
            _ => match next_opener(text, pos) {
                Some(next) => pos = next,
                None => break,
            },
        }
    }

    last
}

/// Byte offset of the next `{` or `[` strictly after `pos`.
fn next_opener(text: &str, pos: usize) -> Option<usize> {
    text[pos..]
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '{' || c == '[')
        .map(|(offset, _)| pos + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_object() {
        let map = recover_payload(r#"{"query": "rust"}"#);
        assert_eq!(Value::Object(map), json!({"query": "rust"}));
    }

    #[test]
    fn empty_and_prose_inputs_give_empty_map() {
        assert!(recover_payload("").is_empty());
        assert!(recover_payload("   ").is_empty());
        assert!(recover_payload("no structure here at all").is_empty());
        assert!(recover_payload("unbalanced { brace and [ bracket").is_empty());
    }

    #[test]
    fn last_of_several_objects_wins() {
        let text = r#"First try {"to": "a@x.com"} hmm, correction: {"to": "b@x.com", "subject": "hi"} done."#;
        let map = recover_payload(text);
        assert_eq!(map["to"], "b@x.com");
        assert_eq!(map["subject"], "hi");
    }

    #[test]
    fn concatenated_objects_without_separator() {
        let map = recover_payload(r#"{"a":1}{"a":2}{"a":3}"#);
        assert_eq!(map["a"], 3);
    }

    #[test]
    fn truncated_tail_keeps_earlier_object() {
        let map = recover_payload(r#"{"query": "one"} {"query": "tw"#);
        assert_eq!(map["query"], "one");
    }

    #[test]
    fn truncated_outer_object_recovers_inner_one() {
        let map = recover_payload(r#"{"outer": {"inner": true}, "more": "#);
        assert_eq!(Value::Object(map), json!({"inner": true}));
    }

    #[test]
    fn array_of_objects_returns_first_element() {
        let map = recover_payload(r#"[{"i": 0}, {"i": 1}]"#);
        assert_eq!(map["i"], 0);
    }

    #[test]
    fn scalar_and_plain_array_are_wrapped() {
        assert_eq!(recover_payload("42")[SCALAR_KEY], 42);
        assert_eq!(recover_payload(r#""just text""#)[SCALAR_KEY], "just text");
        assert_eq!(recover_payload("[1, 2]")[SCALAR_KEY], json!([1, 2]));
        assert_eq!(recover_payload("[]")[SCALAR_KEY], json!([]));
    }

    #[test]
    fn multibyte_prose_is_skipped_safely() {
        let map = recover_payload(r#"好的，参数如下：{"收件人": "张三"} 完成"#);
        assert_eq!(map["收件人"], "张三");
    }

    #[test]
    fn nth_object_is_returned_for_many_objects() {
        let text: String = (0..10)
            .map(|i| format!("note {i}: {{\"n\": {i}}} "))
            .collect();
        let map = recover_payload(&text);
        assert_eq!(map["n"], 9);
    }
}
