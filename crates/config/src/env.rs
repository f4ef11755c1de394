//! `${VAR}` / `$VAR` placeholder expansion for configuration values.
//!
//! Expansion runs over the raw document before it is deserialized, so every
//! string in the file (API keys, server args, headers, prompts) can refer to
//! the environment. Unset variables leave the placeholder text untouched.

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("placeholder pattern is valid")
});

/// Expand placeholders in a single string using the process environment.
pub fn expand(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand placeholders in a single string with a custom lookup.
pub fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains('$') {
        return input.to_string();
    }

    PLACEHOLDER.replace_all(input, |caps: &Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        lookup(name).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// Recursively expand placeholders in every string of a JSON document.
pub fn expand_value(value: &mut Value) {
    expand_value_with(value, &|name| std::env::var(name).ok());
}

pub(crate) fn expand_value_with(value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => *s = expand_with(s, lookup),
        Value::Array(items) => items.iter_mut().for_each(|v| expand_value_with(v, lookup)),
        Value::Object(map) => map.values_mut().for_each(|v| expand_value_with(v, lookup)),
        _ => {}
    }
}
