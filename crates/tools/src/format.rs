//! Argument rewriting applied just before a tool runs.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

/// Rewrites the arguments of one named tool before it is invoked.
pub trait PreCallHook: Send + Sync {
    /// The tool this hook applies to.
    fn tool(&self) -> &str;

    fn apply(&self, arguments: &mut Map<String, Value>);
}

/// Hooks installed on every dispatcher.
pub fn default_hooks() -> Vec<Box<dyn PreCallHook>> {
    vec![Box::new(EmailHtmlHook)]
}

/// Turns a plain-text `send_email` body into an HTML document.
///
/// Bodies that already contain markup or HTML entities are left alone.
pub struct EmailHtmlHook;

impl PreCallHook for EmailHtmlHook {
    fn tool(&self) -> &str {
        "send_email"
    }

    fn apply(&self, arguments: &mut Map<String, Value>) {
        let Some(Value::String(body)) = arguments.get_mut("body") else {
            return;
        };
        if body.trim().is_empty() || looks_like_html(body) {
            return;
        }
        *body = text_to_html(body);
        debug!("Converted plain-text email body to HTML");
    }
}

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<!doctype\s+html|</?(html|head|body|div|p|br|img|a|span|table|tr|td|th|ul|ol|li|h[1-6]|strong|em|b|i|pre|code)(\s[^>]*)?/?>",
    )
    .expect("HTML tag pattern is valid")
});

const HTML_ENTITIES: &[&str] = &[
    "&nbsp;", "&lt;", "&gt;", "&amp;", "&quot;", "&apos;", "&copy;", "&reg;", "&trade;", "&euro;",
];

/// Whether the text already carries HTML markup.
pub fn looks_like_html(text: &str) -> bool {
    HTML_TAG.is_match(text)
        || HTML_ENTITIES.iter().any(|entity| text.contains(entity))
}

/// Wrap plain text in a minimal HTML document. Blank lines separate
/// paragraphs; single newlines become `<br>`.
pub fn text_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut paragraphs = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in normalized.trim().lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(format!("<p>{}</p>", current.join("<br>")));
                current.clear();
            }
        } else {
            current.push(escape_html(line.trim_end()));
        }
    }
    if !current.is_empty() {
        paragraphs.push(format!("<p>{}</p>", current.join("<br>")));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n\
         <style>body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }} p {{ margin: 0 0 12px; }}</style>\n\
         </head>\n<body>\n{}\n</body>\n</html>",
        paragraphs.join("\n")
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
