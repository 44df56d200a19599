//! Rich-text helpers shared by blocks, properties and rows

use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

fn formula_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*formula:\s*(.*?)\s*\}\}").expect("valid formula regex"))
}

/// Rewrite `{{formula:expr}}` into the display marker `[Formula: expr]`.
pub fn rewrite_formula_placeholders(text: &str) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    formula_placeholder()
        .replace_all(text, "[Formula: $1]")
        .into_owned()
}

/// Build a rich-text array, splitting text longer than `max_chars`
/// into several segments on character boundaries.
pub fn rich_text(text: &str, max_chars: usize) -> Value {
    let text = rewrite_formula_placeholders(text);
    if text.is_empty() {
        return json!([]);
    }

    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    let segments: Vec<Value> = chars
        .chunks(max_chars)
        .map(|chunk| {
            let content: String = chunk.iter().collect();
            json!({"text": {"content": content}})
        })
        .collect();
    Value::Array(segments)
}

/// Render a scalar YAML value as display text.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// True for absolute http(s) URLs.
pub fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    let has_scheme = url.starts_with("https://") || url.starts_with("http://");
    has_scheme && url.len() > "https://".len() && !url.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_marker() {
        assert_eq!(
            rewrite_formula_placeholders("Total: {{formula:sum(Amount)}} USD"),
            "Total: [Formula: sum(Amount)] USD"
        );
        assert_eq!(
            rewrite_formula_placeholders("{{ formula: a + b }} and {{formula:c}}"),
            "[Formula: a + b] and [Formula: c]"
        );
        assert_eq!(rewrite_formula_placeholders("{{other}}"), "{{other}}");
    }

    #[test]
    fn test_rich_text_splits_long_text() {
        let text = "é".repeat(4500);
        let rt = rich_text(&text, 2000);
        let parts = rt.as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"]["content"].as_str().unwrap().chars().count(), 2000);
        assert_eq!(parts[2]["text"]["content"].as_str().unwrap().chars().count(), 500);
    }

    #[test]
    fn test_rich_text_empty() {
        assert_eq!(rich_text("", 2000), json!([]));
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://example.com/a.png"));
        assert!(is_http_url("http://x.io"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("https://bad url"));
        assert!(!is_http_url(""));
    }
}
