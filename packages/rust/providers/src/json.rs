//! Lenient JSON extraction from model output.
//!
//! Models asked for JSON sometimes wrap it in a Markdown fence or surround
//! it with prose, especially when search grounding is on and a response
//! schema cannot be enforced.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)```").expect("valid regex")
});

/// Parse JSON out of `text`.
///
/// Tries, in order: the whole text, the first fenced code block, the first
/// balanced `{...}` and the first balanced `[...]`.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(caps) = FENCE_RE.captures(trimmed) {
        if let Ok(value) = serde_json::from_str(caps[1].trim()) {
            return Some(value);
        }
    }

    ['{', '[']
        .into_iter()
        .filter_map(|open| balanced_span(trimmed, open))
        .find_map(|span| serde_json::from_str(span).ok())
}

/// The first balanced span starting at `open`, skipping brackets inside
/// string literals.
fn balanced_span(text: &str, open: char) -> Option<&str> {
    let close = if open == '{' { '}' } else { ']' };
    let start = text.find(open)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_body() {
        assert_eq!(extract_json(r#" {"a": 1} "#), Some(json!({"a": 1})));
    }

    #[test]
    fn fenced_block() {
        let text = "Here you go:\n```json\n{\"keywords\": [\"crm pricing\"]}\n```\nEnjoy.";
        assert_eq!(extract_json(text), Some(json!({"keywords": ["crm pricing"]})));
    }

    #[test]
    fn object_inside_prose() {
        let text = r#"Sure! {"scores": [{"keyword": "a }b", "score": 70}]} Let me know."#;
        assert_eq!(
            extract_json(text),
            Some(json!({"scores": [{"keyword": "a }b", "score": 70}]}))
        );
    }

    #[test]
    fn array_inside_prose() {
        let text = "Result: [1, 2, 3] done";
        assert_eq!(extract_json(text), Some(json!([1, 2, 3])));
    }

    #[test]
    fn escaped_quotes_in_strings() {
        let text = r#"x {"q": "say \"hi\" {"} y"#;
        assert_eq!(extract_json(text), Some(json!({"q": "say \"hi\" {"})));
    }

    #[test]
    fn nothing_parseable() {
        assert_eq!(extract_json(""), None);
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{ unbalanced"), None);
    }
}
