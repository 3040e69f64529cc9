//! Structured payload extraction from free-form model output.
//!
//! Completion backends are asked to return bare JSON, but routinely wrap it
//! in Markdown fences or add a sentence of prose. Every stage funnels model
//! output through [`extract_json_payload`] instead of stripping prefixes
//! ad hoc.
//!
//! # Grammar
//!
//! ```text
//! payload  := ws [ fence ] json-value [ "```" ] ws
//! fence    := "```" [ lang-tag ] [ newline ]
//! lang-tag := [A-Za-z0-9_+-]+
//! ```
//!
//! If the unwrapped text is not exactly one JSON value, balanced spans are
//! tried in order: every `{...}` object first, then every `[...]` array.
//! The first span that parses wins, so bracketed prose such as "criteria
//! [1] and [3]" never shadows the object that follows it.

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

const FENCE: &str = "```";

/// Extract exactly one JSON value from `text`.
pub fn extract_json_payload(text: &str) -> Result<Value> {
    let body = strip_fence(text.trim());
    if body.is_empty() {
        bail!("empty response");
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(whole_err) => {
            let mut last_err = None;
            for open in ['{', '['] {
                for (start, _) in body.match_indices(open) {
                    let Some(span) = balanced_span_at(body, start) else {
                        continue;
                    };
                    match serde_json::from_str::<Value>(span) {
                        Ok(value) => return Ok(value),
                        Err(e) => last_err = Some(e),
                    }
                }
            }
            match last_err {
                Some(e) => Err(anyhow!("embedded JSON is invalid: {}", e)),
                None => Err(anyhow!("response is not valid JSON: {}", whole_err)),
            }
        }
    }
}

/// Remove an optional opening fence (with language tag) and closing fence.
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return text;
    };
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')))
        .unwrap_or(rest.len());
    let rest = &rest[tag_len..];
    let rest = match rest.rfind(FENCE) {
        Some(end) => &rest[..end],
        None => rest,
    };
    rest.trim()
}

/// Balanced object or array opening at byte `start`, respecting JSON strings.
fn balanced_span_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
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
    fn bare_object() {
        let v = extract_json_payload(r#"{"summary": "x"}"#).unwrap();
        assert_eq!(v, json!({"summary": "x"}));
    }

    #[test]
    fn fenced_with_language_tag() {
        let text = "```json\n{\"selected_files\": [0, 2]}\n```";
        let v = extract_json_payload(text).unwrap();
        assert_eq!(v, json!({"selected_files": [0, 2]}));
    }

    #[test]
    fn fenced_without_tag_or_newline() {
        assert_eq!(extract_json_payload("```[1,2]```").unwrap(), json!([1, 2]));
        assert_eq!(extract_json_payload("```\n[3]\n```").unwrap(), json!([3]));
    }

    #[test]
    fn unterminated_fence_is_tolerated() {
        let v = extract_json_payload("```json\n{\"a\": 1}").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn prose_around_json() {
        let text = "Here is the result:\n{\"purpose\": \"uses {braces} in strings\"}\nHope it helps.";
        let v = extract_json_payload(text).unwrap();
        assert_eq!(v, json!({"purpose": "uses {braces} in strings"}));
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let text = r#"Sure: {"summary": "say \"hi\" }"} trailing"#;
        let v = extract_json_payload(text).unwrap();
        assert_eq!(v["summary"], "say \"hi\" }");
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(extract_json_payload("").is_err());
        assert!(extract_json_payload("   ```json\n```  ").is_err());
        assert!(extract_json_payload("no json here").is_err());
        assert!(extract_json_payload("{\"unclosed\": [1, 2").is_err());
    }

    #[test]
    fn bracketed_prose_before_object() {
        let text = r#"Per criteria [1] and [3], the best files are: {"selected_files": [0, 2]}"#;
        let v = extract_json_payload(text).unwrap();
        assert_eq!(v, json!({"selected_files": [0, 2]}));
    }

    #[test]
    fn prose_braces_before_array() {
        let text = "Ranked by {relevance}: [4, 1]";
        assert_eq!(extract_json_payload(text).unwrap(), json!([4, 1]));
    }
}
