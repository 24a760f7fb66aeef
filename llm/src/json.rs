use crate::error::{LlmError, Result};
use serde::de::DeserializeOwned;

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````) if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `cypher`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Outermost balanced `{...}` object in a model response.
///
/// Braces inside JSON strings are ignored. Returns `None` when the text holds
/// no complete object.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let text = strip_code_fences(text);
    let start = text.find('{')?;

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
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract and deserialize the JSON object in a model response.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T> {
    let object = extract_json_object(text)
        .ok_or_else(|| LlmError::InvalidResponse("no JSON object in response".to_string()))?;
    Ok(serde_json::from_str(object)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```cypher\nMATCH (n) RETURN n\n```"), "MATCH (n) RETURN n");
        assert_eq!(strip_code_fences("  plain  "), "plain");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_extract_object_with_surrounding_prose() {
        let text = "Sure! Here it is:\n{\"a\": {\"b\": 1}} and that's all.";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn test_extract_ignores_braces_in_strings() {
        let text = r#"```json
{"query": "MATCH (c:CLASS {name: '}'}) RETURN c", "n": "\"{"}
```"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"query": "MATCH (c:CLASS {name: '}'}) RETURN c", "n": "\"{"}"#)
        );
    }

    #[test]
    fn test_extract_incomplete_object() {
        assert_eq!(extract_json_object("{\"a\": 1"), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_parse_json_object() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Reply {
            confidence: f64,
        }
        let reply: Reply = parse_json_object("```json\n{\"confidence\": 0.7}\n```").unwrap();
        assert_eq!(reply, Reply { confidence: 0.7 });

        assert!(matches!(
            parse_json_object::<Reply>("nothing"),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_json_object::<Reply>("{\"confidence\": \"high\"}"),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
