//! 结构化输出解析 - 格式说明生成与JSON提取

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;

use super::{ChainError, ChainOutput};

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap());

/// JSON schema instructions appended to a chain's system prompt.
pub fn format_instructions<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    format!(
        "OUTPUT FORMAT:\nRespond with a single JSON object that conforms to the JSON schema below. \
Do not add commentary outside the JSON.\n\n```json\n{:#}\n```",
        schema.as_value()
    )
}

/// Locates the first JSON object in a model reply, fenced or bare.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(text) {
        if let Some(body) = caps.get(1) {
            return Some(body.as_str());
        }
    }

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

pub fn parse_output<T: ChainOutput>(text: &str) -> Result<T, ChainError> {
    let json = extract_json(text).ok_or(ChainError::MissingJson { kind: T::KIND })?;
    serde_json::from_str(json).map_err(|e| ChainError::Parse {
        kind: T::KIND,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::outputs::{SwotAnalysis, TrendItem};

    #[test]
    fn test_extract_fenced_json() {
        let reply = "Here is the analysis:\n```json\n{\"a\": {\"b\": 1}}\n```\nThanks";
        assert_eq!(extract_json(reply), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn test_extract_bare_json_with_braces_in_strings() {
        let reply = r#"Reasoning first. {"note": "uses } and { inside", "n": {"x": 2}} trailing"#;
        assert_eq!(
            extract_json(reply),
            Some(r#"{"note": "uses } and { inside", "n": {"x": 2}}"#)
        );
    }

    #[test]
    fn test_extract_handles_escaped_quotes() {
        let reply = r#"{"quote": "she said \"}\" loudly"}"#;
        assert_eq!(extract_json(reply), Some(reply));
    }

    #[test]
    fn test_extract_none_without_object() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{ never closed"), None);
    }

    #[test]
    fn test_parse_output_fills_missing_fields() {
        let reply = r#"```json
{"strengths": [{"description": "Largest network", "impact": "HIGH", "confidence": 0.9}]}
```"#;
        let swot: SwotAnalysis = parse_output(reply).unwrap();

        assert_eq!(swot.strengths.len(), 1);
        assert_eq!(swot.strengths[0].evidence, "");
        assert!(swot.threats.is_empty());
    }

    #[test]
    fn test_parse_output_errors_are_tagged_with_kind() {
        let missing = parse_output::<SwotAnalysis>("I could not do it");
        assert!(matches!(missing, Err(ChainError::MissingJson { .. })));

        let invalid = parse_output::<SwotAnalysis>(r#"{"strengths": "plenty"}"#);
        match invalid {
            Err(ChainError::Parse { kind, .. }) => assert_eq!(kind.as_str(), "swot_analysis"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_format_instructions_embed_schema_fields() {
        let instructions = format_instructions::<TrendItem>();
        assert!(instructions.contains("\"timing\""));
        assert!(instructions.contains("```json"));
    }
}
