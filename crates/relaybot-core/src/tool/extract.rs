use serde_json::Value;
use tracing::debug;

use super::ToolInvocation;

const FENCE: &str = "```";
const JSON_TAG: &str = "json";

/// Find a tool invocation inside a model reply.
///
/// Fenced blocks are searched first; without a fence the whole reply must
/// look like a single JSON object. Malformed or incomplete instructions are
/// treated the same as plain text and yield `None`.
pub fn extract_tool_call(text: &str) -> Option<ToolInvocation> {
    let candidate = find_candidate(text)?;

    let value: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(e) => {
            debug!("Tool call candidate is not valid JSON: {}", e);
            return None;
        }
    };

    validate(value)
}

fn find_candidate(text: &str) -> Option<&str> {
    if text.contains(FENCE) {
        text.split(FENCE)
            .map(str::trim)
            .filter(|seg| !seg.is_empty())
            .find_map(|seg| {
                if has_json_tag(seg) {
                    Some(seg[JSON_TAG.len()..].trim())
                } else if looks_like_object(seg) {
                    Some(seg)
                } else {
                    None
                }
            })
    } else {
        let trimmed = text.trim();
        looks_like_object(trimmed).then_some(trimmed)
    }
}

fn has_json_tag(seg: &str) -> bool {
    seg.get(..JSON_TAG.len())
        .is_some_and(|tag| tag.eq_ignore_ascii_case(JSON_TAG))
}

fn looks_like_object(s: &str) -> bool {
    s.starts_with('{') && s.ends_with('}')
}

fn validate(value: Value) -> Option<ToolInvocation> {
    let Value::Object(mut map) = value else {
        debug!("Tool call candidate is not an object");
        return None;
    };

    let action = match map.remove("action") {
        Some(Value::String(a)) if !a.trim().is_empty() => a.trim().to_string(),
        _ => {
            debug!("Tool call candidate has no string 'action'");
            return None;
        }
    };

    let parameters = match map.remove("parameters") {
        Some(Value::Object(p)) => p.into_iter().collect(),
        _ => {
            debug!("Tool call candidate for '{}' has no 'parameters' object", action);
            return None;
        }
    };

    Some(ToolInvocation { action, parameters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_object() {
        let inv = extract_tool_call(r#"{"action": "get_weather", "parameters": {"city": "Beijing"}}"#)
            .unwrap();
        assert_eq!(inv.action, "get_weather");
        assert_eq!(inv.parameters.get("city"), Some(&json!("Beijing")));
    }

    #[test]
    fn test_fenced_with_tag() {
        let text = "```json\n{\"action\":\"calculator\",\"parameters\":{\"expression\":\"1+1\"}}\n```";
        let inv = extract_tool_call(text).unwrap();
        assert_eq!(inv.action, "calculator");
        assert_eq!(inv.parameters.get("expression"), Some(&json!("1+1")));
    }

    #[test]
    fn test_fenced_after_prose_uppercase_tag() {
        let text = "Sure, let me check.\n```JSON\n{\"action\":\"query_tasks\",\"parameters\":{}}\n```\nOne moment.";
        let inv = extract_tool_call(text).unwrap();
        assert_eq!(inv.action, "query_tasks");
        assert!(inv.parameters.is_empty());
    }

    #[test]
    fn test_fenced_without_tag() {
        let text = "```\n{\"action\":\"delete_task\",\"parameters\":{\"task_id\":\"abc\"}}\n```";
        assert_eq!(extract_tool_call(text).unwrap().action, "delete_task");
    }

    #[test]
    fn test_plain_text_is_not_a_call() {
        assert!(extract_tool_call("").is_none());
        assert!(extract_tool_call("   ").is_none());
        assert!(extract_tool_call("It is sunny in Beijing today.").is_none());
        assert!(extract_tool_call("{not closed").is_none());
    }

    #[test]
    fn test_invalid_json_in_fence() {
        assert!(extract_tool_call("```json\n{\"action\": \"calculator\", }\n```").is_none());
    }

    #[test]
    fn test_missing_or_mistyped_fields() {
        assert!(extract_tool_call(r#"{"action": "calculator"}"#).is_none());
        assert!(extract_tool_call(r#"{"parameters": {}}"#).is_none());
        assert!(extract_tool_call(r#"{"action": 3, "parameters": {}}"#).is_none());
        assert!(extract_tool_call(r#"{"action": "x", "parameters": [1]}"#).is_none());
        assert!(extract_tool_call("```json\n[1, 2]\n```").is_none());
    }

    #[test]
    fn test_first_matching_segment_wins() {
        let text = "```json\n{\"action\":\"a\",\"parameters\":{}}\n```\n```json\n{\"action\":\"b\",\"parameters\":{}}\n```";
        assert_eq!(extract_tool_call(text).unwrap().action, "a");
    }

    #[test]
    fn test_example_in_prose_is_accepted() {
        let text = "An instruction looks like this:\n```json\n{\"action\":\"get_weather\",\"parameters\":{\"city\":\"Paris\"}}\n```";
        assert!(extract_tool_call(text).is_some());
    }
}
