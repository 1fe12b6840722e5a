//! Converts transport-shaped tool results into plain JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const RESULT_KEY: &str = "result";

/// A tool call result as returned by the tool server.
///
/// Field names follow the MCP `CallToolResult` wire shape. Fields the
/// normalizer does not read (`_meta`, image `data`, `annotations`, ...) are
/// kept in `extra` and serialized back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default = "default_part_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_part_type() -> String {
    "text".to_string()
}

impl RawToolResult {
    pub fn structured(value: Value) -> Self {
        Self { structured_content: Some(value), ..Self::default() }
    }

    pub fn text<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            content: parts.into_iter().map(ContentPart::text).collect(),
            ..Self::default()
        }
    }

    /// Text of all non-empty text parts joined by newlines.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| part.text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self { kind: default_part_type(), text: Some(text.into()), extra: Map::new() }
    }
}

/// Normalizes a raw tool result. Never fails: text that looks like JSON but
/// does not parse is kept as trimmed text.
pub fn normalize(raw: &RawToolResult) -> Value {
    if let Some(structured) = raw.structured_content.as_ref().filter(|value| !value.is_null()) {
        return unwrap_result_wrapper(structured.clone());
    }

    let mut parts: Vec<Value> = raw
        .content
        .iter()
        .filter_map(|part| part.text.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(normalize_text)
        .collect();

    match parts.len() {
        0 => Value::Null,
        1 => parts.remove(0),
        _ => Value::Array(parts),
    }
}

fn normalize_text(text: &str) -> Value {
    if text.starts_with('{') || text.starts_with('[') {
        match serde_json::from_str::<Value>(text) {
            Ok(parsed) => return unwrap_result_wrapper(parsed),
            Err(error) => {
                tracing::debug!(
                    event_name = "plan.normalize.text_fallback",
                    error = %error,
                    "content part looked like JSON but did not parse; keeping raw text"
                );
            }
        }
    }
    Value::String(text.to_string())
}

/// Returns the inner value of a `{"result": X}` mapping whose only key is
/// `result`; any other value is returned unchanged.
pub fn unwrap_result_wrapper(value: Value) -> Value {
    match value {
        Value::Object(mut mapping) if mapping.len() == 1 && mapping.contains_key(RESULT_KEY) => {
            mapping.remove(RESULT_KEY).unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{normalize, unwrap_result_wrapper, ContentPart, RawToolResult};

    #[test]
    fn structured_result_wrapper_is_unwrapped() {
        let raw = RawToolResult::structured(json!({"result": {"a": 1}}));
        assert_eq!(normalize(&raw), json!({"a": 1}));
    }

    #[test]
    fn structured_payload_with_other_keys_is_returned_as_is() {
        let raw = RawToolResult::structured(json!({"result": 1, "count": 2}));
        assert_eq!(normalize(&raw), json!({"result": 1, "count": 2}));

        let list = RawToolResult::structured(json!([1, 2]));
        assert_eq!(normalize(&list), json!([1, 2]));
    }

    #[test]
    fn structured_content_takes_precedence_over_text() {
        let raw = RawToolResult {
            structured_content: Some(json!({"result": "ocid1"})),
            content: vec![ContentPart::text("\"ocid1\"")],
            ..RawToolResult::default()
        };
        assert_eq!(normalize(&raw), json!("ocid1"));
    }

    #[test]
    fn null_structured_content_falls_back_to_text() {
        let raw = RawToolResult {
            structured_content: Some(Value::Null),
            content: vec![ContentPart::text("hello")],
            ..RawToolResult::default()
        };
        assert_eq!(normalize(&raw), json!("hello"));
    }

    #[test]
    fn single_json_text_part_is_parsed_and_unwrapped() {
        let raw = RawToolResult::text(["{\"result\": [1,2,3]}"]);
        assert_eq!(normalize(&raw), json!([1, 2, 3]));
    }

    #[test]
    fn single_plain_text_part_is_returned_trimmed() {
        let raw = RawToolResult::text(["  hello \n"]);
        assert_eq!(normalize(&raw), json!("hello"));
    }

    #[test]
    fn several_parts_keep_their_order() {
        let raw = RawToolResult::text(["a", "b"]);
        assert_eq!(normalize(&raw), json!(["a", "b"]));

        let mixed = RawToolResult::text(["[1]", "", "plain", "{\"id\": \"x\"}"]);
        assert_eq!(normalize(&mixed), json!([[1], "plain", {"id": "x"}]));
    }

    #[test]
    fn malformed_json_degrades_to_text_for_that_part_only() {
        let raw = RawToolResult::text(["{not json", "[1, 2]"]);
        assert_eq!(normalize(&raw), json!(["{not json", [1, 2]]));
    }

    #[test]
    fn empty_or_missing_content_is_null() {
        assert_eq!(normalize(&RawToolResult::default()), Value::Null);
        assert_eq!(normalize(&RawToolResult::text(["   ", ""])), Value::Null);

        let image_only = RawToolResult {
            content: vec![ContentPart {
                kind: "image".to_string(),
                text: None,
                extra: Map::new(),
            }],
            ..RawToolResult::default()
        };
        assert_eq!(normalize(&image_only), Value::Null);
    }

    #[test]
    fn deserializes_mcp_call_tool_result_shape() {
        let raw: RawToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "{\"result\": \"ocid1\"}", "annotations": null}],
            "structuredContent": {"result": "ocid1"},
            "isError": false
        }))
        .expect("call tool result should deserialize");

        assert_eq!(raw.content.len(), 1);
        assert_eq!(normalize(&raw), json!("ocid1"));
    }

    #[test]
    fn unmodelled_wire_fields_survive_a_round_trip() {
        let wire = json!({
            "_meta": {"trace": "t1"},
            "content": [
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "text", "text": "hi", "annotations": {"audience": ["user"]}}
            ],
            "isError": false
        });

        let raw: RawToolResult = serde_json::from_value(wire.clone()).expect("result deserializes");
        assert_eq!(raw.extra.get("_meta"), Some(&json!({"trace": "t1"})));
        assert_eq!(normalize(&raw), json!("hi"));
        assert_eq!(serde_json::to_value(&raw).expect("result serializes"), wire);
    }

    #[test]
    fn wrapper_unwrap_requires_exactly_the_result_key() {
        assert_eq!(unwrap_result_wrapper(json!({"result": null})), Value::Null);
        assert_eq!(unwrap_result_wrapper(json!({"results": 1})), json!({"results": 1}));
        assert_eq!(unwrap_result_wrapper(json!("result")), json!("result"));
    }
}
