//! Synthesizes sample values from JSON-Schema-like descriptions.

use serde_json::{Map, Value};

/// Builds a value that fits `schema`.
///
/// At every node `example` wins, then `default`, then the first `enum`
/// entry. Arrays get a single synthesized item.
#[must_use]
pub fn synthesize(schema: &Value) -> Value {
    let Value::Object(node) = schema else {
        return Value::Null;
    };

    if let Some(example) = node.get("example") {
        return example.clone();
    }
    if let Some(Value::Array(examples)) = node.get("examples") {
        if let Some(first) = examples.first() {
            return first.clone();
        }
    }
    if let Some(default) = node.get("default") {
        return default.clone();
    }
    if let Some(first) = node.get("enum").and_then(Value::as_array).and_then(|e| e.first()) {
        return first.clone();
    }
    if let Some(Value::String(constant)) = node.get("const") {
        return Value::String(constant.clone());
    }
    for key in ["oneOf", "anyOf", "allOf"] {
        if let Some(first) = node.get(key).and_then(Value::as_array).and_then(|v| v.first()) {
            return synthesize(first);
        }
    }

    match schema_type(node) {
        Some("object") => synthesize_object(node),
        Some("array") => Value::Array(
            node.get("items")
                .map(|items| vec![synthesize(items)])
                .unwrap_or_default(),
        ),
        Some("string") => Value::String(sample_string(node)),
        Some("integer") => node
            .get("minimum")
            .and_then(Value::as_i64)
            .map_or_else(|| Value::from(1), Value::from),
        Some("number") => node
            .get("minimum")
            .and_then(Value::as_f64)
            .map_or_else(|| Value::from(1.0), Value::from),
        Some("boolean") => Value::Bool(true),
        _ => Value::Null,
    }
}

fn schema_type(node: &Map<String, Value>) -> Option<&str> {
    match node.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .or(Some("null")),
        _ if node.contains_key("properties") => Some("object"),
        _ if node.contains_key("items") => Some("array"),
        _ => None,
    }
}

fn synthesize_object(node: &Map<String, Value>) -> Value {
    let properties = node
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| (name.clone(), synthesize(prop)))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(properties)
}

fn sample_string(node: &Map<String, Value>) -> String {
    match node.get("format").and_then(Value::as_str) {
        Some("date-time") => crate::utils::iso_timestamp(),
        Some("date") => crate::utils::now_utc().format("%Y-%m-%d").to_string(),
        Some("uuid") => crate::utils::generate_event_id(),
        Some("email") => "user@example.com".to_string(),
        Some("uri" | "url") => "https://example.com/resource".to_string(),
        _ => "string".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_object_walk() {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "name": { "type": "string", "example": "Ada" },
                "tier": { "type": "string", "enum": ["gold", "silver"] },
                "active": { "type": "boolean", "default": false },
                "tags": { "type": "array", "items": { "type": "string" } },
                "note": { "type": ["null", "string"] }
            }
        });
        assert_eq!(
            synthesize(&schema),
            json!({
                "id": 1,
                "name": "Ada",
                "tier": "gold",
                "active": false,
                "tags": ["string"],
                "note": "string"
            })
        );
    }

    #[test]
    fn test_example_beats_default_and_enum() {
        let schema = json!({ "type": "string", "example": "e", "default": "d", "enum": ["x"] });
        assert_eq!(synthesize(&schema), json!("e"));
        let schema = json!({ "type": "string", "default": "d", "enum": ["x"] });
        assert_eq!(synthesize(&schema), json!("d"));
    }

    #[test]
    fn test_implicit_object_and_minimum() {
        let schema = json!({ "properties": { "count": { "type": "integer", "minimum": 5 } } });
        assert_eq!(synthesize(&schema), json!({ "count": 5 }));
    }

    #[test]
    fn test_formats() {
        let value = synthesize(&json!({ "type": "string", "format": "date-time" }));
        assert!(value.as_str().unwrap().ends_with('Z'));
        assert_eq!(
            synthesize(&json!({ "type": "string", "format": "email" })),
            json!("user@example.com")
        );
    }

    #[test]
    fn test_non_object_schema_is_null() {
        assert_eq!(synthesize(&json!(true)), Value::Null);
        assert_eq!(synthesize(&json!({ "type": "null" })), Value::Null);
    }
}
