// Validation of tool arguments against their input schema.
//
// Covers the JSON-Schema keywords tool schemas use: type, properties,
// required, additionalProperties (false), enum, items, minimum/maximum and
// minLength/maxLength. Unknown keywords are ignored.

use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for SchemaError {}

pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaError> {
    validate_at(schema, value, "$")
}

fn fail(path: &str, message: impl Into<String>) -> Result<(), SchemaError> {
    Err(SchemaError {
        path: path.to_string(),
        message: message.into(),
    })
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    let schema = match schema {
        Value::Object(map) => map,
        // `true` or a missing schema accepts anything
        _ => return Ok(()),
    };

    if let Some(expected) = schema.get("type") {
        check_type(expected, value, path)?;
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return fail(path, format!("must be one of {}", Value::Array(allowed.clone())));
        }
    }

    match value {
        Value::Object(object) => check_object(schema, object, path)?,
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_at(item_schema, item, &format!("{}[{}]", path, i))?;
                }
            }
        }
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    return fail(path, format!("must be at least {} characters", min));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if len > max {
                    return fail(path, format!("must be at most {} characters", max));
                }
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if n < min {
                    return fail(path, format!("must be >= {}", min));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if n > max {
                    return fail(path, format!("must be <= {}", max));
                }
            }
        }
        _ => {}
    }

    Ok(())
}

fn check_object(schema: &Map<String, Value>, object: &Map<String, Value>, path: &str) -> Result<(), SchemaError> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                return fail(path, format!("missing required property '{}'", name));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = matches!(schema.get("additionalProperties"), Some(Value::Bool(false)));

    for (name, value) in object {
        let child = format!("{}.{}", path, name);
        match properties.and_then(|p| p.get(name)) {
            Some(prop_schema) => validate_at(prop_schema, value, &child)?,
            None if closed => return fail(&child, "unexpected property"),
            None => {}
        }
    }
    Ok(())
}

fn check_type(expected: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    let matches = match expected {
        Value::String(name) => type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| type_matches(name, value)),
        _ => true,
    };

    if matches {
        Ok(())
    } else {
        fail(path, format!("expected {}, got {}", expected, type_name(value)))
    }
}

fn type_matches(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": {"type": "string", "minLength": 1},
                "size": {"type": "integer", "minimum": 1, "maximum": 100},
                "order": {"type": "string", "enum": ["createdAt", "-createdAt"]},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["project_id"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_accepts_valid_arguments() {
        let args = json!({"project_id": "p1", "size": 20, "order": "-createdAt", "tags": ["a"]});
        assert!(validate(&post_schema(), &args).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate(&post_schema(), &json!({})).unwrap_err();
        assert!(err.message.contains("project_id"));
    }

    #[test]
    fn test_wrong_types_and_ranges() {
        let schema = post_schema();

        assert!(validate(&schema, &json!({"project_id": 5})).is_err());
        assert!(validate(&schema, &json!({"project_id": "p", "size": 1.5})).is_err());
        assert!(validate(&schema, &json!({"project_id": "p", "size": 0})).is_err());
        assert!(validate(&schema, &json!({"project_id": ""})).is_err());
        assert!(validate(&schema, &json!({"project_id": "p", "order": "name"})).is_err());

        let err = validate(&schema, &json!({"project_id": "p", "tags": ["a", 2]})).unwrap_err();
        assert_eq!(err.path, "$.tags[1]");
    }

    #[test]
    fn test_additional_properties() {
        let err = validate(&post_schema(), &json!({"project_id": "p", "extra": 1})).unwrap_err();
        assert_eq!(err.path, "$.extra");

        let open = json!({"type": "object", "properties": {}});
        assert!(validate(&open, &json!({"anything": true})).is_ok());
    }

    #[test]
    fn test_type_list() {
        let schema = json!({"type": ["string", "null"]});
        assert!(validate(&schema, &json!(null)).is_ok());
        assert!(validate(&schema, &json!("x")).is_ok());
        assert!(validate(&schema, &json!(1)).is_err());
    }
}
