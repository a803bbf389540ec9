//! Structured payloads carried by tasks, plans and conversations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OrchestrationError, OrchestrationResult};

/// A well-formed payload: a JSON object.
///
/// Anything that is not an object (strings, arrays, numbers, null) is
/// rejected with [`OrchestrationError::InvalidInput`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Validate a raw JSON value as a payload.
    pub fn from_value(value: Value) -> OrchestrationResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(OrchestrationError::InvalidInput(
                "payload is null".to_string(),
            )),
            other => Err(OrchestrationError::InvalidInput(format!(
                "payload must be an object, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Parse JSON text into a payload.
    pub fn parse(text: &str) -> OrchestrationResult<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            OrchestrationError::InvalidInput(format!("Invalid input data format: {}", e))
        })?;
        Self::from_value(value)
    }

    /// Add a field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a field, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Get a nested object field as a payload, if it is an object.
    pub fn get_object(&self, key: &str) -> Option<Payload> {
        self.0
            .get(key)
            .and_then(Value::as_object)
            .map(|m| Payload(m.clone()))
    }

    /// Check whether the payload has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Clone into a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        payload.into_value()
    }
}

impl TryFrom<Value> for Payload {
    type Error = OrchestrationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

fn kind_of(value: &Value) -> &'static str {
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

    #[test]
    fn test_object_is_accepted() {
        let payload = Payload::from_value(json!({"goal": "create a lead"})).unwrap();
        assert_eq!(payload.get_str("goal"), Some("create a lead"));
    }

    #[test]
    fn test_non_objects_are_rejected() {
        for value in [json!(null), json!("text"), json!([1, 2]), json!(3)] {
            let err = Payload::from_value(value).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_INPUT");
        }
    }

    #[test]
    fn test_parse_reports_format_errors() {
        let err = Payload::parse("{not json").unwrap_err();
        assert!(err.to_string().contains("Invalid input data format"));
        assert!(Payload::parse(r#"{"a": 1}"#).is_ok());
    }

    #[test]
    fn test_get_object() {
        let payload = Payload::new().with("context", json!({"customer": "Acme"}));
        let ctx = payload.get_object("context").unwrap();
        assert_eq!(ctx.get_str("customer"), Some("Acme"));
        assert!(payload.get_object("missing").is_none());
    }
}
