//! Typed access to tool call arguments.

use serde_json::{Map, Value};

use crate::error::{PalaverError, Result};

/// Arguments of one tool call, always a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    values: Map<String, Value>,
}

impl ToolArguments {
    /// Wrap a decoded argument value. Non-object values are stored under
    /// `"input"` so executors still see a map.
    pub fn new(value: Value) -> Self {
        let values = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        Self { values }
    }

    /// Fill in `defaults` for keys the caller did not supply.
    pub fn with_defaults(mut self, defaults: &Map<String, Value>) -> Self {
        for (key, value) in defaults {
            self.values
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Remove and return a value (e.g. a control key such as `jobname`).
    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.get_str_opt(key)
            .ok_or_else(|| PalaverError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Boolean argument; models sometimes send `"true"` as a string.
    pub fn get_bool_opt(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => match text.as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// List of strings; a single string or a comma-separated string is
    /// accepted as well.
    pub fn get_str_list(&self, key: &str) -> Result<Vec<String>> {
        match self.values.get(key) {
            Some(Value::Array(items)) => Ok(items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect()),
            Some(Value::String(text)) => Ok(text
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()),
            _ => Err(PalaverError::InvalidArgument(format!(
                "Missing list argument: {key}"
            ))),
        }
    }

    /// Deserialize the arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_value()).map_err(|e| {
            PalaverError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

impl From<Value> for ToolArguments {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
