//! Request formatting shared by the backends: response formats and media.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Value};

use crate::error::{PalaverError, Result};
use crate::resolve::is_remote;

/// Structured-output mode requested through a `format` option.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    JsonObject,
    /// Any other named type (e.g. `text`).
    Named(String),
    JsonSchema { name: String, schema: Value },
    /// A vendor format object given verbatim.
    Raw(Value),
}

impl ResponseFormat {
    /// Interpret a `format` option value.
    ///
    /// Bare property maps are wrapped in an object schema, string shorthands
    /// become `{type}`, `[type, description, default]` triples are expanded
    /// and every property without a default is required.
    pub fn from_option(value: &Value) -> Self {
        let mut schema = match value {
            Value::String(kind) if kind == "json" || kind == "json_object" => {
                return Self::JsonObject;
            }
            Value::String(kind) => return Self::Named(kind.clone()),
            Value::Object(map) if map.contains_key("format") => {
                return Self::Raw(map["format"].clone());
            }
            Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("json_schema") => {
                return Self::Raw(value.clone());
            }
            Value::Object(map) => map.clone(),
            other => return Self::Named(other.to_string()),
        };

        if !schema.contains_key("properties") {
            let properties = std::mem::take(&mut schema);
            schema.insert("properties".into(), Value::Object(properties));
        }
        let name = schema
            .remove("name")
            .and_then(|name| name.as_str().map(str::to_string))
            .unwrap_or_else(|| "response".to_string());

        let properties: Map<String, Value> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(key, info)| (key.clone(), expand_property(info)))
                    .collect()
            })
            .unwrap_or_default();
        let required: Vec<String> = properties
            .iter()
            .filter(|(_, info)| info.get("default").map_or(true, Value::is_null))
            .map(|(key, _)| key.clone())
            .collect();

        schema.insert("properties".into(), Value::Object(properties));
        schema.entry("type").or_insert_with(|| json!("object"));
        schema.insert(
            "additionalProperties".into(),
            if required.is_empty() { json!({"type": "string"}) } else { json!(false) },
        );
        schema.insert("required".into(), json!(required));

        Self::JsonSchema {
            name,
            schema: Value::Object(schema),
        }
    }

    /// `response_format` value for chat-completions style APIs.
    pub fn to_chat(&self) -> Value {
        match self {
            Self::JsonObject => json!({"type": "json_object"}),
            Self::Named(kind) => json!({"type": kind}),
            Self::JsonSchema { name, schema } => json!({
                "type": "json_schema",
                "json_schema": {"name": name, "schema": schema},
            }),
            Self::Raw(value) => value.clone(),
        }
    }

    /// `text.format` value for the Responses API.
    pub fn to_responses(&self) -> Value {
        match self {
            Self::JsonObject => json!({"type": "json_object"}),
            Self::Named(kind) => json!({"type": kind}),
            Self::JsonSchema { name, schema } => json!({
                "type": "json_schema",
                "name": name,
                "schema": schema,
            }),
            Self::Raw(value) => value.clone(),
        }
    }
}

fn expand_property(info: &Value) -> Value {
    match info {
        Value::String(kind) => json!({"type": kind}),
        Value::Array(parts) => {
            let mut property = Map::new();
            if let Some(kind) = parts.first() {
                property.insert("type".into(), kind.clone());
            }
            if let Some(description) = parts.get(1) {
                property.insert("description".into(), description.clone());
            }
            if let Some(default) = parts.get(2) {
                property.insert("default".into(), default.clone());
            }
            Value::Object(property)
        }
        other => other.clone(),
    }
}

/// Image or document referenced by an `image` / `pdf` message.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Remote(String),
    Inline {
        mime: String,
        data: String,
        filename: String,
    },
}

impl MediaSource {
    /// Load `reference`; remote URLs are passed through untouched.
    pub fn load(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if is_remote(reference) {
            return Ok(Self::Remote(reference.to_string()));
        }
        let path = Path::new(reference);
        let bytes = std::fs::read(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => PalaverError::not_found("File", reference),
            _ => err.into(),
        })?;
        let mime = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| reference.to_string());
        Ok(Self::Inline {
            mime,
            data: STANDARD.encode(bytes),
            filename,
        })
    }

    /// `data:` URL for inline media, the URL itself for remote media.
    pub fn url(&self) -> String {
        match self {
            Self::Remote(url) => url.clone(),
            Self::Inline { mime, data, .. } => format!("data:{mime};base64,{data}"),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn json_shorthands() {
        assert_eq!(ResponseFormat::from_option(&json!("json")), ResponseFormat::JsonObject);
        assert_eq!(
            ResponseFormat::from_option(&json!("text")).to_chat(),
            json!({"type": "text"})
        );
    }

    #[test]
    fn bare_property_maps_become_schemas() {
        let format = ResponseFormat::from_option(&json!({
            "answer": "string",
            "confidence": ["number", "how sure", 0.5],
        }));
        let ResponseFormat::JsonSchema { name, schema } = format else {
            panic!("expected a schema");
        };
        assert_eq!(name, "response");
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["answer"], json!({"type": "string"}));
        assert_eq!(schema["properties"]["confidence"]["default"], json!(0.5));
        assert_eq!(schema["required"], json!(["answer"]));
        assert_eq!(schema["additionalProperties"], json!(false));
    }

    #[test]
    fn media_is_inlined_with_guessed_mime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pixel.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let media = MediaSource::load(&path.display().to_string()).unwrap();
        assert_eq!(media.url(), "data:image/png;base64,AQID");
        assert!(MediaSource::load("https://example.com/a.png").unwrap().is_remote());
    }
}
