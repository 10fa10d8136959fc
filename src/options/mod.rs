//! Run options carried inside a conversation.
//!
//! `endpoint`, `model`, `backend`, `agent`, `previous_response_id` and
//! `sticky_option` messages set sticky options that hold for the rest of
//! the conversation. `persist`, `option` and `format` set transient options
//! that an `assistant` message discards.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::config::PalaverConfig;
use crate::error::{PalaverError, Result};
use crate::resolve::FileResolver;
use crate::types::{Conversation, Message, Role};

/// Option names consumed by palaver itself; everything else is forwarded to
/// the backend as a request parameter.
pub const CONTROL_KEYS: &[&str] = &[
    "agent",
    "backend",
    "endpoint",
    "format",
    "key",
    "max_turns",
    "model",
    "persist",
    "previous_response_id",
    "request_timeout",
    "tool_choice_next",
    "url",
    "websearch",
];

/// Extracted option map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    values: BTreeMap<String, Value>,
    resume_after: Option<usize>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String view of an option; numbers and booleans are rendered.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Copy every entry of `other` over this map.
    pub fn merge(&mut self, other: &RunOptions) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Fill keys this map does not have from `defaults`.
    pub fn merge_defaults(&mut self, defaults: &RunOptions) {
        for (key, value) in &defaults.values {
            self.values
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn backend(&self) -> Option<String> {
        self.get_str("backend")
    }

    pub fn model(&self) -> Option<String> {
        self.get_str("model")
    }

    pub fn endpoint(&self) -> Option<String> {
        self.get_str("endpoint")
    }

    pub fn agent(&self) -> Option<String> {
        self.get_str("agent")
    }

    /// Response handle from a previous stateful exchange.
    pub fn previous_response_id(&self) -> Option<String> {
        self.get_str("previous_response_id")
            .filter(|handle| !handle.trim().is_empty())
    }

    /// Position in the extracted messages just after the last continuation
    /// marker. A stateful backend resuming from the handle only needs the
    /// messages from here on.
    pub fn resume_after(&self) -> Option<usize> {
        self.resume_after
    }

    pub fn format(&self) -> Option<&Value> {
        self.get("format")
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.get_str("request_timeout")
            .and_then(|secs| secs.trim().parse::<f64>().ok())
            .map(Duration::from_secs_f64)
    }

    pub fn max_turns(&self) -> Option<usize> {
        self.get_str("max_turns")
            .and_then(|turns| turns.trim().parse().ok())
    }

    /// Whether a flag option is set to a truthy value.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => matches!(text.as_str(), "true" | "yes" | "1"),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        }
    }

    /// Options that are not consumed by palaver, for the vendor request.
    pub fn vendor_parameters(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values
            .iter()
            .filter(|(key, _)| !CONTROL_KEYS.contains(&key.as_str()))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RunOptions {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            resume_after: None,
        }
    }
}

/// Pulls option messages out of a conversation.
#[derive(Debug, Clone, Default)]
pub struct OptionExtractor {
    files: FileResolver,
}

impl OptionExtractor {
    pub fn new(files: FileResolver) -> Self {
        Self { files }
    }

    pub fn from_config(config: &PalaverConfig) -> Self {
        Self::new(FileResolver::from_config(config))
    }

    /// Remove option messages from `conversation` and return the options.
    pub fn extract(&self, conversation: &mut Conversation) -> Result<RunOptions> {
        let origin = conversation.origin().map(|path| path.to_path_buf());
        let (kept, options) =
            self.extract_messages(conversation.messages().to_vec(), origin.as_deref())?;
        conversation.replace(kept);
        Ok(options)
    }

    /// Single left-to-right scan. Transient options override sticky ones in
    /// the result.
    pub fn extract_messages(
        &self,
        messages: Vec<Message>,
        origin: Option<&std::path::Path>,
    ) -> Result<(Vec<Message>, RunOptions)> {
        let mut sticky = RunOptions::new();
        let mut transient = RunOptions::new();
        let mut kept = Vec::with_capacity(messages.len());
        let mut resume_after = None;

        for message in messages {
            match &message.role {
                Role::PreviousResponseId => {
                    sticky.set("previous_response_id", message.text().trim().to_string());
                    resume_after = Some(kept.len());
                }
                Role::Endpoint | Role::Model | Role::Backend | Role::Agent => {
                    sticky.set(message.role.as_str(), message.text().trim().to_string());
                }
                Role::Persist => {
                    transient.set("persist", option_value(message.text().trim()));
                }
                Role::Option => {
                    let (key, value) = split_option(&message)?;
                    transient.set(key, value);
                }
                Role::StickyOption => {
                    let (key, value) = split_option(&message)?;
                    sticky.set(key, value);
                }
                Role::Format => {
                    let format = self.load_format(&message, origin)?;
                    transient.set("format", format);
                }
                role => {
                    if *role == Role::Assistant {
                        transient = RunOptions::new();
                    }
                    kept.push(message);
                }
            }
        }

        let mut options = sticky;
        options.merge(&transient);
        options.resume_after = resume_after;
        Ok((kept, options))
    }

    fn load_format(&self, message: &Message, origin: Option<&std::path::Path>) -> Result<Value> {
        let text = match &message.content {
            crate::types::Content::Structured(value) if !value.is_string() => {
                return Ok(value.clone());
            }
            content => content.as_text().trim().to_string(),
        };
        if looks_like_filename(&text) {
            if let Some(path) = self.files.find(&text, origin) {
                let raw = std::fs::read_to_string(&path)?;
                tracing::debug!(path = %path.display(), "loaded response format");
                return Ok(serde_json::from_str(&raw)?);
            }
        }
        if text.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                return Ok(value);
            }
        }
        Ok(Value::String(text))
    }
}

/// Extract options with the global configuration's search path.
pub fn extract(conversation: &mut Conversation) -> Result<RunOptions> {
    OptionExtractor::from_config(PalaverConfig::global()).extract(conversation)
}

fn split_option(message: &Message) -> Result<(String, Value)> {
    let text = message.text();
    let text = text.trim();
    let (key, value) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    if key.is_empty() {
        return Err(PalaverError::directive(message.role.as_str(), "missing option name"));
    }
    Ok((key.to_string(), option_value(value.trim())))
}

/// Option values that parse as JSON scalars keep their type; everything else
/// is a string.
fn option_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn looks_like_filename(text: &str) -> bool {
    !text.is_empty()
        && !text.contains(char::is_whitespace)
        && !text.starts_with('{')
        && (text.contains('/') || text.contains('.'))
}
