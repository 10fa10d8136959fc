//! Canonical message types shared by every component.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PalaverError, Result};

/// Message role tag.
///
/// Roles the core understands structurally get their own variant; any
/// other tag is carried through untouched as [`Role::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    System,
    Assistant,
    Tool,
    FunctionCall,
    FunctionCallOutput,
    Image,
    Pdf,
    Websearch,
    /// Continuation marker carrying a backend-issued response handle.
    PreviousResponseId,
    Import,
    Continue,
    Last,
    File,
    Directory,
    Task,
    InlineTask,
    ExecTask,
    Job,
    InlineJob,
    Mcp,
    Kb,
    Association,
    Option,
    StickyOption,
    Format,
    Endpoint,
    Model,
    Backend,
    Agent,
    Persist,
    Clear,
    ClearTools,
    ClearAssociations,
    Skip,
    Other(String),
}

impl Role {
    /// Every role with a dedicated variant, in declaration order.
    pub const KNOWN: &'static [Role] = &[
        Role::User,
        Role::System,
        Role::Assistant,
        Role::Tool,
        Role::FunctionCall,
        Role::FunctionCallOutput,
        Role::Image,
        Role::Pdf,
        Role::Websearch,
        Role::PreviousResponseId,
        Role::Import,
        Role::Continue,
        Role::Last,
        Role::File,
        Role::Directory,
        Role::Task,
        Role::InlineTask,
        Role::ExecTask,
        Role::Job,
        Role::InlineJob,
        Role::Mcp,
        Role::Kb,
        Role::Association,
        Role::Option,
        Role::StickyOption,
        Role::Format,
        Role::Endpoint,
        Role::Model,
        Role::Backend,
        Role::Agent,
        Role::Persist,
        Role::Clear,
        Role::ClearTools,
        Role::ClearAssociations,
        Role::Skip,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::FunctionCall => "function_call",
            Role::FunctionCallOutput => "function_call_output",
            Role::Image => "image",
            Role::Pdf => "pdf",
            Role::Websearch => "websearch",
            Role::PreviousResponseId => "previous_response_id",
            Role::Import => "import",
            Role::Continue => "continue",
            Role::Last => "last",
            Role::File => "file",
            Role::Directory => "directory",
            Role::Task => "task",
            Role::InlineTask => "inline_task",
            Role::ExecTask => "exec_task",
            Role::Job => "job",
            Role::InlineJob => "inline_job",
            Role::Mcp => "mcp",
            Role::Kb => "kb",
            Role::Association => "association",
            Role::Option => "option",
            Role::StickyOption => "sticky_option",
            Role::Format => "format",
            Role::Endpoint => "endpoint",
            Role::Model => "model",
            Role::Backend => "backend",
            Role::Agent => "agent",
            Role::Persist => "persist",
            Role::Clear => "clear",
            Role::ClearTools => "clear_tools",
            Role::ClearAssociations => "clear_associations",
            Role::Skip => "skip",
            Role::Other(tag) => tag,
        }
    }

    /// Parse a tag; unknown tags become [`Role::Other`].
    pub fn from_tag(tag: &str) -> Self {
        Role::KNOWN
            .iter()
            .find(|role| role.as_str() == tag)
            .cloned()
            .unwrap_or_else(|| Role::Other(tag.to_string()))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Role::Other(_))
    }

    /// Roles that name an option rather than conversational content.
    pub fn is_option(&self) -> bool {
        matches!(
            self,
            Role::Option
                | Role::StickyOption
                | Role::Format
                | Role::Endpoint
                | Role::Model
                | Role::Backend
                | Role::Agent
                | Role::Persist
                | Role::PreviousResponseId
        )
    }

    /// Roles that register tools into the catalogue.
    pub fn is_tool_directive(&self) -> bool {
        matches!(
            self,
            Role::Tool
                | Role::Mcp
                | Role::Kb
                | Role::Association
                | Role::ClearTools
                | Role::ClearAssociations
        )
    }

    /// Roles printed on a single line by the markup printer.
    pub fn prints_inline(&self) -> bool {
        matches!(
            self,
            Role::Option
                | Role::PreviousResponseId
                | Role::FunctionCall
                | Role::FunctionCallOutput
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Role::from_tag(s))
    }
}

impl From<String> for Role {
    fn from(tag: String) -> Self {
        Role::from_tag(&tag)
    }
}

impl From<&str> for Role {
    fn from(tag: &str) -> Self {
        Role::from_tag(tag)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// Message content: plain text or a structured JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(Value),
}

impl Content {
    /// Text form; structured values are rendered as compact JSON.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Content::Text(text) => Cow::Borrowed(text),
            Content::Structured(Value::String(text)) => Cow::Borrowed(text),
            Content::Structured(value) => Cow::Owned(value.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.is_empty(),
            Content::Structured(Value::Null) => true,
            Content::Structured(Value::String(text)) => text.is_empty(),
            Content::Structured(_) => false,
        }
    }

    /// JSON view; text is parsed when it holds JSON, else wrapped as a string.
    pub fn to_value(&self) -> Value {
        match self {
            Content::Text(text) => serde_json::from_str(text.trim())
                .unwrap_or_else(|_| Value::String(text.clone())),
            Content::Structured(value) => value.clone(),
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Structured(value)
    }
}

/// A single canonical message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn new(role: impl Into<Role>, content: impl Into<Content>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into())
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text.into())
    }

    /// Continuation marker holding a response handle.
    pub fn continuation(handle: impl Into<String>) -> Self {
        Self::new(Role::PreviousResponseId, handle.into())
    }

    pub fn function_call(call: &ToolCall) -> Self {
        Self::new(Role::FunctionCall, call.to_value())
    }

    pub fn function_call_output(result: &ToolResult) -> Self {
        Self::new(Role::FunctionCallOutput, result.to_value())
    }

    pub fn text(&self) -> Cow<'_, str> {
        self.content.as_text()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Decode the tool call carried by a `function_call` message.
    pub fn as_tool_call(&self) -> Result<ToolCall> {
        ToolCall::from_value(&self.content.to_value())
    }

    /// Decode the tool result carried by a `function_call_output` message.
    pub fn as_tool_result(&self) -> Result<ToolResult> {
        ToolResult::from_value(&self.content.to_value())
    }
}

/// A tool invocation requested by the model (or synthesized from a job).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Synthesize a correlation id for calls the vendor left unnamed.
    pub fn synthesize_id() -> String {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        format!("call_{}", &uuid[..24])
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "arguments": self.arguments,
        })
    }

    /// Accepts flat (`{id|call_id, name, arguments}`) and nested
    /// (`{id, function: {name, arguments}}`) shapes; string arguments are
    /// decoded as JSON.
    pub fn from_value(value: &Value) -> Result<Self> {
        let function = value.get("function");
        let name = value
            .get("name")
            .or_else(|| function.and_then(|f| f.get("name")))
            .and_then(Value::as_str)
            .ok_or_else(|| PalaverError::directive("function_call", "missing function name"))?;
        let id = value
            .get("call_id")
            .or_else(|| value.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(Self::synthesize_id);
        let arguments = value
            .get("arguments")
            .or_else(|| function.and_then(|f| f.get("arguments")))
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        Ok(Self {
            id,
            name: name.to_string(),
            arguments: decode_arguments(arguments),
        })
    }
}

/// Arguments may arrive JSON-encoded inside a string.
pub(crate) fn decode_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) if raw.trim().is_empty() => Value::Object(Default::default()),
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        Value::Null => Value::Object(Default::default()),
        other => other,
    }
}

/// The serialized outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub content: String,
}

impl ToolResult {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "content": self.content,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let id = value
            .get("id")
            .or_else(|| value.get("call_id"))
            .or_else(|| value.get("tool_call_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| PalaverError::directive("function_call_output", "missing call id"))?;
        let content = match value.get("content") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Ok(Self {
            id: id.to_string(),
            content,
        })
    }
}
