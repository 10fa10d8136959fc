//! Remote tool servers discovered at runtime.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::arguments::ToolArguments;
use super::definition::{ToolDefinition, ToolExecutor};
use super::types::ToolParameters;
use crate::error::Result;

/// A tool advertised by a remote server.
#[derive(Debug, Clone)]
pub struct RemoteTool {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

/// Connected remote tool server.
#[async_trait]
pub trait RemoteToolClient: Send + Sync + fmt::Debug {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>>;
    async fn call_tool(&self, name: &str, params: &ToolArguments) -> Result<Value>;
}

/// Where a remote tool server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEndpoint {
    Http { url: String, token: Option<String> },
    Stdio { command: String },
}

/// Transport that opens [`RemoteToolClient`]s.
#[async_trait]
pub trait RemoteToolConnector: Send + Sync + fmt::Debug {
    async fn connect(&self, endpoint: &RemoteEndpoint) -> Result<Arc<dyn RemoteToolClient>>;
}

/// Tool definitions for a connected server; `only` restricts by name.
pub async fn remote_tools(client: Arc<dyn RemoteToolClient>, only: &[String]) -> Result<Vec<ToolDefinition>> {
    let listed = client.list_tools().await?;
    let tools = listed
        .into_iter()
        .filter(|tool| only.is_empty() || only.contains(&tool.name))
        .map(|tool| {
            ToolDefinition::new(
                tool.name,
                tool.description,
                tool.parameters,
                ToolExecutor::Remote(client.clone()),
            )
        })
        .collect();
    Ok(tools)
}

/// Peel the envelope remote servers wrap results in: a `content` field, a
/// single-element list, then `content` or `text` of that element.
pub fn unwrap_remote_result(result: Value) -> Value {
    let result = take_field(result, "content");
    let result = match result {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    let result = take_field(result, "content");
    take_field(result, "text")
}

fn take_field(value: Value, field: &str) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key(field) => map.remove(field).unwrap_or_default(),
        other => other,
    }
}
