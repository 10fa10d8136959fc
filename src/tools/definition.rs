//! Tool definitions and their executors.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use super::arguments::ToolArguments;
use super::knowledge_base::{call_knowledge_base, KnowledgeBase};
use super::remote::{unwrap_remote_result, RemoteToolClient};
use super::types::ToolParameters;
use super::workflow::{call_workflow, Workflow};
use crate::error::Result;

/// Callback invoked with the tool name and its arguments.
pub type ToolHandler =
    dyn Fn(String, ToolArguments) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Box an async closure as a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> Arc<ToolHandler>
where
    F: Fn(String, ToolArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |name, args| Box::pin(f(name, args)))
}

/// What runs when a tool is called.
#[derive(Clone)]
pub enum ToolExecutor {
    Inline(Arc<ToolHandler>),
    Workflow(Arc<dyn Workflow>),
    KnowledgeBase(Arc<dyn KnowledgeBase>),
    Remote(Arc<dyn RemoteToolClient>),
}

impl ToolExecutor {
    pub async fn call(&self, name: &str, args: ToolArguments) -> Result<Value> {
        match self {
            ToolExecutor::Inline(handler) => handler(name.to_string(), args).await,
            ToolExecutor::Workflow(workflow) => call_workflow(workflow.as_ref(), name, args).await,
            ToolExecutor::KnowledgeBase(kb) => call_knowledge_base(kb.as_ref(), name, args).await,
            ToolExecutor::Remote(client) => client
                .call_tool(name, &args)
                .await
                .map(unwrap_remote_result),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ToolExecutor::Inline(_) => "inline",
            ToolExecutor::Workflow(_) => "workflow",
            ToolExecutor::KnowledgeBase(_) => "knowledge_base",
            ToolExecutor::Remote(_) => "remote",
        }
    }
}

impl fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A named, described, callable tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
    /// Applied underneath caller-supplied arguments.
    pub defaults: Map<String, Value>,
    pub executor: ToolExecutor,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        executor: ToolExecutor,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            defaults: Map::new(),
            executor,
        }
    }

    /// Tool backed by an async closure.
    pub fn inline<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        f: F,
    ) -> Self
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler = handler(move |_name, args| f(args));
        Self::new(name, description, parameters, ToolExecutor::Inline(handler))
    }

    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Vendor-neutral shape: `{name, description, parameters}`.
    pub fn schema(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters.schema,
        })
    }
}
