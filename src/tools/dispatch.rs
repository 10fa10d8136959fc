//! Executes model-requested tool calls against a catalogue.

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};

use super::arguments::ToolArguments;
use super::catalogue::ToolCatalogue;
use super::definition::{handler, ToolHandler};
use crate::error::{PalaverError, Result};
use crate::types::{Message, ToolCall, ToolResult};

/// Resolves tool calls to executors and records each exchange as a
/// `function_call` / `function_call_output` message pair.
#[derive(Clone, Default)]
pub struct ToolDispatcher {
    fallback: Option<Arc<ToolHandler>>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle calls whose name is not in the catalogue.
    pub fn with_fallback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.fallback = Some(handler(f));
        self
    }

    /// Dispatch `calls` in order, returning two messages per call.
    ///
    /// Fails only for a name with no executor; executor errors are recorded
    /// in the result content.
    pub async fn dispatch(&self, catalogue: &ToolCatalogue, calls: &[ToolCall]) -> Result<Vec<Message>> {
        let mut messages = Vec::with_capacity(calls.len() * 2);
        for call in calls {
            let result = self.invoke(catalogue, call).await?;
            messages.push(Message::function_call(call));
            messages.push(Message::function_call_output(&result));
        }
        Ok(messages)
    }

    /// Run one call and serialize its outcome.
    pub async fn invoke(&self, catalogue: &ToolCatalogue, call: &ToolCall) -> Result<ToolResult> {
        let args = ToolArguments::new(call.arguments.clone());

        let outcome = match catalogue.get(&call.name) {
            Some(definition) => {
                let args = args.with_defaults(&definition.defaults);
                tracing::info!(
                    tool = %call.name,
                    id = %call.id,
                    executor = definition.executor.kind(),
                    "calling tool"
                );
                definition.executor.call(&call.name, args).await
            }
            None => match &self.fallback {
                Some(fallback) => {
                    tracing::info!(tool = %call.name, id = %call.id, "calling fallback for tool");
                    fallback(call.name.clone(), args).await
                }
                None => return Err(PalaverError::UnknownTool(call.name.clone())),
            },
        };

        if let Err(err) = &outcome {
            tracing::warn!(tool = %call.name, error = %err, "tool failed; reporting error to model");
        }
        Ok(ToolResult::new(call.id.clone(), serialize_outcome(outcome)))
    }
}

/// Text sent back to the model for a tool outcome.
///
/// Strings pass through, `null` becomes `"success"`, other values are
/// JSON-encoded and errors become `{"exception", "stack"}`.
pub fn serialize_outcome(outcome: Result<Value>) -> String {
    match outcome {
        Ok(Value::String(text)) => text,
        Ok(Value::Null) => "success".to_string(),
        Ok(value) => value.to_string(),
        Err(err) => {
            let mut stack = Vec::new();
            let mut source = err.source();
            while let Some(cause) = source {
                stack.push(cause.to_string());
                source = cause.source();
            }
            json!({"exception": err.to_string(), "stack": stack}).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolDefinition, ToolParameters};
    use crate::types::Role;
    use pretty_assertions::assert_eq;

    fn weather_catalogue() -> ToolCatalogue {
        let mut defaults = serde_json::Map::new();
        defaults.insert("unit".into(), json!("celsius"));
        ToolCatalogue::new().with(
            ToolDefinition::inline(
                "get_weather",
                "Current weather",
                ToolParameters::object().string("city", "City", true).build(),
                |args| async move {
                    let city = args.get_str("city")?;
                    let unit = args.get_str("unit")?;
                    Ok::<_, PalaverError>(json!(format!("sunny in {city} ({unit})")))
                },
            )
            .with_defaults(defaults),
        )
    }

    #[tokio::test]
    async fn one_pair_per_call_with_shared_id() {
        let call = ToolCall::new("call_1", "get_weather", json!({"city": "Paris"}));
        let messages = ToolDispatcher::new()
            .dispatch(&weather_catalogue(), &[call])
            .await
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::FunctionCall);
        assert_eq!(messages[1].role, Role::FunctionCallOutput);
        let output = messages[1].as_tool_result().unwrap();
        assert_eq!(messages[0].as_tool_call().unwrap().id, "call_1");
        assert_eq!(output.id, "call_1");
        assert_eq!(output.content, "sunny in Paris (celsius)");
    }

    #[tokio::test]
    async fn unknown_tool_without_fallback_is_fatal() {
        let call = ToolCall::new("c", "launch", json!({}));
        let err = ToolDispatcher::new()
            .dispatch(&ToolCatalogue::new(), &[call])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown executor for `launch`");
    }

    #[tokio::test]
    async fn fallback_handles_unknown_names() {
        let dispatcher = ToolDispatcher::new().with_fallback(|name, _args| async move { Ok(json!({ "handled": name })) });
        let call = ToolCall::new("c", "launch", json!({}));
        let result = dispatcher.invoke(&ToolCatalogue::new(), &call).await.unwrap();
        assert_eq!(result.content, r#"{"handled":"launch"}"#);
    }

    #[tokio::test]
    async fn executor_errors_become_content() {
        let catalogue = ToolCatalogue::new().with(ToolDefinition::inline(
            "explode",
            "Always fails",
            ToolParameters::empty(),
            |_| async { Err(PalaverError::Collaborator("boom".into())) },
        ));
        let result = ToolDispatcher::new()
            .invoke(&catalogue, &ToolCall::new("c", "explode", json!({})))
            .await
            .unwrap();
        let content: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(content["exception"], "Collaborator error: boom");
        assert!(content["stack"].is_array());
    }

    #[test]
    fn null_results_report_success() {
        assert_eq!(serialize_outcome(Ok(Value::Null)), "success");
        assert_eq!(serialize_outcome(Ok(json!(42))), "42");
    }
}
