//! OpenAI Responses API backend.
//!
//! Stateful: every reply carries an id that later requests pass as
//! `previous_response_id` so the server resumes its own context.

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{PalaverError, Result};
use crate::options::RunOptions;
use crate::tools::ToolCatalogue;
use crate::types::{Message, Role, ToolCall};

use super::format::{MediaSource, ResponseFormat};
use super::{
    chat_role, merge_parameters, unexpected_item, BackendAdapter, BackendClient, BackendKind,
    BackendProfile, ParsedResponse, ResponseItem, VendorRequest, VendorResponse,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-5-nano";

/// Tool calls and their results are top-level typed input/output items.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponses;

impl OpenAiResponses {
    /// Input items for `messages`, plus whether web search was requested.
    fn build_input_items(messages: &[Message]) -> Result<(Vec<Value>, bool)> {
        let mut items = Vec::with_capacity(messages.len());
        let mut websearch = false;

        for message in messages {
            match &message.role {
                Role::FunctionCall => {
                    let call = message.as_tool_call()?;
                    items.push(json!({
                        "type": "function_call",
                        "status": "completed",
                        "call_id": call.id,
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }));
                }
                Role::FunctionCallOutput => {
                    let result = message.as_tool_result()?;
                    items.push(json!({
                        "type": "function_call_output",
                        "call_id": result.id,
                        "output": result.content,
                    }));
                }
                Role::Image => {
                    let media = MediaSource::load(&message.text())?;
                    items.push(json!({
                        "role": "user",
                        "content": [{"type": "input_image", "image_url": media.url()}],
                    }));
                }
                Role::Pdf => {
                    let media = MediaSource::load(&message.text())?;
                    let part = match &media {
                        MediaSource::Remote(url) => json!({"type": "input_file", "file_url": url}),
                        MediaSource::Inline { filename, .. } => json!({
                            "type": "input_file",
                            "file_data": media.url(),
                            "filename": filename,
                        }),
                    };
                    items.push(json!({"role": "user", "content": [part]}));
                }
                Role::Websearch => websearch = true,
                Role::PreviousResponseId => {}
                role if role.is_tool_directive() => {}
                role => items.push(json!({
                    "role": chat_role(role),
                    "content": message.text(),
                })),
            }
        }
        Ok((items, websearch))
    }

    fn parse_output_item(&self, item: &Value, items: &mut Vec<ResponseItem>) -> Result<()> {
        let kind = item.get("type").and_then(Value::as_str).unwrap_or("");
        match kind {
            "message" => {
                let parts = item.get("content").and_then(Value::as_array);
                for part in parts.into_iter().flatten() {
                    match part.get("type").and_then(Value::as_str) {
                        Some("output_text") => {
                            let text = part.get("text").and_then(Value::as_str).unwrap_or("");
                            items.push(ResponseItem::Message(Message::assistant(text)));
                        }
                        Some("refusal") => {
                            let text = part.get("refusal").and_then(Value::as_str).unwrap_or("");
                            items.push(ResponseItem::Message(Message::assistant(text)));
                        }
                        _ => {}
                    }
                }
            }
            "function_call" => items.push(ResponseItem::ToolCall(ToolCall::from_value(item)?)),
            "reasoning" | "web_search_call" => {}
            other => return Err(unexpected_item(self.name(), other, item)),
        }
        Ok(())
    }
}

impl BackendAdapter for OpenAiResponses {
    fn kind(&self) -> BackendKind {
        BackendKind::Responses
    }

    fn profile(&self) -> BackendProfile {
        BackendProfile {
            tag: "openai",
            default_url: Some(DEFAULT_BASE_URL),
            default_model: Some(DEFAULT_MODEL),
            requires_key: true,
        }
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn format_tool_definitions(&self, catalogue: &ToolCatalogue) -> Vec<Value> {
        catalogue
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters.schema,
                })
            })
            .collect()
    }

    fn format_request(
        &self,
        client: &BackendClient,
        messages: &[Message],
        catalogue: &ToolCatalogue,
        options: &RunOptions,
    ) -> Result<VendorRequest> {
        let (input, websearch) = Self::build_input_items(messages)?;

        let mut tools = self.format_tool_definitions(catalogue);
        if websearch || options.flag("websearch") {
            tools.push(json!({"type": "web_search_preview"}));
        }

        let mut body = json!({
            "model": client.model,
            "input": input,
        });
        if let Some(obj) = body.as_object_mut() {
            if !tools.is_empty() {
                obj.insert("tools".into(), tools.into());
            }
            if let Some(handle) = options.previous_response_id() {
                obj.insert("previous_response_id".into(), handle.into());
            }
            if let Some(format) = options.format() {
                obj.insert(
                    "text".into(),
                    json!({"format": ResponseFormat::from_option(format).to_responses()}),
                );
            }
        }
        merge_parameters(&mut body, options);

        debug!(
            model = %client.model,
            items = messages.len(),
            resumed = options.previous_response_id().is_some(),
            "formatted responses request"
        );
        Ok(VendorRequest {
            path: "responses".into(),
            body,
        })
    }

    fn parse_response(&self, response: &VendorResponse) -> Result<ParsedResponse> {
        let output = response
            .body
            .get("output")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                PalaverError::protocol(self.name(), "response has no output", Some(response.body.clone()))
            })?;

        let mut items = Vec::with_capacity(output.len());
        for item in output {
            self.parse_output_item(item, &mut items)?;
        }

        Ok(ParsedResponse {
            items,
            handle: response
                .body
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}
