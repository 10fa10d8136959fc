//! Anthropic Messages API backend.

use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{PalaverError, Result};
use crate::options::RunOptions;
use crate::tools::ToolCatalogue;
use crate::types::{Message, Role, ToolCall};

use super::format::MediaSource;
use super::http::anthropic_headers;
use super::{
    unexpected_item, BackendAdapter, BackendClient, BackendKind, BackendProfile, ParsedResponse,
    ResponseItem, VendorRequest, VendorResponse,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u64 = 1000;

/// Tool calls are `tool_use` content blocks; results are `tool_result`
/// blocks in a user turn echoing the `tool_use_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicMessages;

impl AnthropicMessages {
    /// System prompt, conversation turns and whether web search was requested.
    fn build_messages(messages: &[Message]) -> Result<(Vec<String>, Vec<Value>, bool)> {
        let mut system_parts = Vec::new();
        let mut turns = Vec::with_capacity(messages.len());
        let mut websearch = false;

        for msg in messages {
            match &msg.role {
                Role::System => system_parts.push(msg.text().into_owned()),
                Role::Assistant => {
                    let text = msg.text();
                    if !text.is_empty() {
                        turns.push(json!({"role": "assistant", "content": text}));
                    }
                }
                Role::FunctionCall => {
                    let call = msg.as_tool_call()?;
                    turns.push(json!({
                        "role": "assistant",
                        "content": [{
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }],
                    }));
                }
                Role::FunctionCallOutput => {
                    let result = msg.as_tool_result()?;
                    turns.push(json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": result.id,
                            "content": result.content,
                        }],
                    }));
                }
                Role::Image => {
                    let source = match MediaSource::load(&msg.text())? {
                        MediaSource::Remote(url) => json!({"type": "url", "url": url}),
                        MediaSource::Inline { mime, data, .. } => {
                            json!({"type": "base64", "media_type": mime, "data": data})
                        }
                    };
                    turns.push(json!({
                        "role": "user",
                        "content": [{"type": "image", "source": source}],
                    }));
                }
                Role::Pdf => {
                    let source = match MediaSource::load(&msg.text())? {
                        MediaSource::Remote(url) => json!({"type": "url", "url": url}),
                        MediaSource::Inline { data, .. } => json!({
                            "type": "base64",
                            "media_type": "application/pdf",
                            "data": data,
                        }),
                    };
                    turns.push(json!({
                        "role": "user",
                        "content": [{"type": "document", "source": source}],
                    }));
                }
                Role::Websearch => websearch = true,
                Role::PreviousResponseId => {}
                role if role.is_tool_directive() => {}
                _ => turns.push(json!({"role": "user", "content": msg.text()})),
            }
        }
        Ok((system_parts, turns, websearch))
    }
}

impl BackendAdapter for AnthropicMessages {
    fn kind(&self) -> BackendKind {
        BackendKind::Anthropic
    }

    fn profile(&self) -> BackendProfile {
        BackendProfile {
            tag: "anthropic",
            default_url: Some(DEFAULT_BASE_URL),
            default_model: Some(DEFAULT_MODEL),
            requires_key: true,
        }
    }

    fn headers(&self, key: Option<&str>) -> HeaderMap {
        anthropic_headers(key.unwrap_or_default(), API_VERSION)
    }

    fn format_tool_definitions(&self, catalogue: &ToolCatalogue) -> Vec<Value> {
        catalogue
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters.schema,
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
        let (system_parts, turns, websearch) = Self::build_messages(messages)?;

        let mut tools = self.format_tool_definitions(catalogue);
        if websearch || options.flag("websearch") {
            tools.push(json!({"type": "web_search_20250305", "name": "web_search"}));
        }

        let mut body = json!({
            "model": client.model,
            "messages": turns,
            "max_tokens": DEFAULT_MAX_TOKENS,
        });
        let obj = body.as_object_mut().ok_or_else(|| {
            PalaverError::protocol(self.name(), "request body is not an object", None)
        })?;
        if !system_parts.is_empty() {
            obj.insert("system".into(), system_parts.join("\n\n").into());
        }
        if !tools.is_empty() {
            obj.insert("tools".into(), tools.into());
        }
        if options.format().is_some() {
            warn!("anthropic has no response format parameter, ignoring `format`");
        }
        for (key, value) in options.vendor_parameters() {
            obj.insert(key.clone(), value.clone());
        }

        debug!(model = %client.model, turns = messages.len(), tools = catalogue.len(), "formatted messages request");
        Ok(VendorRequest {
            path: "messages".into(),
            body,
        })
    }

    fn parse_response(&self, response: &VendorResponse) -> Result<ParsedResponse> {
        let content = response
            .body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                PalaverError::protocol(self.name(), "response has no content", Some(response.body.clone()))
            })?;

        let mut items = Vec::with_capacity(content.len());
        for block in content {
            let kind = block.get("type").and_then(Value::as_str).unwrap_or("");
            match kind {
                "text" => {
                    let text = block.get("text").and_then(Value::as_str).unwrap_or("");
                    items.push(ResponseItem::Message(Message::assistant(text)));
                }
                "tool_use" => {
                    let id = block
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(ToolCall::synthesize_id);
                    let name = block.get("name").and_then(Value::as_str).ok_or_else(|| {
                        PalaverError::protocol(self.name(), "tool_use without a name", Some(block.clone()))
                    })?;
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    items.push(ResponseItem::ToolCall(ToolCall::new(id, name, input)));
                }
                "thinking" | "redacted_thinking" | "reasoning" => {}
                "server_tool_use" | "web_search_tool_result" | "web_search_call" => {}
                other => return Err(unexpected_item(self.name(), other, block)),
            }
        }

        Ok(ParsedResponse {
            items,
            handle: None,
        })
    }
}
