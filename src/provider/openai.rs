//! OpenAI Chat Completions backend.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{PalaverError, Result};
use crate::options::RunOptions;
use crate::tools::ToolCatalogue;
use crate::types::{Message, Role, ToolCall};

use super::format::{MediaSource, ResponseFormat};
use super::{
    chat_role, merge_parameters, BackendAdapter, BackendClient, BackendKind, BackendProfile,
    ParsedResponse, ResponseItem, VendorRequest, VendorResponse,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1";
const OPENWEBUI_BASE_URL: &str = "http://localhost:3000/api";
const VLLM_MODEL: &str = "vllm";

/// Tool calls nested under the assistant message with JSON-string
/// arguments; results echo `tool_call_id`.
///
/// OpenAI-compatible servers (`openwebui`, `vllm`) speak the same protocol
/// and differ only in where their settings live.
#[derive(Debug, Clone, Copy)]
pub struct OpenAiChat {
    kind: BackendKind,
}

impl Default for OpenAiChat {
    fn default() -> Self {
        Self::openai()
    }
}

impl OpenAiChat {
    pub fn openai() -> Self {
        Self { kind: BackendKind::OpenAi }
    }

    pub fn openwebui() -> Self {
        Self { kind: BackendKind::OpenWebUi }
    }

    pub fn vllm() -> Self {
        Self { kind: BackendKind::Vllm }
    }

    fn message_to_openai(&self, message: &Message) -> Result<Option<Value>> {
        let value = match &message.role {
            Role::FunctionCall => {
                let call = message.as_tool_call()?;
                json!({
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    }],
                })
            }
            Role::FunctionCallOutput => {
                let result = message.as_tool_result()?;
                json!({
                    "role": "tool",
                    "tool_call_id": result.id,
                    "content": result.content,
                })
            }
            Role::Image => {
                let media = MediaSource::load(&message.text())?;
                json!({
                    "role": "user",
                    "content": [{"type": "image_url", "image_url": {"url": media.url()}}],
                })
            }
            Role::Pdf => {
                let media = MediaSource::load(&message.text())?;
                match &media {
                    MediaSource::Inline { filename, .. } => json!({
                        "role": "user",
                        "content": [{
                            "type": "file",
                            "file": {"filename": filename, "file_data": media.url()},
                        }],
                    }),
                    MediaSource::Remote(url) => {
                        warn!(url = %url, "chat completions cannot fetch remote PDFs, dropping");
                        return Ok(None);
                    }
                }
            }
            Role::Websearch => {
                warn!("chat completions has no web search tool, try the `responses` backend");
                return Ok(None);
            }
            Role::PreviousResponseId => return Ok(None),
            role if role.is_tool_directive() => return Ok(None),
            role => json!({
                "role": chat_role(role),
                "content": message.text(),
            }),
        };
        Ok(Some(value))
    }

    fn parse_tool_calls(calls: &[Value]) -> Result<Vec<ResponseItem>> {
        calls
            .iter()
            .map(|call| ToolCall::from_value(call).map(ResponseItem::ToolCall))
            .collect()
    }
}

impl BackendAdapter for OpenAiChat {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn profile(&self) -> BackendProfile {
        match self.kind {
            BackendKind::OpenWebUi => BackendProfile {
                tag: "openwebui",
                default_url: Some(OPENWEBUI_BASE_URL),
                default_model: None,
                requires_key: true,
            },
            BackendKind::Vllm => BackendProfile {
                tag: "vllm",
                default_url: None,
                default_model: Some(VLLM_MODEL),
                requires_key: false,
            },
            _ => BackendProfile {
                tag: "openai",
                default_url: Some(DEFAULT_BASE_URL),
                default_model: Some(DEFAULT_MODEL),
                requires_key: true,
            },
        }
    }

    fn format_tool_definitions(&self, catalogue: &ToolCatalogue) -> Vec<Value> {
        catalogue
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters.schema,
                    }
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
        let mut formatted = Vec::with_capacity(messages.len());
        for message in messages {
            if let Some(value) = self.message_to_openai(message)? {
                formatted.push(value);
            }
        }

        let mut body = json!({
            "model": client.model,
            "messages": formatted,
        });
        if let Some(obj) = body.as_object_mut() {
            if !catalogue.is_empty() {
                obj.insert("tools".into(), self.format_tool_definitions(catalogue).into());
            }
            if let Some(format) = options.format() {
                obj.insert(
                    "response_format".into(),
                    ResponseFormat::from_option(format).to_chat(),
                );
            }
        }
        merge_parameters(&mut body, options);

        debug!(model = %client.model, messages = messages.len(), tools = catalogue.len(), "formatted chat request");
        Ok(VendorRequest {
            path: "chat/completions".into(),
            body,
        })
    }

    fn parse_response(&self, response: &VendorResponse) -> Result<ParsedResponse> {
        let choice = response
            .body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .ok_or_else(|| {
                PalaverError::protocol(self.name(), "no choices in response", Some(response.body.clone()))
            })?;
        let message = choice.get("message").unwrap_or(&Value::Null);

        let mut items = Vec::new();
        if let Some(text) = message.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                items.push(ResponseItem::Message(Message::assistant(text)));
            }
        }

        let tool_calls = choice
            .get("tool_calls")
            .or_else(|| message.get("tool_calls"))
            .and_then(Value::as_array);
        match tool_calls {
            Some(calls) if !calls.is_empty() => items.extend(Self::parse_tool_calls(calls)?),
            _ if items.is_empty() => {
                if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
                    items.push(ResponseItem::Message(Message::assistant(refusal)));
                } else {
                    return Err(PalaverError::protocol(
                        self.name(),
                        "choice carries neither content nor tool calls",
                        Some(response.body.clone()),
                    ));
                }
            }
            _ => {}
        }

        Ok(ParsedResponse {
            items,
            handle: None,
        })
    }
}
