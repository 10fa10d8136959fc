//! Ollama local backend (native `/api/chat`).

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{PalaverError, Result};
use crate::options::RunOptions;
use crate::tools::ToolCatalogue;
use crate::types::{Message, Role, ToolCall};

use super::format::{MediaSource, ResponseFormat};
use super::{
    chat_role, BackendAdapter, BackendClient, BackendKind, BackendProfile, ParsedResponse,
    ResponseItem, VendorRequest, VendorResponse,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "mistral";

/// Tool calls carry no ids, so ids are synthesized; results are matched
/// back to the call by tool name.
#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaChat;

impl OllamaChat {
    fn build_messages(messages: &[Message]) -> Result<Vec<Value>> {
        let mut call_names: HashMap<String, String> = HashMap::new();
        let mut out = Vec::with_capacity(messages.len());

        for message in messages {
            match &message.role {
                Role::FunctionCall => {
                    let call = message.as_tool_call()?;
                    out.push(json!({
                        "role": "assistant",
                        "content": "",
                        "tool_calls": [{
                            "function": {"name": call.name, "arguments": call.arguments},
                        }],
                    }));
                    call_names.insert(call.id, call.name);
                }
                Role::FunctionCallOutput => {
                    let result = message.as_tool_result()?;
                    let mut entry = json!({"role": "tool", "content": result.content});
                    if let Some(name) = call_names.get(&result.id) {
                        entry["tool_name"] = json!(name);
                    }
                    out.push(entry);
                }
                Role::Image => match MediaSource::load(&message.text())? {
                    MediaSource::Inline { data, .. } => {
                        out.push(json!({"role": "user", "content": "", "images": [data]}));
                    }
                    MediaSource::Remote(url) => {
                        warn!(url = %url, "ollama cannot fetch remote images, dropping");
                    }
                },
                Role::Pdf | Role::Websearch => {
                    warn!(role = %message.role, "ollama does not support this input, dropping");
                }
                Role::PreviousResponseId => {}
                role if role.is_tool_directive() => {}
                role => out.push(json!({
                    "role": chat_role(role),
                    "content": message.text(),
                })),
            }
        }
        Ok(out)
    }
}

impl BackendAdapter for OllamaChat {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    fn profile(&self) -> BackendProfile {
        BackendProfile {
            tag: "ollama",
            default_url: Some(DEFAULT_BASE_URL),
            default_model: Some(DEFAULT_MODEL),
            requires_key: false,
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
        let mut body = json!({
            "model": client.model,
            "messages": Self::build_messages(messages)?,
            "stream": false,
        });
        let obj = body.as_object_mut().ok_or_else(|| {
            PalaverError::protocol(self.name(), "request body is not an object", None)
        })?;
        if !catalogue.is_empty() {
            obj.insert("tools".into(), self.format_tool_definitions(catalogue).into());
        }
        if let Some(format) = options.format() {
            let format = match ResponseFormat::from_option(format) {
                ResponseFormat::JsonObject => json!("json"),
                ResponseFormat::Named(kind) => json!(kind),
                ResponseFormat::JsonSchema { schema, .. } => schema,
                ResponseFormat::Raw(value) => value,
            };
            obj.insert("format".into(), format);
        }
        let parameters: Map<String, Value> = options
            .vendor_parameters()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if !parameters.is_empty() {
            obj.insert("options".into(), Value::Object(parameters));
        }

        debug!(model = %client.model, messages = messages.len(), tools = catalogue.len(), "formatted ollama request");
        Ok(VendorRequest {
            path: "api/chat".into(),
            body,
        })
    }

    fn parse_response(&self, response: &VendorResponse) -> Result<ParsedResponse> {
        let message = response.body.get("message").ok_or_else(|| {
            PalaverError::protocol(self.name(), "response has no message", Some(response.body.clone()))
        })?;

        let mut items = Vec::new();
        let calls = response
            .body
            .get("tool_calls")
            .or_else(|| message.get("tool_calls"))
            .and_then(Value::as_array)
            .filter(|calls| !calls.is_empty());
        match calls {
            Some(calls) => {
                for call in calls {
                    items.push(ResponseItem::ToolCall(ToolCall::from_value(call)?));
                }
            }
            None => {
                let text = message.get("content").and_then(Value::as_str).unwrap_or("");
                items.push(ResponseItem::Message(Message::assistant(text)));
            }
        }

        Ok(ParsedResponse {
            items,
            handle: None,
        })
    }
}
