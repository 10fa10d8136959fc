//! Backend adapters.
//!
//! Every vendor protocol sits behind [`BackendAdapter`]: the canonical
//! message list and tool catalogue go in, a vendor request comes out, and
//! the vendor reply is classified back into canonical items.

pub mod format;
pub mod http;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "openai")]
pub mod openai_responses;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "ollama")]
pub mod ollama;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::debug;

use crate::config::ConfigProvider;
use crate::error::{PalaverError, Result};
use crate::options::RunOptions;
use crate::tools::ToolCatalogue;
use crate::types::{Message, Role, ToolCall};

use self::http::{bearer_headers, shared_client, status_to_error};

/// Request timeout used when neither options nor config set one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1200);

/// The closed set of backends.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    /// Chat completions.
    OpenAi,
    /// Stateful Responses API.
    Responses,
    Anthropic,
    Ollama,
    /// OpenAI-compatible chat served by Open WebUI.
    OpenWebUi,
    /// OpenAI-compatible chat served by vLLM.
    Vllm,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Where a backend looks for its settings.
#[derive(Debug, Clone, Copy)]
pub struct BackendProfile {
    /// Config scope and environment prefix (`openai` -> `OPENAI_URL`).
    pub tag: &'static str,
    pub default_url: Option<&'static str>,
    pub default_model: Option<&'static str>,
    pub requires_key: bool,
}

impl BackendProfile {
    /// `<endpoint>`, `<tag>_ask`, `ask`, `<tag>`.
    pub fn scopes(&self, endpoint: Option<&str>) -> Vec<String> {
        let mut scopes: Vec<String> = endpoint.map(str::to_string).into_iter().collect();
        scopes.push(format!("{}_ask", self.tag));
        scopes.push("ask".to_string());
        scopes.push(self.tag.to_string());
        scopes
    }
}

/// Connection settings for one conversation.
#[derive(Debug, Clone)]
pub struct BackendClient {
    pub url: String,
    pub model: String,
    pub request_timeout: Duration,
    headers: HeaderMap,
}

impl BackendClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            headers,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Join `path` onto the base url.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// A vendor request: path relative to the client url plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorRequest {
    pub path: String,
    pub body: Value,
}

/// A decoded vendor reply.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorResponse {
    pub body: Value,
}

/// One classified item of a vendor reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseItem {
    Message(Message),
    ToolCall(ToolCall),
}

/// Classified reply plus the continuation handle, if the backend issued one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub items: Vec<ResponseItem>,
    pub handle: Option<String>,
}

impl ParsedResponse {
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.items.iter().filter_map(|item| match item {
            ResponseItem::ToolCall(call) => Some(call),
            ResponseItem::Message(_) => None,
        })
    }
}

/// Capability interface implemented by every backend.
#[async_trait]
pub trait BackendAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn profile(&self) -> BackendProfile;

    /// Whether the backend keeps server-side state addressable by a
    /// continuation handle.
    fn is_stateful(&self) -> bool {
        false
    }

    fn headers(&self, key: Option<&str>) -> HeaderMap {
        bearer_headers(key)
    }

    /// Resolve url, key, model and timeout from options, then config, then
    /// the profile defaults.
    fn build_client(&self, options: &RunOptions, config: &dyn ConfigProvider) -> Result<BackendClient> {
        let profile = self.profile();
        let scopes = profile.scopes(options.endpoint().as_deref());
        let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
        let prefix = profile.tag.to_uppercase();
        let (url_env, key_env, model_env) = (
            format!("{prefix}_URL"),
            format!("{prefix}_KEY"),
            format!("{prefix}_MODEL"),
        );

        let url = options
            .get_str("url")
            .or_else(|| config.get("url", &scopes, &[url_env.as_str()], profile.default_url))
            .ok_or_else(|| {
                PalaverError::Configuration(format!("no url configured for `{}` ({url_env})", self.name()))
            })?;
        let key = options
            .get_str("key")
            .or_else(|| config.get_url_config("key", Some(&url), &scopes, &[key_env.as_str()], None));
        if profile.requires_key && key.is_none() {
            return Err(PalaverError::Configuration(format!(
                "no key configured for `{}` ({key_env})",
                self.name()
            )));
        }
        let model = options
            .model()
            .or_else(|| {
                config.get_url_config("model", Some(&url), &scopes, &[model_env.as_str()], profile.default_model)
            })
            .ok_or_else(|| {
                PalaverError::Configuration(format!("no model configured for `{}`", self.name()))
            })?;
        let timeout = options
            .request_timeout()
            .or_else(|| {
                config
                    .get("request_timeout", &scopes, &[], None)
                    .and_then(|secs| secs.trim().parse::<f64>().ok())
                    .map(Duration::from_secs_f64)
            })
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        debug!(backend = self.name(), url = %url, model = %model, "resolved backend client");
        Ok(BackendClient::new(url, model, self.headers(key.as_deref())).with_timeout(timeout))
    }

    /// Vendor tool schemas for the catalogue.
    fn format_tool_definitions(&self, catalogue: &ToolCatalogue) -> Vec<Value>;

    fn format_request(
        &self,
        client: &BackendClient,
        messages: &[Message],
        catalogue: &ToolCatalogue,
        options: &RunOptions,
    ) -> Result<VendorRequest>;

    /// Send one request and wait for the reply. A body carrying an `error`
    /// field is a protocol error.
    async fn execute(&self, client: &BackendClient, request: &VendorRequest) -> Result<VendorResponse> {
        let url = client.endpoint(&request.path);
        debug!(backend = self.name(), url = %url, model = %client.model, "sending request");

        let timeout_ms = client.request_timeout.as_millis() as u64;
        let resp = shared_client()
            .post(&url)
            .headers(client.headers().clone())
            .timeout(client.request_timeout)
            .json(&request.body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    PalaverError::Timeout(timeout_ms)
                } else {
                    err.into()
                }
            })?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let body: Value = resp.json().await?;
        if let Some(error) = body.get("error").filter(|error| !error.is_null()) {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(PalaverError::protocol(self.name(), message, Some(body.clone())));
        }
        debug!(backend = self.name(), "received response");
        Ok(VendorResponse { body })
    }

    /// Classify reply items; unknown item kinds are protocol errors.
    fn parse_response(&self, response: &VendorResponse) -> Result<ParsedResponse>;
}

/// Adapter for `kind`; fails if its feature is disabled.
pub fn create_backend(kind: BackendKind) -> Result<Arc<dyn BackendAdapter>> {
    match kind {
        #[cfg(feature = "openai")]
        BackendKind::OpenAi => Ok(Arc::new(openai::OpenAiChat::openai())),
        #[cfg(feature = "openai")]
        BackendKind::OpenWebUi => Ok(Arc::new(openai::OpenAiChat::openwebui())),
        #[cfg(feature = "openai")]
        BackendKind::Vllm => Ok(Arc::new(openai::OpenAiChat::vllm())),
        #[cfg(feature = "openai")]
        BackendKind::Responses => Ok(Arc::new(openai_responses::OpenAiResponses)),
        #[cfg(feature = "anthropic")]
        BackendKind::Anthropic => Ok(Arc::new(anthropic::AnthropicMessages)),
        #[cfg(feature = "ollama")]
        BackendKind::Ollama => Ok(Arc::new(ollama::OllamaChat)),
        #[allow(unreachable_patterns)]
        other => Err(PalaverError::Configuration(format!(
            "backend `{other}` not enabled via feature flags"
        ))),
    }
}

/// `backend` option, then `backend` config (`ASK_BACKEND`, `LLM_BACKEND`),
/// then `openai`.
pub fn select_backend(options: &RunOptions, config: &dyn ConfigProvider) -> Result<BackendKind> {
    let endpoint = options.endpoint();
    let mut scopes: Vec<&str> = endpoint.as_deref().into_iter().collect();
    scopes.push("ask");

    let name = options
        .backend()
        .or_else(|| config.get("backend", &scopes, &["ASK_BACKEND", "LLM_BACKEND"], None))
        .unwrap_or_else(|| BackendKind::OpenAi.to_string());
    name.trim()
        .parse()
        .map_err(|_| PalaverError::Configuration(format!("unknown backend `{name}`")))
}

/// Vendor role for plain conversational messages. Unrecognised roles are
/// sent as user content.
pub(crate) fn chat_role(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::Assistant => "assistant",
        _ => "user",
    }
}

/// Error for a reply item of a kind the backend does not understand.
pub(crate) fn unexpected_item(backend: &str, kind: &str, item: &Value) -> PalaverError {
    PalaverError::protocol(
        backend,
        format!("unexpected response item `{kind}`"),
        Some(item.clone()),
    )
}

/// Copy options that are not consumed by palaver into the request body.
pub(crate) fn merge_parameters(body: &mut Value, options: &RunOptions) {
    if let Some(obj) = body.as_object_mut() {
        for (key, value) in options.vendor_parameters() {
            obj.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PalaverConfig;

    #[test]
    fn backend_names_parse() {
        assert_eq!("openai".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert_eq!("Responses".parse::<BackendKind>().unwrap(), BackendKind::Responses);
        assert_eq!(BackendKind::Anthropic.to_string(), "anthropic");
        assert_eq!("openwebui".parse::<BackendKind>().unwrap(), BackendKind::OpenWebUi);
        assert_eq!("vLLM".parse::<BackendKind>().unwrap(), BackendKind::Vllm);
        assert_eq!(BackendKind::OpenWebUi.as_str(), "openwebui");
        assert!("bedrock".parse::<BackendKind>().is_err());
    }

    #[test]
    fn backend_selection_prefers_option_then_config() {
        let config = PalaverConfig::new();
        assert_eq!(select_backend(&RunOptions::new(), &config).unwrap(), BackendKind::OpenAi);

        config.set("backend", "ask", "ollama");
        assert_eq!(select_backend(&RunOptions::new(), &config).unwrap(), BackendKind::Ollama);

        let options = RunOptions::new().with("backend", "anthropic");
        assert_eq!(select_backend(&options, &config).unwrap(), BackendKind::Anthropic);

        let options = RunOptions::new().with("backend", "nope");
        assert!(matches!(
            select_backend(&options, &config),
            Err(PalaverError::Configuration(_))
        ));
    }

    #[test]
    fn endpoint_scope_wins_for_backend() {
        let config = PalaverConfig::new();
        config.set("backend", "ask", "openai");
        config.set("backend", "local", "ollama");
        let options = RunOptions::new().with("endpoint", "local");
        assert_eq!(select_backend(&options, &config).unwrap(), BackendKind::Ollama);
    }

    #[test]
    fn profile_scopes_put_endpoint_first() {
        let profile = BackendProfile {
            tag: "openai",
            default_url: None,
            default_model: Some("m"),
            requires_key: false,
        };
        assert_eq!(
            profile.scopes(Some("work")),
            vec!["work", "openai_ask", "ask", "openai"]
        );
    }
}
