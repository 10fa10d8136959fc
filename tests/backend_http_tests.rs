//! Backend adapters against a mock HTTP server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use palaver::config::PalaverConfig;
use palaver::error::PalaverError;
use palaver::tools::{ToolCatalogue, ToolDefinition, ToolParameters};
use palaver::types::{Message, Role};
use palaver::util::RetryPolicy;
use palaver::{ask, ask_messages, AskOptions};

fn weather_tool() -> ToolDefinition {
    let parameters = ToolParameters::object()
        .string("city", "City name", true)
        .build();
    ToolDefinition::inline("get_weather", "Current weather", parameters, |args| async move {
        Ok(json!(format!("Sunny in {}", args.get_str("city")?)))
    })
}

fn config_for(scope: &str, server: &MockServer, key: Option<&str>) -> PalaverConfig {
    let config = PalaverConfig::new();
    config.set("url", scope, server.uri());
    if let Some(key) = key {
        config.set("key", scope, key);
    }
    config
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn openai_chat_runs_a_tool_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("tool_call_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-2",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "It is sunny in Paris."},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4.1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = AskOptions::new()
        .with_config(config_for("openai", &server, Some("test-key")))
        .with_tools(ToolCatalogue::new().with(weather_tool()));
    let answer = ask("user: What's the weather in Paris?", options)
        .await
        .expect("run should complete");
    assert_eq!(answer, "It is sunny in Paris.");

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["tools"][0]["function"]["name"], "get_weather");
    assert_eq!(
        bodies[1]["messages"][2],
        json!({"role": "tool", "tool_call_id": "call_abc", "content": "Sunny in Paris"})
    );
    assert_eq!(
        bodies[1]["messages"][1]["tool_calls"][0]["function"]["arguments"],
        "{\"city\":\"Paris\"}"
    );
}

#[tokio::test]
async fn responses_backend_resumes_with_the_handle() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(body_partial_json(json!({"previous_response_id": "resp_1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "resp_2",
            "output": [{
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": "Sunny in Oslo."}]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "function_call", "call_id": "call_1", "name": "get_weather", "arguments": "{\"city\":\"Oslo\"}"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = AskOptions::new()
        .with_config(config_for("openai", &server, Some("test-key")))
        .with_tools(ToolCatalogue::new().with(weather_tool()));
    let transcript = ask_messages("backend: responses\n\nuser: Weather in Oslo?", options)
        .await
        .unwrap();

    assert_eq!(transcript.last(), Some(&Message::continuation("resp_2")));
    assert_eq!(transcript[transcript.len() - 2], Message::assistant("Sunny in Oslo."));

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["model"], "gpt-5-nano");
    assert!(bodies[0].get("previous_response_id").is_none());
    assert_eq!(
        bodies[1]["input"],
        json!([{"type": "function_call_output", "call_id": "call_1", "output": "Sunny in Oslo"}])
    );
}

#[tokio::test]
async fn anthropic_sends_version_headers_and_system_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hi."}],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = "
backend: anthropic

system: Be terse.

user: Hello
";
    let options = AskOptions::new().with_config(config_for("anthropic", &server, Some("test-key")));
    let answer = ask(chat, options).await.unwrap();
    assert_eq!(answer, "Hi.");

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["system"], "Be terse.");
    assert_eq!(bodies[0]["max_tokens"], 1000);
    assert_eq!(bodies[0]["messages"], json!([{"role": "user", "content": "Hello"}]));
}

#[tokio::test]
async fn ollama_needs_no_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "mistral", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "mistral",
            "message": {"role": "assistant", "content": "hey"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = AskOptions::new().with_config(config_for("ollama", &server, None));
    let answer = ask("backend: ollama\n\nuser: hi", options).await.unwrap();
    assert_eq!(answer, "hey");
}

#[tokio::test]
async fn endpoint_presets_override_backend_settings() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer work-key"))
        .and(body_partial_json(json!({"model": "work-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "from work"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = PalaverConfig::new();
    config.set("url", "openai", "http://127.0.0.1:9");
    config.set("key", "openai", "personal-key");
    config.set("url", "work", server.uri());
    config.set("key", "work", "work-key");
    config.set("model", "work", "work-model");

    let answer = ask("endpoint: work\n\nuser: hi", AskOptions::new().with_config(config))
        .await
        .unwrap();
    assert_eq!(answer, "from work");
}

#[tokio::test]
async fn missing_key_is_a_configuration_error() {
    let config = PalaverConfig::new();
    config.set("url", "openai", "http://127.0.0.1:9");
    let err = ask("user: hi", AskOptions::new().with_config(config))
        .await
        .unwrap_err();
    assert!(matches!(err, PalaverError::Configuration(message) if message.contains("OPENAI_KEY")));
}

#[tokio::test]
async fn vendor_error_payload_is_a_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"message": "model overloaded", "type": "server_error"}
        })))
        .mount(&server)
        .await;

    let options = AskOptions::new().with_config(config_for("openai", &server, Some("k")));
    let err = ask("user: hi", options).await.unwrap_err();
    match err {
        PalaverError::VendorProtocol { backend, message, payload } => {
            assert_eq!(backend, "openai");
            assert_eq!(message, "model overloaded");
            assert!(payload.is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn http_statuses_map_to_error_kinds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let options = AskOptions::new().with_config(config_for("openai", &server, Some("k")));
    let err = ask("user: hi", options).await.unwrap_err();
    assert!(matches!(err, PalaverError::Authentication(body) if body == "bad key"));
}

#[tokio::test]
async fn server_errors_are_retried_when_configured() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .expect(3)
        .mount(&server)
        .await;

    let retry = RetryPolicy::with_attempts(3).with_backoff(Duration::from_millis(1), Duration::from_millis(1));
    let options = AskOptions::new()
        .with_config(config_for("openai", &server, Some("k")))
        .with_retry(retry);
    let err = ask("user: hi", options).await.unwrap_err();
    assert!(matches!(err, PalaverError::Api { status: 500, .. }));
}

#[tokio::test]
async fn unknown_response_items_abort_the_run() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "resp_1",
            "output": [{"type": "image_generation_call", "status": "completed"}]
        })))
        .mount(&server)
        .await;

    let options = AskOptions::new().with_config(config_for("openai", &server, Some("k")));
    let err = ask_messages("backend: responses\n\nuser: draw", options)
        .await
        .unwrap_err();
    assert!(matches!(err, PalaverError::VendorProtocol { payload: Some(_), .. }));
}

#[tokio::test]
async fn inline_images_are_sent_as_data_urls() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("dot.png"), [0x89, b'P', b'N', b'G']).unwrap();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "a dot"}}]
        })))
        .mount(&server)
        .await;

    let options = AskOptions::new()
        .with_config(config_for("openai", &server, Some("k")))
        .with_origin(dir.path().join("chat.md"));
    let transcript = ask_messages("image: dot.png\n\nuser: what is this?", options)
        .await
        .unwrap();
    assert_eq!(transcript[0].role, Role::Image);

    let bodies = request_bodies(&server).await;
    let url = bodies[0]["messages"][0]["content"][0]["image_url"]["url"]
        .as_str()
        .unwrap();
    assert!(url.starts_with("data:image/png;base64,"), "unexpected url: {url}");
}
