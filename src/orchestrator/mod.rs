//! Send / dispatch / resend loop.
//!
//! One conversation moves through `Drafting -> Sent -> AwaitingToolResults
//! -> Sent -> ... -> Completed`. A reply whose last message is a tool result
//! is sent back to the backend; a reply ending in a plain assistant message
//! completes the run.

use std::sync::Arc;

use tracing::debug;

use crate::error::{PalaverError, Result};
use crate::options::RunOptions;
use crate::provider::{BackendAdapter, BackendClient, ParsedResponse, ResponseItem};
use crate::tools::{ToolCatalogue, ToolDispatcher};
use crate::types::{Conversation, Message, Role};
use crate::util::RetryPolicy;

/// Safety net for runaway tool chains.
pub const DEFAULT_MAX_TURNS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TurnState {
    Drafting,
    Sent,
    AwaitingToolResults,
    Completed,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Original messages followed by every assistant reply and tool
    /// exchange, plus a trailing continuation marker when a handle exists.
    pub messages: Vec<Message>,
    /// Messages produced by the run, without the originals.
    pub new_messages: usize,
    pub handle: Option<String>,
    pub turns: usize,
}

impl Completion {
    /// Content of the final assistant message.
    pub fn answer(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| message.text().into_owned())
    }

    /// Only the messages produced by the run.
    pub fn produced(&self) -> &[Message] {
        &self.messages[self.messages.len() - self.new_messages..]
    }
}

/// Drives one backend until it produces a final answer.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    backend: Arc<dyn BackendAdapter>,
    client: BackendClient,
    tools: ToolCatalogue,
    dispatcher: ToolDispatcher,
    retry: RetryPolicy,
    max_turns: usize,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn BackendAdapter>, client: BackendClient) -> Self {
        Self {
            backend,
            client,
            tools: ToolCatalogue::new(),
            dispatcher: ToolDispatcher::new(),
            retry: RetryPolicy::none(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_tools(mut self, tools: ToolCatalogue) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: ToolDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn tools(&self) -> &ToolCatalogue {
        &self.tools
    }

    /// Run `conversation` to completion and append what the run produced.
    pub async fn complete(&self, conversation: &mut Conversation, options: &RunOptions) -> Result<Completion> {
        let completion = self.run(conversation.messages().to_vec(), options).await?;
        conversation.extend(completion.produced().iter().cloned());
        Ok(completion)
    }

    /// Run `messages` to completion.
    ///
    /// With a continuation handle and a stateful backend only the messages
    /// after the last continuation marker are sent first, and only tool
    /// results are sent back after each tool turn. Otherwise every turn
    /// resends the originals followed by all exchanges so far.
    pub async fn run(&self, messages: Vec<Message>, options: &RunOptions) -> Result<Completion> {
        let stateful = self.backend.is_stateful();
        let mut handle = options.previous_response_id().filter(|_| stateful);
        let mut state = TurnState::Drafting;

        let mut pending = match (&handle, options.resume_after()) {
            (Some(_), Some(at)) if at < messages.len() => messages[at..].to_vec(),
            _ => messages.clone(),
        };
        let mut exchanges: Vec<Message> = Vec::new();
        let mut turns = 0usize;

        while state != TurnState::Completed {
            if turns >= self.max_turns {
                return Err(PalaverError::TurnLimitExceeded(self.max_turns));
            }
            turns += 1;

            let mut turn_options = options.clone();
            match &handle {
                Some(handle) => {
                    turn_options.set("previous_response_id", handle.clone());
                }
                None => {
                    turn_options.remove("previous_response_id");
                }
            }
            if turns > 1 {
                turn_options.remove("tool_choice");
            }

            let request = self
                .backend
                .format_request(&self.client, &pending, &self.tools, &turn_options)?;
            state = advance(state, TurnState::Sent, turns);
            let response = self
                .retry
                .execute(|| self.backend.execute(&self.client, &request))
                .await?;
            let parsed = self.backend.parse_response(&response)?;
            if stateful {
                if let Some(issued) = parsed.handle.clone() {
                    handle = Some(issued);
                }
            }

            let output = self.process(parsed).await?;
            let Some(last) = output.last() else {
                return Err(PalaverError::protocol(
                    self.backend.name(),
                    "response carried no messages",
                    Some(response.body),
                ));
            };

            if last.role == Role::FunctionCallOutput {
                state = advance(state, TurnState::AwaitingToolResults, turns);
                exchanges.extend(output.iter().cloned());
                pending = match &handle {
                    Some(_) => output
                        .into_iter()
                        .filter(|message| message.role == Role::FunctionCallOutput)
                        .collect(),
                    None => messages.iter().chain(exchanges.iter()).cloned().collect(),
                };
            } else {
                exchanges.extend(output);
                state = advance(state, TurnState::Completed, turns);
            }
        }

        if let Some(handle) = &handle {
            exchanges.push(Message::continuation(handle.clone()));
        }
        let new_messages = exchanges.len();
        let mut transcript = messages;
        transcript.extend(exchanges);
        Ok(Completion {
            messages: transcript,
            new_messages,
            handle,
            turns,
        })
    }

    /// Turn classified items into messages, dispatching tool calls in order.
    async fn process(&self, parsed: ParsedResponse) -> Result<Vec<Message>> {
        let mut out = Vec::with_capacity(parsed.items.len());
        for item in parsed.items {
            match item {
                ResponseItem::Message(message) => out.push(message),
                ResponseItem::ToolCall(call) => {
                    let pair = self
                        .dispatcher
                        .dispatch(&self.tools, std::slice::from_ref(&call))
                        .await?;
                    out.extend(pair);
                }
            }
        }
        Ok(out)
    }
}

fn advance(from: TurnState, to: TurnState, turn: usize) -> TurnState {
    debug!(turn, from = %from, to = %to, "conversation state");
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BackendKind, BackendProfile, VendorRequest, VendorResponse};
    use crate::tools::{ToolDefinition, ToolParameters};
    use crate::types::ToolCall;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Scripted {
        stateful: bool,
        replies: Mutex<VecDeque<ParsedResponse>>,
        sent: Mutex<Vec<(Vec<Message>, Option<String>)>>,
    }

    impl Scripted {
        fn new(stateful: bool, replies: Vec<ParsedResponse>) -> Arc<Self> {
            Arc::new(Self {
                stateful,
                replies: Mutex::new(replies.into()),
                sent: Mutex::default(),
            })
        }

        fn sent(&self) -> Vec<(Vec<Message>, Option<String>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BackendAdapter for Scripted {
        fn kind(&self) -> BackendKind {
            BackendKind::Responses
        }

        fn profile(&self) -> BackendProfile {
            BackendProfile {
                tag: "scripted",
                default_url: Some("http://localhost"),
                default_model: Some("scripted"),
                requires_key: false,
            }
        }

        fn is_stateful(&self) -> bool {
            self.stateful
        }

        fn format_tool_definitions(&self, catalogue: &ToolCatalogue) -> Vec<Value> {
            catalogue.schemas()
        }

        fn format_request(
            &self,
            _client: &BackendClient,
            messages: &[Message],
            _catalogue: &ToolCatalogue,
            options: &RunOptions,
        ) -> Result<VendorRequest> {
            self.sent
                .lock()
                .unwrap()
                .push((messages.to_vec(), options.previous_response_id()));
            Ok(VendorRequest {
                path: "stub".into(),
                body: Value::Null,
            })
        }

        async fn execute(&self, _client: &BackendClient, _request: &VendorRequest) -> Result<VendorResponse> {
            Ok(VendorResponse { body: Value::Null })
        }

        fn parse_response(&self, _response: &VendorResponse) -> Result<ParsedResponse> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| PalaverError::protocol("scripted", "script exhausted", None))
        }
    }

    fn tool_turn(id: &str, handle: Option<&str>) -> ParsedResponse {
        ParsedResponse {
            items: vec![ResponseItem::ToolCall(ToolCall::new(id, "add", json!({"a": 1, "b": 2})))],
            handle: handle.map(str::to_string),
        }
    }

    fn answer_turn(text: &str, handle: Option<&str>) -> ParsedResponse {
        ParsedResponse {
            items: vec![ResponseItem::Message(Message::assistant(text))],
            handle: handle.map(str::to_string),
        }
    }

    fn orchestrator(backend: Arc<Scripted>) -> Orchestrator {
        let add = ToolDefinition::inline("add", "Add numbers", ToolParameters::empty(), |args| async move {
            let a = args.get("a").and_then(Value::as_i64).unwrap_or_default();
            let b = args.get("b").and_then(Value::as_i64).unwrap_or_default();
            Ok(json!(a + b))
        });
        let client = BackendClient::new("http://localhost", "scripted", Default::default());
        Orchestrator::new(backend, client).with_tools(ToolCatalogue::new().with(add))
    }

    #[tokio::test]
    async fn stateless_backends_resend_full_history() {
        let backend = Scripted::new(false, vec![tool_turn("call_1", None), answer_turn("3", None)]);
        let original = vec![Message::user("1+2?")];

        let completion = orchestrator(backend.clone())
            .run(original.clone(), &RunOptions::new())
            .await
            .unwrap();

        let sent = backend.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, original);
        assert_eq!(sent[1].0.len(), 3);
        assert_eq!(completion.answer().as_deref(), Some("3"));
        assert_eq!(completion.handle, None);
        assert_eq!(completion.produced().len(), 3);
    }

    #[tokio::test]
    async fn stateful_backends_send_only_tool_results() {
        let backend = Scripted::new(
            true,
            vec![tool_turn("call_1", Some("resp_1")), answer_turn("3", Some("resp_2"))],
        );

        let completion = orchestrator(backend.clone())
            .run(vec![Message::user("1+2?")], &RunOptions::new())
            .await
            .unwrap();

        let sent = backend.sent();
        assert_eq!(sent[1].1.as_deref(), Some("resp_1"));
        assert_eq!(sent[1].0.len(), 1);
        assert_eq!(sent[1].0[0].role, Role::FunctionCallOutput);
        assert_eq!(sent[1].0[0].as_tool_result().unwrap().content, "3");
        assert_eq!(
            completion.messages.last(),
            Some(&Message::continuation("resp_2"))
        );
    }

    #[tokio::test]
    async fn resumed_runs_skip_history_before_the_marker() {
        let backend = Scripted::new(true, vec![answer_turn("again", Some("resp_9"))]);
        let (messages, options) = crate::options::OptionExtractor::default()
            .extract_messages(
                vec![
                    Message::user("old"),
                    Message::assistant("old answer"),
                    Message::continuation("resp_8"),
                    Message::user("new"),
                ],
                None,
            )
            .unwrap();

        orchestrator(backend.clone()).run(messages, &options).await.unwrap();
        let sent = backend.sent();
        assert_eq!(sent[0].0, vec![Message::user("new")]);
        assert_eq!(sent[0].1.as_deref(), Some("resp_8"));
    }

    #[tokio::test]
    async fn turn_cap_stops_endless_tool_chains() {
        let replies = (0..5).map(|i| tool_turn(&format!("call_{i}"), None)).collect();
        let backend = Scripted::new(false, replies);

        let err = orchestrator(backend)
            .with_max_turns(3)
            .run(vec![Message::user("loop")], &RunOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PalaverError::TurnLimitExceeded(3)));
    }
}
