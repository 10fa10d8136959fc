//! Shared test helpers: a scripted backend and in-memory collaborators.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use palaver::error::{PalaverError, Result};
use palaver::options::RunOptions;
use palaver::provider::{
    BackendAdapter, BackendClient, BackendKind, BackendProfile, ParsedResponse, ResponseItem,
    VendorRequest, VendorResponse,
};
use palaver::tools::{
    Job, RemoteEndpoint, RemoteTool, RemoteToolClient, RemoteToolConnector, TaskInfo, TaskInput,
    ToolArguments, ToolCatalogue, ToolParameters, Workflow, WorkflowEngine,
};
use palaver::types::{Message, ToolCall};

/// What the backend saw on one turn.
#[derive(Debug, Clone)]
pub struct SentTurn {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub previous_response_id: Option<String>,
    pub options: RunOptions,
}

/// A backend that replays canned replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    stateful: bool,
    replies: Mutex<VecDeque<ParsedResponse>>,
    sent: Mutex<Vec<SentTurn>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<ParsedResponse>) -> Arc<Self> {
        Arc::new(Self {
            stateful: false,
            replies: Mutex::new(replies.into()),
            sent: Mutex::default(),
        })
    }

    pub fn stateful(replies: Vec<ParsedResponse>) -> Arc<Self> {
        Arc::new(Self {
            stateful: true,
            replies: Mutex::new(replies.into()),
            sent: Mutex::default(),
        })
    }

    pub fn sent(&self) -> Vec<SentTurn> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl BackendAdapter for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        if self.stateful {
            BackendKind::Responses
        } else {
            BackendKind::OpenAi
        }
    }

    fn profile(&self) -> BackendProfile {
        BackendProfile {
            tag: "scripted",
            default_url: Some("http://localhost"),
            default_model: Some("scripted-model"),
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
        catalogue: &ToolCatalogue,
        options: &RunOptions,
    ) -> Result<VendorRequest> {
        self.sent.lock().unwrap().push(SentTurn {
            messages: messages.to_vec(),
            tools: catalogue.names().into_iter().map(str::to_string).collect(),
            previous_response_id: options.previous_response_id(),
            options: options.clone(),
        });
        Ok(VendorRequest {
            path: "scripted".into(),
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

pub fn tool_reply(id: &str, name: &str, arguments: Value) -> ParsedResponse {
    ParsedResponse {
        items: vec![ResponseItem::ToolCall(ToolCall::new(id, name, arguments))],
        handle: None,
    }
}

pub fn text_reply(text: &str) -> ParsedResponse {
    ParsedResponse {
        items: vec![ResponseItem::Message(Message::assistant(text))],
        handle: None,
    }
}

pub fn with_handle(mut reply: ParsedResponse, handle: &str) -> ParsedResponse {
    reply.handle = Some(handle.to_string());
    reply
}

/// A job that adds its `a` and `b` inputs.
#[derive(Debug)]
pub struct AddJob {
    path: String,
    inputs: Map<String, Value>,
    done: AtomicBool,
}

impl AddJob {
    fn sum(&self) -> Result<f64> {
        let number = |key: &str| -> Result<f64> {
            let value = self
                .inputs
                .get(key)
                .ok_or_else(|| PalaverError::Collaborator(format!("missing input `{key}`")))?;
            match value {
                Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| PalaverError::Collaborator(format!("bad number `{key}`"))),
                Value::String(s) => s
                    .parse()
                    .map_err(|_| PalaverError::Collaborator(format!("not a number: {s}"))),
                _ => Err(PalaverError::Collaborator(format!("bad input `{key}`"))),
            }
        };
        Ok(number("a")? + number("b")?)
    }
}

#[async_trait]
impl Job for AddJob {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn task_name(&self) -> String {
        "add".into()
    }

    fn inputs(&self) -> Value {
        Value::Object(self.inputs.clone())
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn error(&self) -> Option<String> {
        None
    }

    async fn exec(&self) -> Result<Value> {
        Ok(json!(self.sum()?))
    }

    async fn run(&self) -> Result<Value> {
        let sum = self.sum()?;
        self.done.store(true, Ordering::SeqCst);
        Ok(json!(sum))
    }

    async fn fork(&self) -> Result<()> {
        self.done.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn join(&self) -> Result<()> {
        Ok(())
    }

    async fn output(&self) -> Result<String> {
        Ok(self.sum()?.to_string())
    }
}

/// `Calc` workflow with a single exported `add` task.
#[derive(Debug, Default)]
pub struct CalcWorkflow {
    jobs: Arc<Mutex<HashMap<String, Arc<AddJob>>>>,
}

impl Workflow for CalcWorkflow {
    fn name(&self) -> &str {
        "Calc"
    }

    fn task_info(&self, task: &str) -> Result<TaskInfo> {
        if task != "add" {
            return Err(PalaverError::not_found("Task", task));
        }
        Ok(TaskInfo {
            name: "add".into(),
            description: "Add two numbers".into(),
            inputs: vec![
                TaskInput::new("a", "float").describe("First addend").required(),
                TaskInput::new("b", "float").describe("Second addend").required(),
            ],
        })
    }

    fn exported_tasks(&self) -> Vec<String> {
        vec!["add".into()]
    }

    fn all_tasks(&self) -> Vec<String> {
        vec!["add".into()]
    }

    fn job(&self, task: &str, name: Option<&str>, inputs: Map<String, Value>) -> Result<Arc<dyn Job>> {
        self.task_info(task)?;
        let path = format!("jobs/Calc/{task}/{}", name.unwrap_or("Default"));
        let job = Arc::new(AddJob {
            path: path.clone(),
            inputs,
            done: AtomicBool::new(false),
        });
        self.jobs.lock().unwrap().insert(path, job.clone());
        Ok(job)
    }
}

/// Engine serving [`CalcWorkflow`] and the jobs it created.
#[derive(Debug, Default)]
pub struct CalcEngine {
    workflow: Arc<CalcWorkflow>,
}

impl CalcEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl WorkflowEngine for CalcEngine {
    async fn workflow(&self, name: &str) -> Result<Arc<dyn Workflow>> {
        if name == "Calc" {
            Ok(self.workflow.clone())
        } else {
            Err(PalaverError::not_found("Workflow", name))
        }
    }

    async fn load_job(&self, path: &str) -> Result<Arc<dyn Job>> {
        let job = self.workflow.jobs.lock().unwrap().get(path).cloned();
        match job {
            Some(job) => Ok(job),
            None => Err(PalaverError::not_found("Job", path)),
        }
    }
}

/// Remote server offering `echo` and `shout`.
#[derive(Debug, Default)]
pub struct EchoServer {
    pub connected: Mutex<Vec<RemoteEndpoint>>,
}

#[derive(Debug)]
struct EchoClient;

#[async_trait]
impl RemoteToolClient for EchoClient {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        let text = ToolParameters::object().string("text", "Text", true).build();
        Ok(vec![
            RemoteTool {
                name: "echo".into(),
                description: "Echo text".into(),
                parameters: text.clone(),
            },
            RemoteTool {
                name: "shout".into(),
                description: "Echo text loudly".into(),
                parameters: text,
            },
        ])
    }

    async fn call_tool(&self, name: &str, params: &ToolArguments) -> Result<Value> {
        let text = params.get_str("text")?;
        let text = if name == "shout" { text.to_uppercase() } else { text.to_string() };
        Ok(json!({"content": [{"type": "text", "text": text}]}))
    }
}

#[async_trait]
impl RemoteToolConnector for EchoServer {
    async fn connect(&self, endpoint: &RemoteEndpoint) -> Result<Arc<dyn RemoteToolClient>> {
        self.connected.lock().unwrap().push(endpoint.clone());
        Ok(Arc::new(EchoClient))
    }
}
