//! Workflow engine interface and task-backed tools.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::arguments::ToolArguments;
use super::definition::{ToolDefinition, ToolExecutor};
use super::types::ToolParameters;
use crate::error::{PalaverError, Result};

/// One declared input of a workflow task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskInput {
    pub name: String,
    /// Engine type name (`string`, `text`, `select`, `float`, `file_array`...).
    pub input_type: String,
    pub description: Option<String>,
    pub required: bool,
    pub select_options: Vec<String>,
}

impl TaskInput {
    pub fn new(name: impl Into<String>, input_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_type: input_type.into(),
            ..Self::default()
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.select_options = options.iter().map(|o| o.to_string()).collect();
        self
    }
}

/// Metadata describing a workflow task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskInfo {
    pub name: String,
    pub description: String,
    pub inputs: Vec<TaskInput>,
}

/// A unit of work created by a workflow.
#[async_trait]
pub trait Job: Send + Sync + fmt::Debug {
    /// Stable identity; also where the engine keeps the result.
    fn path(&self) -> String;
    fn task_name(&self) -> String;
    /// Inputs the job was created with.
    fn inputs(&self) -> Value;
    fn is_done(&self) -> bool;
    fn error(&self) -> Option<String>;

    /// Execute in the calling task and return the result.
    async fn exec(&self) -> Result<Value>;
    /// Run to completion through the engine and return the result.
    async fn run(&self) -> Result<Value>;
    /// Start without waiting.
    async fn fork(&self) -> Result<()>;
    /// Wait until the job is done or failed.
    async fn join(&self) -> Result<()>;
    /// Result of a finished job, as text.
    async fn output(&self) -> Result<String>;
}

/// A named collection of tasks.
pub trait Workflow: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn task_info(&self, task: &str) -> Result<TaskInfo>;
    fn exported_tasks(&self) -> Vec<String>;
    fn all_tasks(&self) -> Vec<String>;
    /// Tasks cheap enough to `exec` in place instead of `run`.
    fn exec_exports(&self) -> Vec<String> {
        Vec::new()
    }
    fn job(&self, task: &str, name: Option<&str>, inputs: Map<String, Value>)
        -> Result<Arc<dyn Job>>;
}

/// Resolves workflows and previously created jobs.
#[async_trait]
pub trait WorkflowEngine: Send + Sync + fmt::Debug {
    async fn workflow(&self, name: &str) -> Result<Arc<dyn Workflow>>;
    async fn load_job(&self, path: &str) -> Result<Arc<dyn Job>>;

    /// Schedule jobs created by `task` directives.
    async fn produce(&self, jobs: &[Arc<dyn Job>]) -> Result<()> {
        for job in jobs {
            job.fork().await?;
        }
        Ok(())
    }
}

/// JSON schema type for an engine input type.
pub fn schema_type(input_type: &str) -> &'static str {
    match input_type {
        t if t.ends_with("_array") => "array",
        "float" | "number" => "number",
        "integer" => "integer",
        "boolean" => "boolean",
        "array" => "array",
        "hash" | "object" => "object",
        _ => "string",
    }
}

/// Tool definition for one task.
///
/// With `inputs`, only the named inputs are exposed and `name=value` entries
/// become defaults; an empty slice exposes no inputs.
pub fn task_tool_definition(
    workflow: Arc<dyn Workflow>,
    task: &str,
    inputs: Option<&[String]>,
) -> Result<ToolDefinition> {
    let info = workflow.task_info(task)?;

    let mut names: Option<Vec<&str>> = None;
    let mut defaults = Map::new();
    if let Some(inputs) = inputs {
        let mut selected = Vec::new();
        for input in inputs {
            match input.split_once('=') {
                Some((name, value)) => {
                    defaults.insert(name.to_string(), Value::String(value.to_string()));
                }
                None => selected.push(input.as_str()),
            }
        }
        names = Some(selected);
    }
    let exposed = |input: &TaskInput| names.as_ref().map_or(true, |n| n.contains(&input.name.as_str()));

    let mut properties = Map::new();
    let mut required = Vec::new();
    for input in info.inputs.iter().filter(|input| exposed(input)) {
        let kind = schema_type(&input.input_type);
        let mut property = json!({"type": kind});
        if let Some(description) = &input.description {
            property["description"] = json!(description);
        }
        if kind == "array" {
            property["items"] = json!({"type": "string"});
        }
        if !input.select_options.is_empty() {
            property["enum"] = json!(input.select_options);
        }
        properties.insert(input.name.clone(), property);
        if input.required {
            required.push(input.name.clone());
        }
    }

    let parameters = ToolParameters::from_schema(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }));
    Ok(
        ToolDefinition::new(task, info.description, parameters, ToolExecutor::Workflow(workflow))
            .with_defaults(defaults),
    )
}

/// One tool per exported task, or per task when nothing is exported.
pub fn workflow_tools(workflow: Arc<dyn Workflow>) -> Result<Vec<ToolDefinition>> {
    let mut tasks = workflow.exported_tasks();
    if tasks.is_empty() {
        tasks = workflow.all_tasks();
    }
    tasks
        .iter()
        .map(|task| task_tool_definition(workflow.clone(), task, None))
        .collect()
}

/// Run `task` with the call arguments. A `jobname` argument names the job.
pub async fn call_workflow(workflow: &dyn Workflow, task: &str, mut args: ToolArguments) -> Result<Value> {
    let jobname = args.take("jobname").and_then(|v| v.as_str().map(str::to_string));
    let job = workflow.job(task, jobname.as_deref(), args.into_map())?;
    tracing::debug!(workflow = workflow.name(), task, path = %job.path(), "running workflow job");
    if workflow.exec_exports().iter().any(|t| t == task) {
        job.exec().await
    } else {
        job.run().await
    }
}

/// Parse a task line: `<workflow> <task> [key=value…]`.
pub fn parse_task_line(line: &str) -> Result<(String, String, Map<String, Value>)> {
    let tokens = crate::resolve::tokenize(line);
    let mut tokens = tokens.into_iter();
    let (Some(workflow), Some(task)) = (tokens.next(), tokens.next()) else {
        return Err(PalaverError::directive("task", format!("expected `<workflow> <task>`: {line}")));
    };
    let mut inputs = Map::new();
    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            inputs.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    Ok((workflow, task, inputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Translate;

    impl Workflow for Translate {
        fn name(&self) -> &str {
            "Translate"
        }

        fn task_info(&self, task: &str) -> Result<TaskInfo> {
            Ok(TaskInfo {
                name: task.to_string(),
                description: "Translate text".into(),
                inputs: vec![
                    TaskInput::new("text", "text").describe("Text to translate").required(),
                    TaskInput::new("lang", "select").options(&["en", "es"]),
                    TaskInput::new("temperature", "float"),
                    TaskInput::new("files", "file_array"),
                ],
            })
        }

        fn exported_tasks(&self) -> Vec<String> {
            vec!["translate".into()]
        }

        fn all_tasks(&self) -> Vec<String> {
            vec!["translate".into(), "detect".into()]
        }

        fn job(&self, _task: &str, _name: Option<&str>, _inputs: Map<String, Value>) -> Result<Arc<dyn Job>> {
            Err(PalaverError::Collaborator("not runnable".into()))
        }
    }

    #[test]
    fn maps_input_types_to_schema() {
        let definition = task_tool_definition(Arc::new(Translate), "translate", None).unwrap();
        let schema = &definition.parameters.schema;
        assert_eq!(schema["properties"]["text"], json!({"type": "string", "description": "Text to translate"}));
        assert_eq!(schema["properties"]["lang"], json!({"type": "string", "enum": ["en", "es"]}));
        assert_eq!(schema["properties"]["temperature"]["type"], "number");
        assert_eq!(schema["properties"]["files"]["items"], json!({"type": "string"}));
        assert_eq!(schema["required"], json!(["text"]));
    }

    #[test]
    fn restricted_inputs_and_defaults() {
        let inputs = vec!["text".to_string(), "lang=es".to_string()];
        let definition = task_tool_definition(Arc::new(Translate), "translate", Some(&inputs)).unwrap();
        let properties = definition.parameters.properties().unwrap();
        assert_eq!(properties.keys().collect::<Vec<_>>(), vec!["text"]);
        assert_eq!(definition.defaults.get("lang"), Some(&json!("es")));

        let none: Vec<String> = Vec::new();
        let definition = task_tool_definition(Arc::new(Translate), "translate", Some(&none)).unwrap();
        assert!(definition.parameters.properties().unwrap().is_empty());
    }

    #[test]
    fn workflow_tools_prefers_exports() {
        let tools = workflow_tools(Arc::new(Translate)).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "translate");
    }

    #[test]
    fn task_lines_split_quoted_values() {
        let (workflow, task, inputs) =
            parse_task_line("Translate translate text='hola mundo' lang=en").unwrap();
        assert_eq!(workflow, "Translate");
        assert_eq!(task, "translate");
        assert_eq!(inputs.get("text"), Some(&json!("hola mundo")));
        assert!(parse_task_line("Translate").is_err());
    }
}
