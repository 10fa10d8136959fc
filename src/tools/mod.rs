//! Tool system: definitions, catalogue, dispatch and collaborator-backed
//! executors.

pub mod arguments;
pub mod catalogue;
pub mod definition;
pub mod dispatch;
pub mod knowledge_base;
pub mod remote;
pub mod types;
pub mod workflow;

pub use arguments::ToolArguments;
pub use catalogue::ToolCatalogue;
pub use definition::{handler, ToolDefinition, ToolExecutor, ToolHandler};
pub use dispatch::{serialize_outcome, ToolDispatcher};
pub use knowledge_base::{knowledge_base_tools, DatabaseInfo, KnowledgeBase, KnowledgeBaseStore};
pub use remote::{remote_tools, RemoteEndpoint, RemoteTool, RemoteToolClient, RemoteToolConnector};
pub use types::{ParameterBuilder, ToolParameters};
pub use workflow::{task_tool_definition, workflow_tools, Job, TaskInfo, TaskInput, Workflow, WorkflowEngine};
