//! Convenience re-exports for common use.

pub use crate::ask::{ask, ask_messages, AskOptions};
pub use crate::config::{ConfigProvider, PalaverConfig};
pub use crate::error::{PalaverError, Result};
pub use crate::markup::MarkupScanner;
pub use crate::options::{OptionExtractor, RunOptions};
pub use crate::orchestrator::{Completion, Orchestrator};
pub use crate::provider::{BackendAdapter, BackendClient, BackendKind};
pub use crate::resolve::Resolver;
pub use crate::tools::{ToolArguments, ToolCatalogue, ToolDefinition, ToolDispatcher, ToolParameters};
pub use crate::types::{Content, Conversation, Message, Role, ToolCall, ToolResult};
