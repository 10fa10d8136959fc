//! Directive resolution.
//!
//! Passes run in a fixed order, each taking the whole message list and
//! returning a new one: clear, clean, imports, tasks, jobs, files. Tool
//! directives are resolved separately by [`Resolver::register_tools`] once
//! options have been extracted.

pub mod clear;
pub mod files;
pub mod imports;
pub mod search;
pub mod tasks;
pub mod tools;

pub use clear::{clean, clear, purge};
pub use files::tag;
pub use search::{is_remote, FileResolver};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::PalaverConfig;
use crate::error::{PalaverError, Result};
use crate::markup::MarkupScanner;
use crate::tools::{KnowledgeBaseStore, RemoteToolConnector, WorkflowEngine};
use crate::types::{Conversation, Message};

/// Runs the directive passes against external collaborators.
#[derive(Debug, Clone)]
pub struct Resolver {
    config: PalaverConfig,
    scanner: MarkupScanner,
    workflows: Option<Arc<dyn WorkflowEngine>>,
    knowledge_bases: Option<Arc<dyn KnowledgeBaseStore>>,
    remote: Option<Arc<dyn RemoteToolConnector>>,
}

impl Resolver {
    pub fn new(config: PalaverConfig) -> Self {
        Self {
            config,
            scanner: MarkupScanner::default(),
            workflows: None,
            knowledge_bases: None,
            remote: None,
        }
    }

    pub fn with_scanner(mut self, scanner: MarkupScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_workflow_engine(mut self, engine: Arc<dyn WorkflowEngine>) -> Self {
        self.workflows = Some(engine);
        self
    }

    pub fn with_knowledge_bases(mut self, store: Arc<dyn KnowledgeBaseStore>) -> Self {
        self.knowledge_bases = Some(store);
        self
    }

    pub fn with_remote_connector(mut self, connector: Arc<dyn RemoteToolConnector>) -> Self {
        self.remote = Some(connector);
        self
    }

    pub fn config(&self) -> &PalaverConfig {
        &self.config
    }

    pub fn scanner(&self) -> &MarkupScanner {
        &self.scanner
    }

    pub fn file_resolver(&self) -> FileResolver {
        FileResolver::from_config(&self.config)
    }

    /// Resolve a conversation, using its origin for relative references.
    pub async fn resolve(&self, conversation: Conversation) -> Result<Conversation> {
        let origin = conversation.origin().map(Path::to_path_buf);
        let resolved = self
            .resolve_messages(conversation.messages().to_vec(), origin.as_deref())
            .await?;
        let mut out = conversation;
        out.replace(resolved);
        Ok(out)
    }

    pub async fn resolve_messages(&self, messages: Vec<Message>, origin: Option<&Path>) -> Result<Vec<Message>> {
        let chain: Vec<PathBuf> = origin
            .and_then(|path| std::fs::canonicalize(path).ok())
            .into_iter()
            .collect();
        self.pipeline(messages, origin, &chain).await
    }

    /// `chain` holds the files currently being imported, outermost first.
    fn pipeline<'a>(
        &'a self,
        messages: Vec<Message>,
        origin: Option<&'a Path>,
        chain: &'a [PathBuf],
    ) -> BoxFuture<'a, Result<Vec<Message>>> {
        Box::pin(async move {
            let messages = clear(messages, &crate::types::Role::Clear);
            let messages = clean(messages, &crate::types::Role::Skip);
            let messages = self.imports(messages, origin, chain).await?;
            let messages = self.tasks(messages).await?;
            let messages = self.jobs(messages).await?;
            let messages = self.files(messages, origin).await?;
            tracing::debug!(count = messages.len(), origin = ?origin, "resolved conversation");
            Ok(messages)
        })
    }

    fn workflow_engine(&self) -> Result<&Arc<dyn WorkflowEngine>> {
        self.workflows.as_ref().ok_or_else(|| {
            PalaverError::Configuration("task directives need a workflow engine".into())
        })
    }

    fn knowledge_base_store(&self) -> Result<&Arc<dyn KnowledgeBaseStore>> {
        self.knowledge_bases.as_ref().ok_or_else(|| {
            PalaverError::Configuration("kb and association directives need a knowledge base store".into())
        })
    }

    fn remote_connector(&self) -> Result<&Arc<dyn RemoteToolConnector>> {
        self.remote.as_ref().ok_or_else(|| {
            PalaverError::Configuration("mcp directives need a remote tool connector".into())
        })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(PalaverConfig::global().clone())
    }
}

/// Split directive content shell-style: whitespace separates words, quotes
/// group them and a backslash escapes the next character outside single
/// quotes.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = text.trim().chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') | (Some('"'), '"') => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_token = true;
            }
            (Some(_), c) => current.push(c),
            (None, '\'') | (None, '"') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}
