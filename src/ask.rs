//! Top-level entry points: markup text in, answer or transcript out.
//!
//! ```no_run
//! # async fn example() -> palaver::error::Result<()> {
//! let answer = palaver::ask("user: What is 2 + 2?", palaver::AskOptions::new()).await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::{ConfigProvider, PalaverConfig};
use crate::error::{PalaverError, Result};
use crate::markup::MarkupScanner;
use crate::options::{OptionExtractor, RunOptions};
use crate::orchestrator::{Completion, Orchestrator, DEFAULT_MAX_TURNS};
use crate::provider::{create_backend, select_backend, BackendAdapter};
use crate::resolve::Resolver;
use crate::tools::{
    KnowledgeBaseStore, RemoteToolConnector, ToolCatalogue, ToolDispatcher, WorkflowEngine,
};
use crate::types::{Conversation, Role};
use crate::util::RetryPolicy;

/// Everything a run needs besides the conversation itself.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    config: Option<PalaverConfig>,
    scanner: Option<MarkupScanner>,
    workflows: Option<Arc<dyn WorkflowEngine>>,
    knowledge_bases: Option<Arc<dyn KnowledgeBaseStore>>,
    remote: Option<Arc<dyn RemoteToolConnector>>,
    tools: ToolCatalogue,
    dispatcher: ToolDispatcher,
    retry: RetryPolicy,
    max_turns: Option<usize>,
    backend: Option<Arc<dyn BackendAdapter>>,
    defaults: RunOptions,
    origin: Option<PathBuf>,
}

impl AskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults to [`PalaverConfig::global`].
    pub fn with_config(mut self, config: PalaverConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_scanner(mut self, scanner: MarkupScanner) -> Self {
        self.scanner = Some(scanner);
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

    /// Tools offered in addition to those registered by directives.
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
        self.max_turns = Some(max_turns);
        self
    }

    /// Use `backend` instead of selecting one from options and config.
    pub fn with_backend(mut self, backend: Arc<dyn BackendAdapter>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Options applied underneath those found in the conversation.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.defaults = options;
        self
    }

    /// File the conversation text came from; relative references resolve
    /// against its directory.
    pub fn with_origin(mut self, path: impl Into<PathBuf>) -> Self {
        self.origin = Some(path.into());
        self
    }

    fn config(&self) -> PalaverConfig {
        self.config
            .clone()
            .unwrap_or_else(|| PalaverConfig::global().clone())
    }

    fn resolver(&self, config: PalaverConfig) -> Resolver {
        let mut resolver = Resolver::new(config);
        if let Some(scanner) = &self.scanner {
            resolver = resolver.with_scanner(scanner.clone());
        }
        if let Some(engine) = &self.workflows {
            resolver = resolver.with_workflow_engine(engine.clone());
        }
        if let Some(store) = &self.knowledge_bases {
            resolver = resolver.with_knowledge_bases(store.clone());
        }
        if let Some(connector) = &self.remote {
            resolver = resolver.with_remote_connector(connector.clone());
        }
        resolver
    }

    fn max_turns(&self, options: &RunOptions, config: &dyn ConfigProvider) -> usize {
        let endpoint = options.endpoint();
        let mut scopes: Vec<&str> = endpoint.as_deref().into_iter().collect();
        scopes.push("ask");
        self.max_turns
            .or_else(|| options.max_turns())
            .or_else(|| {
                config
                    .get("max_turns", &scopes, &["ASK_MAX_TURNS"], None)
                    .and_then(|turns| turns.trim().parse().ok())
            })
            .unwrap_or(DEFAULT_MAX_TURNS)
    }
}

/// Ask a question written in chat markup and return the final answer.
pub async fn ask(text: &str, options: AskOptions) -> Result<String> {
    let completion = ask_completion(text, &options).await?;
    completion.answer().ok_or_else(|| {
        PalaverError::protocol("ask", "run finished without an assistant message", None)
    })
}

/// Like [`ask`], but return the whole transcript: the resolved messages
/// followed by every reply, tool exchange and continuation marker.
pub async fn ask_messages(text: &str, options: AskOptions) -> Result<Vec<crate::types::Message>> {
    Ok(ask_completion(text, &options).await?.messages)
}

/// Parse `text` and run it to completion.
pub async fn ask_completion(text: &str, options: &AskOptions) -> Result<Completion> {
    let scanner = options.scanner.clone().unwrap_or_default();
    let mut conversation = Conversation::from_messages(scanner.parse(text, Role::User));
    if let Some(origin) = &options.origin {
        conversation = conversation.with_origin(origin.clone());
    }
    run_conversation(conversation, options).await
}

/// Resolve directives, extract options, register tools and drive the
/// selected backend until it answers.
pub async fn run_conversation(conversation: Conversation, options: &AskOptions) -> Result<Completion> {
    let config = options.config();
    let resolver = options.resolver(config.clone());

    let conversation = resolver.resolve(conversation).await?;
    let origin = conversation.origin().map(|path| path.to_path_buf());

    // Tool directives go first so the continuation index the extractor
    // records refers to the list that is actually sent.
    let mut tools = options.tools.clone();
    let messages = resolver
        .register_tools(conversation.into_messages(), &mut tools)
        .await?;

    let (messages, mut run_options) =
        OptionExtractor::from_config(&config).extract_messages(messages, origin.as_deref())?;
    run_options.merge_defaults(&options.defaults);

    let backend = match &options.backend {
        Some(backend) => backend.clone(),
        None => create_backend(select_backend(&run_options, &config)?)?,
    };
    let client = backend.build_client(&run_options, &config)?;
    let max_turns = options.max_turns(&run_options, &config);

    debug!(
        backend = backend.name(),
        model = %client.model,
        messages = messages.len(),
        tools = tools.len(),
        max_turns,
        "starting run"
    );

    Orchestrator::new(backend, client)
        .with_tools(tools)
        .with_dispatcher(options.dispatcher.clone())
        .with_retry(options.retry.clone())
        .with_max_turns(max_turns)
        .run(messages, &run_options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn explicit_max_turns_wins() {
        let config = PalaverConfig::new();
        config.set("max_turns", "ask", "7");
        let options = RunOptions::new().with("max_turns", 3);

        assert_eq!(AskOptions::new().with_max_turns(2).max_turns(&options, &config), 2);
        assert_eq!(AskOptions::new().max_turns(&options, &config), 3);
        assert_eq!(AskOptions::new().max_turns(&RunOptions::new(), &config), 7);
        assert_eq!(
            AskOptions::new().max_turns(&RunOptions::new(), &PalaverConfig::new()),
            DEFAULT_MAX_TURNS
        );
    }
}
