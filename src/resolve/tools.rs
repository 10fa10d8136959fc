//! Tool-registering directives: `tool`, `mcp`, `kb`, `association`,
//! `clear_tools` and `clear_associations`.

use serde_json::{Map, Value};

use super::{tokenize, Resolver};
use crate::config::ConfigProvider;
use crate::error::{PalaverError, Result};
use crate::tools::{
    knowledge_base_tools, remote_tools, task_tool_definition, workflow_tools, RemoteEndpoint,
    ToolCatalogue,
};
use crate::types::{Message, Role};

impl Resolver {
    /// Remove tool directives from `messages`, registering what they name.
    ///
    /// Tools from `tool`, `mcp` and `kb` directives accumulate separately from
    /// `association` tools so `clear_tools` and `clear_associations` reset
    /// only their own set. Both sets are added to `catalogue`.
    pub async fn register_tools(
        &self,
        messages: Vec<Message>,
        catalogue: &mut ToolCatalogue,
    ) -> Result<Vec<Message>> {
        let mut tools = ToolCatalogue::new();
        let mut associations = ToolCatalogue::new();
        let mut out = Vec::with_capacity(messages.len());

        for message in messages {
            match message.role {
                Role::Tool => tools.extend(self.workflow_directive(&message).await?),
                Role::Mcp => tools.extend(self.mcp_directive(&message).await?),
                Role::Kb => {
                    let mut tokens = tokenize(&message.text()).into_iter();
                    let name = tokens
                        .next()
                        .ok_or_else(|| PalaverError::directive("kb", "missing knowledge base name"))?;
                    let databases: Vec<String> = tokens.collect();
                    let kb = self.knowledge_base_store()?.load(&name).await?;
                    let only = (!databases.is_empty()).then_some(databases.as_slice());
                    tools.extend(knowledge_base_tools(kb, only)?);
                }
                Role::Association => {
                    let tokens = tokenize(&message.text());
                    let [name, path, rest @ ..] = tokens.as_slice() else {
                        return Err(PalaverError::directive("association", "expected `<name> <path> [key=value…]`"));
                    };
                    let options: Map<String, Value> = rest
                        .iter()
                        .filter_map(|token| token.split_once('='))
                        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                        .collect();
                    let kb = self.knowledge_base_store()?.session()?;
                    kb.register(name, path, options)?;
                    associations.extend(knowledge_base_tools(kb, Some(std::slice::from_ref(name)))?);
                }
                Role::ClearTools => tools.clear(),
                Role::ClearAssociations => associations.clear(),
                _ => out.push(message),
            }
        }

        tracing::debug!(
            tools = tools.len(),
            associations = associations.len(),
            "registered tools from directives"
        );
        catalogue.extend(tools);
        catalogue.extend(associations);
        Ok(out)
    }

    /// `tool: <workflow> [task [input…|name=default…|none]]`
    async fn workflow_directive(&self, message: &Message) -> Result<ToolCatalogue> {
        let mut tokens = tokenize(&message.text()).into_iter();
        let workflow_name = tokens
            .next()
            .ok_or_else(|| PalaverError::directive("tool", "missing workflow name"))?;
        let task = tokens.next();
        let inputs: Vec<String> = tokens.collect();
        let restrict = match inputs.as_slice() {
            [] => None,
            [only] if only == "none" || only == "noinputs" => Some(Vec::new()),
            _ => Some(inputs),
        };

        let workflow = self.workflow_engine()?.workflow(&workflow_name).await?;
        let definitions = match task {
            Some(task) => vec![task_tool_definition(workflow, &task, restrict.as_deref())?],
            None => workflow_tools(workflow)?,
        };
        Ok(definitions.into_iter().collect())
    }

    /// `mcp: <url> [tool…]` or `mcp: stdio <command> [tool…]`
    async fn mcp_directive(&self, message: &Message) -> Result<ToolCatalogue> {
        let mut tokens = tokenize(&message.text()).into_iter();
        let target = tokens
            .next()
            .ok_or_else(|| PalaverError::directive("mcp", "missing server url"))?;

        let endpoint = if target == "stdio" {
            let command = tokens
                .next()
                .ok_or_else(|| PalaverError::directive("mcp", "missing stdio command"))?;
            RemoteEndpoint::Stdio { command }
        } else {
            let token = self
                .config()
                .get_url_config("key", Some(&target), &["mcp"], &[], None);
            RemoteEndpoint::Http { url: target, token }
        };
        let only: Vec<String> = tokens.collect();

        let client = self.remote_connector()?.connect(&endpoint).await?;
        let definitions = remote_tools(client, &only).await?;
        Ok(definitions.into_iter().collect())
    }
}
