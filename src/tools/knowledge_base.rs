//! Knowledge-base interface and association tools.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::arguments::ToolArguments;
use super::definition::{ToolDefinition, ToolExecutor};
use super::types::ToolParameters;
use crate::error::Result;

const DETAILS_SUFFIX: &str = "_association_details";

/// Shape of one association database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseInfo {
    pub name: String,
    pub description: Option<String>,
    pub undirected: bool,
    /// Detail fields stored per association.
    pub fields: Vec<String>,
}

/// A graph of entity associations grouped into databases.
#[async_trait]
pub trait KnowledgeBase: Send + Sync + fmt::Debug {
    fn databases(&self) -> Vec<String>;
    fn database_info(&self, database: &str) -> Result<DatabaseInfo>;

    /// Edges `source~target` leaving `entities`.
    async fn children(&self, database: &str, entities: &[String]) -> Result<Vec<String>>;
    /// Edges `source~target` arriving at `entities`.
    async fn parents(&self, database: &str, entities: &[String]) -> Result<Vec<String>>;

    /// Detail values per association, restricted to `fields` when given.
    async fn association_details(
        &self,
        database: &str,
        associations: &[String],
        fields: Option<&[String]>,
    ) -> Result<Map<String, Value>>;

    /// Register a database file under `name`.
    fn register(&self, name: &str, path: &str, options: Map<String, Value>) -> Result<()>;
}

/// Opens named knowledge bases.
#[async_trait]
pub trait KnowledgeBaseStore: Send + Sync + fmt::Debug {
    async fn load(&self, name: &str) -> Result<Arc<dyn KnowledgeBase>>;
    /// Knowledge base that `association:` directives register into.
    fn session(&self) -> Result<Arc<dyn KnowledgeBase>>;
}

fn database_tool_definition(kb: Arc<dyn KnowledgeBase>, info: &DatabaseInfo) -> ToolDefinition {
    let mut description = match info.description.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => format!(
            "Find associations for a list of entities in database {}: {text}\n",
            info.name
        ),
        _ => format!("Find associations for a list of entities in database {}.\n", info.name),
    };

    let parameters = if info.undirected {
        description.push_str("Returns a list in the format entity~partner.\n");
        ToolParameters::object()
            .string_array("entities", "Entities for which to find associations", true)
            .build()
    } else {
        description.push_str("Returns a list in the format source~target.\n");
        ToolParameters::object()
            .string_array(
                "entities",
                "Source entities in the association, or target entities if 'reverse' is 'true'",
                true,
            )
            .boolean("reverse", "Look for targets instead of sources, defaults to 'false'", false)
            .build()
    };

    ToolDefinition::new(&info.name, description, parameters, ToolExecutor::KnowledgeBase(kb))
}

fn details_tool_definition(kb: Arc<dyn KnowledgeBase>, info: &DatabaseInfo) -> ToolDefinition {
    let association_help = if info.undirected {
        "Associations in the form of source~target or target~source"
    } else {
        "Associations in the form of source~target"
    };
    let mut builder = ToolParameters::object().string_array("associations", association_help, true);

    let description = if info.fields.len() > 1 {
        let fields: Vec<&str> = info.fields.iter().map(String::as_str).collect();
        builder = builder.property(
            "fields",
            json!({
                "type": "array",
                "items": {"type": "string", "enum": fields},
                "description": "Limit the response to these detail fields",
            }),
            false,
        );
        format!(
            "Return details of association as a dictionary object.\n\
             Each key is an association and the value is an array with the values of the \
             different fields you asked for, or for all fields otherwise.\n\
             The fields are: {}.\n\
             Multiple values may be present and use the character ';' to separate them.\n",
            fields.join(", ")
        )
    } else {
        format!(
            "Return the {} of association.\n\
             Multiple values may be present and use the character ';' to separate them.\n",
            info.fields.first().map(String::as_str).unwrap_or("details")
        )
    };

    ToolDefinition::new(
        format!("{}{DETAILS_SUFFIX}", info.name),
        description,
        builder.build(),
        ToolExecutor::KnowledgeBase(kb),
    )
}

/// Tools for `databases` (all databases when `None`): one lookup tool each,
/// plus a details tool for databases that carry fields.
pub fn knowledge_base_tools(
    kb: Arc<dyn KnowledgeBase>,
    databases: Option<&[String]>,
) -> Result<Vec<ToolDefinition>> {
    let databases = match databases {
        Some(names) => names.to_vec(),
        None => kb.databases(),
    };
    let mut tools = Vec::new();
    for database in &databases {
        let info = kb.database_info(database)?;
        tools.push(database_tool_definition(kb.clone(), &info));
        if !info.fields.is_empty() {
            tools.push(details_tool_definition(kb.clone(), &info));
        }
    }
    Ok(tools)
}

/// Answer a knowledge-base tool call.
pub async fn call_knowledge_base(kb: &dyn KnowledgeBase, name: &str, args: ToolArguments) -> Result<Value> {
    if let Some(database) = name.strip_suffix(DETAILS_SUFFIX) {
        let associations = args.get_str_list("associations")?;
        let fields = args.get_str_list("fields").ok();
        let details = kb
            .association_details(database, &associations, fields.as_deref())
            .await?;
        return Ok(Value::Object(details));
    }

    let entities = args.get_str_list("entities")?;
    let edges = if args.get_bool_opt("reverse").unwrap_or(false) {
        kb.parents(name, &entities).await?
    } else {
        kb.children(name, &entities).await?
    };
    Ok(json!(edges))
}
