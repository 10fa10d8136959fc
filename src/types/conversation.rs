//! Ordered message list with builder helpers and branching.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use super::message::{Content, Message, Role};
use crate::markup;

/// An ordered, mutable message list.
///
/// Branching produces an independent copy that keeps a read-only snapshot of
/// the parent's messages as its lineage; branches never share mutable state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
    lineage: Option<Arc<[Message]>>,
    origin: Option<PathBuf>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Parse markup text with `user` as the default role.
    pub fn parse(text: &str) -> Self {
        Self::from_messages(markup::parse(text, Role::User))
    }

    /// Remember the file this conversation was read from. Relative
    /// references in directives resolve against its directory.
    pub fn with_origin(mut self, path: impl Into<PathBuf>) -> Self {
        self.origin = Some(path.into());
        self
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Replace the whole sequence.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Independent copy carrying this conversation as read-only lineage.
    pub fn branch(&self) -> Self {
        Self {
            messages: self.messages.clone(),
            lineage: Some(Arc::from(self.messages.as_slice())),
            origin: self.origin.clone(),
        }
    }

    /// Messages of the conversation this one was branched from.
    pub fn lineage(&self) -> Option<&[Message]> {
        self.lineage.as_deref()
    }

    pub fn print(&self) -> String {
        markup::print(&self.messages)
    }

    /// Append a message with an arbitrary role.
    pub fn message(&mut self, role: impl Into<Role>, content: impl Into<Content>) -> &mut Self {
        self.messages.push(Message::new(role, content));
        self
    }

    pub fn user(&mut self, text: impl Into<String>) -> &mut Self {
        self.message(Role::User, text.into())
    }

    pub fn system(&mut self, text: impl Into<String>) -> &mut Self {
        self.message(Role::System, text.into())
    }

    pub fn assistant(&mut self, text: impl Into<String>) -> &mut Self {
        self.message(Role::Assistant, text.into())
    }

    pub fn import(&mut self, reference: impl Into<String>) -> &mut Self {
        self.message(Role::Import, reference.into())
    }

    pub fn continue_from(&mut self, reference: impl Into<String>) -> &mut Self {
        self.message(Role::Continue, reference.into())
    }

    pub fn file(&mut self, reference: impl Into<String>) -> &mut Self {
        self.message(Role::File, reference.into())
    }

    pub fn directory(&mut self, reference: impl Into<String>) -> &mut Self {
        self.message(Role::Directory, reference.into())
    }

    pub fn pdf(&mut self, reference: impl Into<String>) -> &mut Self {
        self.message(Role::Pdf, reference.into())
    }

    pub fn image(&mut self, reference: impl Into<String>) -> &mut Self {
        self.message(Role::Image, reference.into())
    }

    /// Response format: a schema value or a shorthand such as `json`.
    pub fn format(&mut self, format: impl Into<Value>) -> &mut Self {
        match format.into() {
            Value::String(text) => self.message(Role::Format, text),
            other => self.message(Role::Format, other),
        }
    }

    /// Register a workflow task (or every task when `task` is `None`).
    pub fn tool(&mut self, workflow: &str, task: Option<&str>, inputs: &[&str]) -> &mut Self {
        let mut parts = vec![workflow.to_string()];
        parts.extend(task.map(str::to_string));
        parts.extend(inputs.iter().map(|input| input.to_string()));
        self.message(Role::Tool, parts.join(" "))
    }

    pub fn task(&mut self, workflow: &str, task: &str, inputs: &[(&str, &str)]) -> &mut Self {
        self.message(Role::Task, task_line(workflow, task, inputs))
    }

    pub fn inline_task(
        &mut self,
        workflow: &str,
        task: &str,
        inputs: &[(&str, &str)],
    ) -> &mut Self {
        self.message(Role::InlineTask, task_line(workflow, task, inputs))
    }

    pub fn exec_task(&mut self, workflow: &str, task: &str, inputs: &[(&str, &str)]) -> &mut Self {
        self.message(Role::ExecTask, task_line(workflow, task, inputs))
    }

    pub fn option(&mut self, name: &str, value: &str) -> &mut Self {
        self.message(Role::Option, format!("{name} {value}"))
    }

    pub fn sticky_option(&mut self, name: &str, value: &str) -> &mut Self {
        self.message(Role::StickyOption, format!("{name} {value}"))
    }

    pub fn endpoint(&mut self, name: impl Into<String>) -> &mut Self {
        self.message(Role::Endpoint, name.into())
    }

    pub fn model(&mut self, name: impl Into<String>) -> &mut Self {
        self.message(Role::Model, name.into())
    }

    pub fn backend(&mut self, name: impl Into<String>) -> &mut Self {
        self.message(Role::Backend, name.into())
    }
}

fn task_line(workflow: &str, task: &str, inputs: &[(&str, &str)]) -> String {
    let mut line = format!("{workflow} {task}");
    for (key, value) in inputs {
        if value.contains(char::is_whitespace) {
            line.push_str(&format!(" {key}='{value}'"));
        } else {
            line.push_str(&format!(" {key}={value}"));
        }
    }
    line
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_messages(messages)
    }
}

impl From<Conversation> for Vec<Message> {
    fn from(conversation: Conversation) -> Self {
        conversation.messages
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
