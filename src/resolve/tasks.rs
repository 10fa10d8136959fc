//! `task`, `inline_task`, `exec_task`, `job` and `inline_job` directives.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::files::tag;
use super::Resolver;
use crate::error::Result;
use crate::tools::workflow::parse_task_line;
use crate::tools::Job;
use crate::types::{Message, Role, ToolCall, ToolResult};

/// Path-safe, stable tool-call id for a job.
pub fn job_call_id(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    let encoded = URL_SAFE_NO_PAD.encode(digest);
    format!("job_{}", &encoded[..32])
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Resolver {
    /// Create jobs for task directives.
    ///
    /// `exec_task` runs in place and becomes a `user` message with the result
    /// (or an `<error>` block). `task` and `inline_task` are scheduled through
    /// the engine and leave a `job` / `inline_job` reference behind.
    pub(crate) async fn tasks(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        let mut scheduled: Vec<Arc<dyn Job>> = Vec::new();
        let mut out = Vec::with_capacity(messages.len());

        for message in messages {
            if !matches!(message.role, Role::Task | Role::InlineTask | Role::ExecTask) {
                out.push(message);
                continue;
            }

            let (workflow_name, task, mut inputs) = parse_task_line(&message.text())?;
            let jobname = inputs
                .remove("jobname")
                .and_then(|v| v.as_str().map(str::to_string));
            let engine = self.workflow_engine()?;
            let workflow = engine.workflow(&workflow_name).await?;
            let job = workflow.job(&task, jobname.as_deref(), inputs)?;
            tracing::debug!(role = %message.role, workflow = %workflow_name, task = %task, path = %job.path(), "task directive");

            match message.role {
                Role::ExecTask => match job.exec().await {
                    Ok(value) => out.push(Message::user(value_text(value))),
                    Err(err) => {
                        tracing::warn!(task = %task, error = %err, "exec_task failed");
                        out.push(Message::user(tag("error", &err.to_string(), Some(&task))));
                    }
                },
                Role::InlineTask => {
                    out.push(Message::new(Role::InlineJob, job.path()));
                    scheduled.push(job);
                }
                _ => {
                    out.push(Message::new(Role::Job, job.path()));
                    scheduled.push(job);
                }
            }
        }

        if !scheduled.is_empty() {
            self.workflow_engine()?.produce(&scheduled).await?;
        }
        Ok(out)
    }

    /// Substitute finished jobs.
    ///
    /// Waits for each referenced job to finish. `inline_job` becomes a `file`
    /// message for the job's result; `job` becomes a `function_call` /
    /// `function_call_output` pair keyed by [`job_call_id`].
    pub(crate) async fn jobs(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            if !matches!(message.role, Role::Job | Role::InlineJob) {
                out.push(message);
                continue;
            }

            let path = message.text().trim().to_string();
            let job = self.workflow_engine()?.load_job(&path).await?;
            job.join().await?;

            if message.role == Role::InlineJob {
                out.push(Message::new(Role::File, job.path()));
                continue;
            }

            let id = job_call_id(&job.path());
            let content = if job.is_done() {
                job.output().await?
            } else {
                job.error().unwrap_or_default()
            };
            let call = ToolCall::new(id.clone(), job.task_name(), job.inputs());
            out.push(Message::function_call(&call));
            out.push(Message::function_call_output(&ToolResult::new(id, content)));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_stable_and_path_safe() {
        let a = job_call_id("var/jobs/Translate/translate/Default_1234");
        let b = job_call_id("var/jobs/Translate/translate/Default_1234");
        assert_eq!(a, b);
        assert!(!a.contains('/'));
        assert_eq!(a.len(), "job_".len() + 32);
        assert_ne!(a, job_call_id("var/jobs/Translate/translate/Other"));
    }
}
