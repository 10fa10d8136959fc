//! `import`, `continue` and `last` directives.

use std::path::{Path, PathBuf};

use super::clear::purge;
use super::Resolver;
use crate::error::{PalaverError, Result};
use crate::types::{Message, Role};

impl Resolver {
    /// Splice referenced chat files into the conversation.
    ///
    /// `import` inserts the whole resolved file, `continue` its last
    /// non-empty message and `last` its last non-empty message once
    /// continuation markers are dropped.
    pub(crate) async fn imports(
        &self,
        messages: Vec<Message>,
        origin: Option<&Path>,
        chain: &[PathBuf],
    ) -> Result<Vec<Message>> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            if !matches!(message.role, Role::Import | Role::Continue | Role::Last) {
                out.push(message);
                continue;
            }

            let reference = message.text().trim().to_string();
            let found = self
                .file_resolver()
                .find(&reference, origin)
                .ok_or_else(|| PalaverError::not_found("Import", &reference))?;
            let canonical = std::fs::canonicalize(&found)?;
            if chain.contains(&canonical) {
                return Err(PalaverError::import_cycle(reference));
            }

            let text = tokio::fs::read_to_string(&found).await?;
            let parsed = self.scanner().parse(&text, Role::User);
            tracing::debug!(
                role = %message.role,
                reference = %reference,
                messages = parsed.len(),
                "importing chat"
            );

            let selected: Vec<Message> = match message.role {
                Role::Continue => parsed
                    .into_iter()
                    .filter(|m| !m.text().trim().is_empty())
                    .last()
                    .into_iter()
                    .collect(),
                Role::Last => purge(parsed)
                    .into_iter()
                    .filter(|m| !m.is_empty())
                    .last()
                    .into_iter()
                    .collect(),
                _ => purge(parsed),
            };

            let mut nested = chain.to_vec();
            nested.push(canonical);
            out.extend(self.pipeline(selected, Some(&found), &nested).await?);
        }
        Ok(out)
    }
}
