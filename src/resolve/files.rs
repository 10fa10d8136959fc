//! `file`, `directory`, `pdf` and `image` directives.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use super::search::is_remote;
use super::Resolver;
use crate::error::{PalaverError, Result};
use crate::types::{Message, Role};

/// Wrap `content` in `<tag name="...">` ... `</tag>`.
pub fn tag(tag: &str, content: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("<{tag} name=\"{name}\">\n{content}\n</{tag}>"),
        None => format!("<{tag}>\n{content}\n</{tag}>"),
    }
}

impl Resolver {
    /// Inline referenced files as tagged `user` messages; media references
    /// are resolved to paths and left for the backend to encode.
    pub(crate) async fn files(&self, messages: Vec<Message>, origin: Option<&Path>) -> Result<Vec<Message>> {
        let resolver = self.file_resolver();
        let mut out = Vec::with_capacity(messages.len());

        for message in messages {
            match message.role {
                Role::File => {
                    let reference = message.text().trim().to_string();
                    let found = resolver
                        .find(&reference, origin)
                        .ok_or_else(|| PalaverError::not_found("File", &reference))?;
                    let content = tokio::fs::read_to_string(&found).await?;
                    out.push(Message::user(tag("file", &content, Some(&reference))));
                }
                Role::Directory => {
                    let reference = message.text().trim().to_string();
                    let found = resolver
                        .find(&reference, origin)
                        .ok_or_else(|| PalaverError::not_found("Directory", &reference))?;
                    for path in walk_files(&found) {
                        match tokio::fs::read_to_string(&path).await {
                            Ok(content) => {
                                let name = path.display().to_string();
                                out.push(Message::user(tag("file", &content, Some(&name))));
                            }
                            Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                                tracing::warn!(path = %path.display(), "skipping non-text file");
                            }
                            Err(err) => return Err(err.into()),
                        }
                    }
                }
                Role::Pdf | Role::Image => {
                    let reference = message.text().trim().to_string();
                    if is_remote(&reference) {
                        out.push(Message::new(message.role, reference));
                        continue;
                    }
                    let found = resolver
                        .find(&reference, origin)
                        .ok_or_else(|| PalaverError::not_found("File", &reference))?;
                    out.push(Message::new(message.role, found.display().to_string()));
                }
                _ => out.push(message),
            }
        }
        Ok(out)
    }
}

/// Every visible regular file below `root`, sorted. Dotfiles are skipped;
/// ignore files are not consulted.
fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false);
    builder.hidden(true);

    let mut files: Vec<PathBuf> = builder
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(%error, "failed while walking directory");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}
