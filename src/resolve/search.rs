//! File reference lookup.

use std::path::{Path, PathBuf};

use crate::config::PalaverConfig;

/// Locates files named by directives.
///
/// Search order: the literal path, the path relative to the directory of
/// the originating file, each configured root, then registered chat names.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    roots: Vec<PathBuf>,
    config: Option<PalaverConfig>,
}

impl FileResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots, config: None }
    }

    pub fn from_config(config: &PalaverConfig) -> Self {
        Self {
            roots: config.search_roots(),
            config: Some(config.clone()),
        }
    }

    pub fn find(&self, reference: &str, origin: Option<&Path>) -> Option<PathBuf> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        let literal = PathBuf::from(reference);
        if literal.exists() {
            return Some(literal);
        }

        if literal.is_relative() {
            let origin_dir = origin.and_then(|path| {
                if path.is_dir() {
                    Some(path)
                } else {
                    path.parent()
                }
            });
            if let Some(dir) = origin_dir {
                let candidate = dir.join(reference);
                if candidate.exists() {
                    return Some(candidate);
                }
            }

            for root in &self.roots {
                let candidate = root.join(reference);
                if candidate.exists() {
                    tracing::debug!(reference, root = %root.display(), "found reference under root");
                    return Some(candidate);
                }
            }
        }

        self.config
            .as_ref()
            .and_then(|config| config.named_chat(reference))
            .filter(|path| path.exists())
    }
}

/// Remote references are passed through untouched.
pub fn is_remote(reference: &str) -> bool {
    let reference = reference.trim();
    reference.starts_with("http://") || reference.starts_with("https://")
}
