//! Configuration system (layered: code > env > default).

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, RwLock};

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<PalaverConfig> = OnceLock::new();

/// Source of credentials, URLs and other settings.
///
/// `scopes` are tried in order; `env` lists environment variable names
/// tried in order after every scope misses.
pub trait ConfigProvider: Send + Sync + fmt::Debug {
    fn get(&self, key: &str, scopes: &[&str], env: &[&str], default: Option<&str>)
        -> Option<String>;

    /// Like [`get`](Self::get), but scopes derived from the server name of
    /// `url` are tried first (`<scope>.<token>` for each scope and token).
    fn get_url_config(
        &self,
        key: &str,
        url: Option<&str>,
        scopes: &[&str],
        env: &[&str],
        default: Option<&str>,
    ) -> Option<String> {
        let Some(url) = url else {
            return self.get(key, scopes, env, default);
        };
        let tokens = url_server_tokens(url);
        let mut all: Vec<String> = scopes
            .iter()
            .flat_map(|scope| tokens.iter().map(move |token| format!("{scope}.{token}")))
            .collect();
        all.extend(scopes.iter().map(|scope| scope.to_string()));
        let all: Vec<&str> = all.iter().map(String::as_str).collect();
        self.get(key, &all, env, default)
    }
}

/// Server-name tokens for URL-scoped lookups.
///
/// `https://api.openai.com/v1` yields `api`, `openai`, `api.openai`,
/// `api.openai.com`. A short trailing label (the TLD) is dropped before
/// combining.
pub fn url_server_tokens(url: &str) -> Vec<String> {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let server = without_scheme
        .split(['/', ':'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("NOSERVER");

    let mut parts: Vec<&str> = server.split('.').collect();
    if parts.len() > 1 && parts.last().is_some_and(|last| last.len() <= 3) {
        parts.pop();
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut push = |token: String| {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    };
    for part in &parts {
        push(part.to_string());
    }
    for len in 1..=parts.len() {
        for window in parts.windows(len) {
            push(window.join("."));
        }
    }
    push(server.to_string());
    tokens
}

/// Layered configuration for palaver.
///
/// Resolution order for a key:
/// 1. Values set in code for the first matching scope
/// 2. Values set in code without a scope
/// 3. Environment variables, in the order given
/// 4. The caller's default
#[derive(Clone, Default)]
pub struct PalaverConfig {
    scoped: Arc<RwLock<HashMap<(String, String), String>>>,
    unscoped: Arc<RwLock<HashMap<String, String>>>,
    chats_root: Arc<RwLock<Option<PathBuf>>>,
    search_roots: Arc<RwLock<Vec<PathBuf>>>,
    named_chats: Arc<RwLock<HashMap<String, PathBuf>>>,
    read_env: bool,
}

impl fmt::Debug for PalaverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .scoped
            .read()
            .map(|map| map.keys().map(|(scope, key)| format!("{scope}.{key}")).collect())
            .unwrap_or_default();
        f.debug_struct("PalaverConfig")
            .field("keys", &keys)
            .field("chats_root", &self.chats_root)
            .field("read_env", &self.read_env)
            .finish()
    }
}

impl PalaverConfig {
    /// Empty config that ignores the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config backed by environment variables (loads `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let config = Self {
            read_env: true,
            ..Self::default()
        };
        if let Ok(root) = std::env::var("PALAVER_CHATS") {
            config.set_chats_root(root);
        }
        config
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static PalaverConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    /// Set `key` within `scope` (e.g. `("key", "openai")`).
    pub fn set(&self, key: &str, scope: &str, value: impl Into<String>) {
        if let Ok(mut map) = self.scoped.write() {
            map.insert((scope.to_string(), key.to_string()), value.into());
        }
    }

    /// Set `key` for every scope.
    pub fn set_default(&self, key: &str, value: impl Into<String>) {
        if let Ok(mut map) = self.unscoped.write() {
            map.insert(key.to_string(), value.into());
        }
    }

    /// Root directory holding saved chats.
    pub fn set_chats_root(&self, root: impl Into<PathBuf>) {
        if let Ok(mut slot) = self.chats_root.write() {
            *slot = Some(root.into());
        }
    }

    /// Chats root: explicit value, else the platform data directory.
    pub fn chats_root(&self) -> Option<PathBuf> {
        if let Some(root) = self.chats_root.read().ok().and_then(|slot| slot.clone()) {
            return Some(root);
        }
        directories::ProjectDirs::from("", "", "palaver").map(|dirs| dirs.data_dir().join("chats"))
    }

    /// Extra directory searched when resolving file references.
    pub fn add_search_root(&self, root: impl Into<PathBuf>) {
        if let Ok(mut roots) = self.search_roots.write() {
            roots.push(root.into());
        }
    }

    /// Configured roots in search order: explicit roots, then the chats root.
    pub fn search_roots(&self) -> Vec<PathBuf> {
        let mut roots = self
            .search_roots
            .read()
            .map(|roots| roots.clone())
            .unwrap_or_default();
        roots.extend(self.chats_root());
        roots
    }

    /// Register a chat file under a name usable in `import:` directives.
    pub fn register_chat(&self, name: &str, path: impl Into<PathBuf>) {
        if let Ok(mut chats) = self.named_chats.write() {
            chats.insert(name.to_string(), path.into());
        }
    }

    pub fn named_chat(&self, name: &str) -> Option<PathBuf> {
        self.named_chats.read().ok()?.get(name).cloned()
    }
}

impl ConfigProvider for PalaverConfig {
    fn get(
        &self,
        key: &str,
        scopes: &[&str],
        env: &[&str],
        default: Option<&str>,
    ) -> Option<String> {
        if let Ok(map) = self.scoped.read() {
            for scope in scopes {
                if let Some(value) = map.get(&(scope.to_string(), key.to_string())) {
                    return Some(value.clone());
                }
            }
        }
        if let Some(value) = self.unscoped.read().ok().and_then(|map| map.get(key).cloned()) {
            return Some(value);
        }
        if self.read_env {
            for name in env.iter().flat_map(|list| list.split(',')) {
                if let Ok(value) = std::env::var(name.trim()) {
                    if !value.is_empty() {
                        return Some(value);
                    }
                }
            }
        }
        default.map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn server_tokens_drop_tld_and_combine() {
        assert_eq!(
            url_server_tokens("https://api.openai.com/v1"),
            vec!["api", "openai", "api.openai", "api.openai.com"]
        );
        assert_eq!(url_server_tokens("http://localhost:11434"), vec!["localhost"]);
    }

    #[test]
    fn first_matching_scope_wins() {
        let config = PalaverConfig::new();
        config.set("model", "ask", "general-model");
        config.set("model", "openai_ask", "specific-model");

        let value = config.get("model", &["openai_ask", "ask", "openai"], &[], None);
        assert_eq!(value.as_deref(), Some("specific-model"));
    }

    #[test]
    fn url_scopes_take_precedence() {
        let config = PalaverConfig::new();
        config.set("key", "ask", "plain-key");
        config.set("key", "ask.openai", "server-key");

        let key = config.get_url_config("key", Some("https://api.openai.com/v1"), &["ask"], &[], None);
        assert_eq!(key.as_deref(), Some("server-key"));
        let key = config.get_url_config("key", Some("http://localhost:8080"), &["ask"], &[], None);
        assert_eq!(key.as_deref(), Some("plain-key"));
    }

    #[test]
    fn falls_back_to_default_without_env() {
        let config = PalaverConfig::new();
        let value = config.get("model", &["openai"], &["PATH"], Some("gpt-4.1"));
        assert_eq!(value.as_deref(), Some("gpt-4.1"));
    }

    #[test]
    fn named_chats_and_roots() {
        let config = PalaverConfig::new();
        config.set_chats_root("/tmp/chats");
        config.add_search_root("/srv/prompts");
        config.register_chat("intro", "/tmp/chats/intro");

        assert_eq!(config.named_chat("intro"), Some(PathBuf::from("/tmp/chats/intro")));
        assert_eq!(
            config.search_roots(),
            vec![PathBuf::from("/srv/prompts"), PathBuf::from("/tmp/chats")]
        );
    }
}
