//! Error types for palaver.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all palaver operations.
#[derive(Error, Debug)]
pub enum PalaverError {
    #[error("{reason}: {reference}")]
    ImportResolution { reference: String, reason: String },

    #[error("Vendor protocol error ({backend}): {message}")]
    VendorProtocol {
        backend: String,
        message: String,
        payload: Option<serde_json::Value>,
    },

    #[error("unknown executor for `{0}`")]
    UnknownTool(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid `{role}` directive: {message}")]
    Directive { role: String, message: String },

    #[error("Conversation exceeded {0} backend turns without a final answer")]
    TurnLimitExceeded(usize),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl PalaverError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// A protocol violation carrying the offending vendor payload.
    pub fn protocol(
        backend: impl Into<String>,
        message: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self::VendorProtocol {
            backend: backend.into(),
            message: message.into(),
            payload,
        }
    }

    /// A reference (file, import, job) that could not be found.
    pub fn not_found(kind: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::ImportResolution {
            reference: reference.into(),
            reason: format!("{} not found", kind.into()),
        }
    }

    /// A chat that (transitively) imports itself.
    pub fn import_cycle(reference: impl Into<String>) -> Self {
        Self::ImportResolution {
            reference: reference.into(),
            reason: "Import cycle".into(),
        }
    }

    /// A directive whose content cannot be interpreted.
    pub fn directive(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Directive {
            role: role.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ImportResolution { .. } | Self::Directive { .. } => ErrorCategory::Resolution,
            Self::VendorProtocol { .. } => ErrorCategory::Protocol,
            Self::UnknownTool(_) | Self::ToolExecution { .. } | Self::InvalidArgument(_) => {
                ErrorCategory::ToolExecution
            }
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit
            | ErrorCategory::Network
            | ErrorCategory::Server => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Resolution => RecoverySuggestion::CheckReferences,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolCatalogue,
            _ => RecoverySuggestion::ReportUpstream,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PalaverError>;
