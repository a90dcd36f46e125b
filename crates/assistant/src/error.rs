use dental_search::SearchError;
use dental_vector_store::VectorStoreError;
use dental_visit_context::ContextError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistantError>;

/// Coarse error class callers branch on: retry, propagate or degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Retrieval,
    Configuration,
    Generation,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validation => "validation",
            Self::Retrieval => "retrieval",
            Self::Configuration => "configuration",
            Self::Generation => "generation",
            Self::Timeout => "timeout",
        })
    }
}

#[derive(Error, Debug)]
pub enum AssistantError {
    /// Malformed input or missing session fields; recorded in the thread, never fatal.
    #[error("{0}")]
    Validation(String),

    /// Embedding service or index unreachable or malformed during retrieval.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] SearchError),

    /// Missing or invalid reference table or settings; aborts startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Language model error: {0}")]
    Generation(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
}

impl AssistantError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Retrieval(_) => ErrorKind::Retrieval,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Generation(_) => ErrorKind::Generation,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }
}

impl From<SearchError> for AssistantError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::EmptyQuery => Self::Validation(err.to_string()),
            SearchError::Retrieval(_) => Self::Retrieval(err),
        }
    }
}

impl From<ContextError> for AssistantError {
    fn from(err: ContextError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Index open happens at startup: table problems are configuration errors, anything else
/// (embedding service down while building) is a retrieval error.
impl From<VectorStoreError> for AssistantError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Retrieval(SearchError::Retrieval(other)),
        }
    }
}
