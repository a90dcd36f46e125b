use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextError>;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Invalid visit JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document parsed but does not have the structure of a visit record.
    #[error("Invalid visit record: {0}")]
    Validation(String),
}

impl ContextError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
