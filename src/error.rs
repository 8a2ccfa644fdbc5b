//! Error taxonomy shared by the chat pipeline.
//!
//! Each variant maps to one failure class of a chat turn. Whether a failure is fatal
//! depends on the stage that hit it: the orchestrator swallows provider errors during
//! retrieval and embedding, but surfaces them during inference.

/// Errors produced by the chat pipeline and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Embedding or inference endpoint unreachable, timed out, or returned non-2xx.
    #[error("provider error: {0}")]
    Provider(String),
    /// Store read or write failed.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// A single upstream stream fragment could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// A required request field is missing or empty.
    #[error("validation error: {0}")]
    Validation(String),
    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Provider(e.to_string())
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(e: rusqlite::Error) -> Self {
        ChatError::Persistence(e.to_string())
    }
}

impl ChatError {
    /// `true` for failures that a retry of the same request might fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Provider(_))
    }
}
