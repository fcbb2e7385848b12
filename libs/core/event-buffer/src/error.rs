//! Buffer error types
//!
//! Errors are categorized to decide what happens to the batch:
//! - **Transport**: network or server trouble, keep the batch and go offline
//! - **Rejected**: the server refused the batch as malformed, drop it
//! - **TooLarge**: the server wants fewer events per request, split it
//! - **Persist**: local pending-queue storage failed

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Batch rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Batch of {events} events is too large for the server")]
    TooLarge { events: usize },

    #[error("Pending store error: {0}")]
    Persist(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BufferResult<T> = Result<T, BufferError>;

impl BufferError {
    /// Retrying the same batch can never succeed
    pub fn is_permanent(&self) -> bool {
        matches!(self, BufferError::Rejected { .. })
    }
}

impl From<reqwest::Error> for BufferError {
    fn from(err: reqwest::Error) -> Self {
        BufferError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for BufferError {
    fn from(err: std::io::Error) -> Self {
        BufferError::Persist(err.to_string())
    }
}
