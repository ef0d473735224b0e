//! Error types for the `qanun-session` crate.

use thiserror::Error;

/// Errors that can occur in conversation store operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session does not exist or is not owned by the caller.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Reading or appending a session log failed.
    #[error("Session log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A log record could not be encoded.
    #[error("Session log encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A convenience result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
