//! Error types for the conversation layer.

use thiserror::Error;

/// Errors surfaced while running a conversation.
#[derive(Error, Debug)]
pub enum ConvoError {
    /// Session-layer failure.
    #[error("session error: {0}")]
    Session(#[from] parley_session::SessionError),

    /// A conversation needs at least two participants.
    #[error("conversation needs at least two participants, got {0}")]
    NotEnoughParticipants(usize),

    /// Transcript I/O failure.
    #[error("transcript io error: {0}")]
    Io(#[from] std::io::Error),

    /// Transcript serialization failure.
    #[error("transcript serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for conversation operations.
pub type Result<T> = std::result::Result<T, ConvoError>;
