//! Error types for the session layer.

use thiserror::Error;

/// Errors that can occur in the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Tmux transport error.
    #[error("tmux error: {0}")]
    Tmux(#[from] parley_tmux::TmuxError),

    /// No registered session with the given name.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session's underlying process/session is gone.
    #[error("session dead: {0}")]
    SessionDead(String),

    /// A session already exists under this name.
    #[error("session already exists: {0}")]
    SessionExists(String),

    /// The agent did not become ready within its startup timeout.
    #[error("session '{name}' did not become ready within {timeout_secs}s")]
    StartupTimeout {
        /// Session name.
        name: String,
        /// Configured startup timeout in seconds.
        timeout_secs: u64,
    },
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
