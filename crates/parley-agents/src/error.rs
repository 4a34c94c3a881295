//! Error types for agent profiles.

use thiserror::Error;

/// Errors that can occur while loading or using agent profiles.
#[derive(Error, Debug)]
pub enum AgentError {
    /// No profile with the given name.
    #[error("no agent profile named '{0}'")]
    ProfileNotFound(String),

    /// Profile file could not be parsed.
    #[error("invalid profile '{0}': {1}")]
    InvalidProfile(String, #[source] serde_json::Error),

    /// I/O error reading profile files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for agent profile operations.
pub type Result<T> = std::result::Result<T, AgentError>;
