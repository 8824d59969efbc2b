//! Error types for local user storage

/// Errors from user store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store refused to create or update a user (duplicate login or
    /// email, invalid username).
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("user file parse error: {0}")]
    Parse(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
