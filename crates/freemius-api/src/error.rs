//! Error types for Freemius API calls

/// Errors from the remote login exchange.
///
/// An application-level rejection (bad password, unknown email) is not an
/// error here; it is `LoginOutcome::Rejected`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid login response: {0}")]
    Decode(String),
}

/// Result alias for Freemius API operations.
pub type Result<T> = std::result::Result<T, Error>;
