//! The value threaded through the authentication pipeline

use user_store::LocalUser;

/// Error codes understood by the pipeline.
pub mod codes {
    pub const AUTHENTICATION_FAILED: &str = "authentication_failed";
    pub const INVALID_EMAIL: &str = "invalid_email";
    pub const INVALID_PASSWORD: &str = "invalid_password";
    pub const INVALID_USERNAME: &str = "invalid_username";
    pub const INCORRECT_PASSWORD: &str = "incorrect_password";
    pub const EMPTY_USERNAME: &str = "empty_username";
    pub const EMPTY_PASSWORD: &str = "empty_password";
}

/// A failed authentication, rendered to the user by the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AuthError {
    pub code: String,
    pub message: String,
}

impl AuthError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Evolving result of one login attempt.
///
/// Starts as `Empty`; each hook receives the previous value and returns the
/// next one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthOutcome {
    #[default]
    Empty,
    User(LocalUser),
    Error(AuthError),
}

impl AuthOutcome {
    pub fn user(&self) -> Option<&LocalUser> {
        match self {
            AuthOutcome::User(user) => Some(user),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            AuthOutcome::Error(err) => Some(err),
            _ => None,
        }
    }
}
