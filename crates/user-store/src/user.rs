//! User records and the current-user seam

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque local user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a local account.
///
/// Metadata and the password hash are not part of the snapshot; they are
/// read through the store so every reader sees the latest write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    /// Unix seconds
    pub registered_at: u64,
}

/// Resolves the user bound to the active session, if any.
pub trait CurrentUser: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;
}

impl CurrentUser for Option<UserId> {
    fn current_user_id(&self) -> Option<UserId> {
        *self
    }
}

impl CurrentUser for UserId {
    fn current_user_id(&self) -> Option<UserId> {
        Some(*self)
    }
}
