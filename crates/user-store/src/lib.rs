//! Local user storage for the SSO gateway
//!
//! Defines the `UserStore` contract the login mediator consumes (lookup,
//! creation, role assignment and per-user key/value metadata) and a
//! JSON-file implementation. Passwords are stored as argon2 PHC strings.
//!
//! The currently logged-in user is request-scoped, so it is not part of the
//! store: callers pass a `CurrentUser` (typically the HTTP session).

pub mod error;
pub mod file;
pub mod password;
pub mod sanitize;
pub mod store;
pub mod user;

pub use error::{Error, Result};
pub use file::FileUserStore;
pub use sanitize::sanitize_username;
pub use store::{BoxFuture, UserStore};
pub use user::{CurrentUser, LocalUser, UserId};
