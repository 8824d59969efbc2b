//! The store contract consumed by the login mediator

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde_json::Value;

use crate::error::Result;
use crate::sanitize::sanitize_username;
use crate::user::{LocalUser, UserId};

/// Boxed future returned by `UserStore` methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Local user store.
///
/// Uses boxed futures for dyn-compatibility (`Arc<dyn UserStore>`). Single
/// metadata keys are read and written atomically; nothing is promised about
/// atomicity across keys.
///
/// Lookups by email and username are case-insensitive.
pub trait UserStore: Send + Sync {
    fn find_by_id(&self, id: UserId) -> BoxFuture<'_, Option<LocalUser>>;

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Option<LocalUser>>;

    fn find_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Option<LocalUser>>;

    /// Create an account. Fails with `Error::Rejected` when the username is
    /// empty or taken, or the email already belongs to another account.
    fn create<'a>(
        &'a self,
        username: &'a str,
        password: &'a Secret<String>,
        email: &'a str,
    ) -> BoxFuture<'a, Result<LocalUser>>;

    /// Replace the user's roles with `roles`, in order, without duplicates.
    fn assign_roles<'a>(&'a self, id: UserId, roles: &'a [&'a str]) -> BoxFuture<'a, Result<()>>;

    fn get_metadata<'a>(&'a self, id: UserId, key: &'a str) -> BoxFuture<'a, Option<Value>>;

    /// Insert or overwrite a metadata entry.
    fn set_metadata<'a>(&'a self, id: UserId, key: &'a str, value: Value)
    -> BoxFuture<'a, Result<()>>;

    /// Remove a metadata entry. Removing an absent key succeeds.
    fn delete_metadata<'a>(&'a self, id: UserId, key: &'a str) -> BoxFuture<'a, Result<()>>;

    fn username_exists<'a>(&'a self, username: &'a str) -> BoxFuture<'a, bool>;

    /// Check a plaintext password against the stored hash.
    fn verify_password<'a>(
        &'a self,
        id: UserId,
        password: &'a Secret<String>,
    ) -> BoxFuture<'a, bool>;

    /// Strip characters the store does not accept in usernames.
    fn sanitize_username(&self, raw: &str) -> String {
        sanitize_username(raw)
    }
}
