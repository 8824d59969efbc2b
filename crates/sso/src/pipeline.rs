//! Host authentication pipeline
//!
//! Authenticate hooks run in ascending priority order (ties keep
//! registration order), each receiving the previous hook's outcome. Logout
//! hooks run in the same order when a session ends.

use std::sync::Arc;

use common::Secret;
use tracing::debug;
use user_store::{BoxFuture, CurrentUser};

use crate::outcome::{AuthError, AuthOutcome, codes};

/// A step in the authenticate filter chain.
pub trait AuthenticateHook: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        prior: AuthOutcome,
        identifier: &'a str,
        secret: &'a Secret<String>,
    ) -> BoxFuture<'a, AuthOutcome>;
}

/// A listener fired when the session's user logs out.
pub trait LogoutHook: Send + Sync {
    fn on_logout<'a>(&'a self, session: &'a dyn CurrentUser) -> BoxFuture<'a, ()>;
}

/// Ordered hook registry, built once at startup.
#[derive(Default, Clone)]
pub struct AuthPipeline {
    authenticate: Vec<(i32, Arc<dyn AuthenticateHook>)>,
    logout: Vec<(i32, Arc<dyn LogoutHook>)>,
}

impl AuthPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_authenticate(
        &mut self,
        priority: i32,
        hook: Arc<dyn AuthenticateHook>,
    ) -> &mut Self {
        let at = self.authenticate.partition_point(|(p, _)| *p <= priority);
        self.authenticate.insert(at, (priority, hook));
        self
    }

    pub fn add_logout(&mut self, priority: i32, hook: Arc<dyn LogoutHook>) -> &mut Self {
        let at = self.logout.partition_point(|(p, _)| *p <= priority);
        self.logout.insert(at, (priority, hook));
        self
    }

    /// Run every authenticate hook and return the final outcome.
    ///
    /// An attempt no hook resolved becomes `authentication_failed`.
    pub async fn authenticate(&self, identifier: &str, secret: &Secret<String>) -> AuthOutcome {
        let mut outcome = AuthOutcome::Empty;
        for (priority, hook) in &self.authenticate {
            outcome = hook.authenticate(outcome, identifier, secret).await;
            debug!(priority, resolved = outcome.user().is_some(), "authenticate hook ran");
        }

        match outcome {
            AuthOutcome::Empty => AuthOutcome::Error(AuthError::new(
                codes::AUTHENTICATION_FAILED,
                "Invalid username, email address or incorrect password.",
            )),
            other => other,
        }
    }

    /// Fire every logout hook for the session.
    pub async fn logout(&self, session: &dyn CurrentUser) {
        for (_, hook) in &self.logout {
            hook.on_logout(session).await;
        }
    }

    pub fn authenticate_hook_count(&self) -> usize {
        self.authenticate.len()
    }

    pub fn logout_hook_count(&self) -> usize {
        self.logout.len()
    }
}
