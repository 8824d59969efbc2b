//! Local username/email + password check
//!
//! Runs before the login mediator. Unknown identifiers and bad passwords are
//! reported with the error codes the mediator may override with a remote
//! login.

use std::sync::Arc;

use common::Secret;
use sso::{AuthError, AuthOutcome, AuthenticateHook, codes};
use tracing::debug;
use user_store::{BoxFuture, UserStore};

pub const LOCAL_PASSWORD_PRIORITY: i32 = 20;

pub struct LocalPasswordCheck {
    store: Arc<dyn UserStore>,
}

impl LocalPasswordCheck {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    async fn check(
        &self,
        prior: AuthOutcome,
        identifier: &str,
        secret: &Secret<String>,
    ) -> AuthOutcome {
        if prior.user().is_some() {
            return prior;
        }

        if identifier.is_empty() {
            return AuthOutcome::Error(AuthError::new(
                codes::EMPTY_USERNAME,
                "The username field is empty.",
            ));
        }
        if secret.is_empty() {
            return AuthOutcome::Error(AuthError::new(
                codes::EMPTY_PASSWORD,
                "The password field is empty.",
            ));
        }

        let by_email = identifier.contains('@');
        let user = if by_email {
            self.store.find_by_email(identifier).await
        } else {
            self.store.find_by_username(identifier).await
        };

        let Some(user) = user else {
            debug!(by_email, "no local account for identifier");
            return if by_email {
                AuthOutcome::Error(AuthError::new(codes::INVALID_EMAIL, "Unknown email address."))
            } else {
                AuthOutcome::Error(AuthError::new(codes::INVALID_USERNAME, "Unknown username."))
            };
        };

        if self.store.verify_password(user.id, secret).await {
            AuthOutcome::User(user)
        } else {
            debug!(user_id = %user.id, "local password mismatch");
            AuthOutcome::Error(AuthError::new(
                codes::INCORRECT_PASSWORD,
                format!("The password you entered for {identifier} is incorrect."),
            ))
        }
    }
}

impl AuthenticateHook for LocalPasswordCheck {
    fn authenticate<'a>(
        &'a self,
        prior: AuthOutcome,
        identifier: &'a str,
        secret: &'a Secret<String>,
    ) -> BoxFuture<'a, AuthOutcome> {
        Box::pin(self.check(prior, identifier, secret))
    }
}
