//! Login mediator
//!
//! Runs after the local password check in the authenticate pipeline and
//! decides whether a Freemius exchange is needed:
//!
//! 1. Without a resolved local user, only email logins can be mediated
//! 2. Errors unrelated to bad credentials are passed through untouched
//! 3. A resolved user with an unexpired cached token needs no exchange
//! 4. Otherwise one exchange is made; the returned identity is bound to the
//!    resolved user, a user with the same email, or a freshly provisioned
//!    account, and the token is cached in that user's metadata
//!
//! The mediator never fails the pipeline on its own account: a remote
//! outage or a local store failure degrades to whatever the earlier hooks
//! decided. The only error it produces is Freemius's rejection when there
//! is no local identity to fall back on.
//!
//! A local account whose email matches the Freemius identity is bound
//! without checking that account's own password.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use freemius_api::{IdentityClient, LoginOutcome, RemoteIdentity, RemoteToken};
use serde_json::Value;
use tracing::{debug, info, warn};
use user_store::{BoxFuture, CurrentUser, LocalUser, UserId, UserStore};

use crate::metrics;
use crate::outcome::{AuthError, AuthOutcome, codes};
use crate::pipeline::{AuthPipeline, AuthenticateHook, LogoutHook};
use crate::username::{base_username, unique_username};

/// Metadata key holding the Freemius user id.
pub const REMOTE_USER_ID_KEY: &str = "remote_user_id";

/// Metadata key holding the cached `RemoteToken`.
pub const REMOTE_TOKEN_KEY: &str = "remote_token";

/// Role every provisioned account gets.
pub const DEFAULT_ROLE: &str = "subscriber";

/// Marketplace role added to provisioned accounts.
pub const MARKETPLACE_ROLE: &str = "edd_subscriber";

/// Pipeline priority; runs after the local password check (20).
pub const MEDIATOR_PRIORITY: i32 = 30;

/// Prior error codes a successful exchange may override.
const OVERRIDABLE_CODES: [&str; 3] = [
    codes::AUTHENTICATION_FAILED,
    codes::INVALID_EMAIL,
    codes::INVALID_PASSWORD,
];

pub struct LoginMediator {
    client: Arc<dyn IdentityClient>,
    store: Arc<dyn UserStore>,
}

impl LoginMediator {
    pub fn new(client: Arc<dyn IdentityClient>, store: Arc<dyn UserStore>) -> Self {
        Self { client, store }
    }

    /// Register the authenticate filter and the logout listener.
    pub fn register(self: &Arc<Self>, pipeline: &mut AuthPipeline) {
        pipeline
            .add_authenticate(MEDIATOR_PRIORITY, self.clone())
            .add_logout(MEDIATOR_PRIORITY, self.clone());
    }

    /// Mediate one login attempt. See the module docs for the decision order.
    pub async fn authenticate(
        &self,
        current: AuthOutcome,
        identifier: &str,
        secret: &Secret<String>,
    ) -> AuthOutcome {
        let login_by_email = identifier.contains('@');
        let resolved = current.user().cloned();

        if resolved.is_none() && !login_by_email {
            debug!("no local user and not an email login, nothing to mediate");
            return current;
        }

        if let AuthOutcome::Error(err) = &current {
            if !OVERRIDABLE_CODES.contains(&err.code.as_str()) {
                debug!(code = %err.code, "passing through unrelated error");
                return current;
            }
        }

        let email = if login_by_email {
            identifier.to_owned()
        } else {
            let Some(user) = resolved.as_ref() else {
                return current;
            };
            user.email.clone()
        };

        if let Some(user) = &resolved {
            if self.has_fresh_token(user.id).await {
                debug!(user_id = %user.id, "cached remote token still valid");
                metrics::record_cache_hit();
                return current;
            }
        }

        // A locally known user is exchanged by email alone
        let password = if resolved.is_some() {
            Secret::empty()
        } else {
            secret.clone()
        };

        let (identity, token) = match self.client.login(&email, &password).await {
            Ok(LoginOutcome::Authenticated { identity, token }) => {
                metrics::record_exchange("authenticated");
                (identity, token)
            }
            Ok(LoginOutcome::Rejected(remote)) => {
                metrics::record_exchange("rejected");
                return match resolved {
                    Some(user) => {
                        debug!(
                            user_id = %user.id,
                            code = %remote.code,
                            "remote login rejected, keeping local user"
                        );
                        current
                    }
                    None => {
                        info!(code = %remote.code, "remote login rejected");
                        AuthOutcome::Error(AuthError::new(remote.code, remote.message))
                    }
                };
            }
            Err(e) => {
                metrics::record_exchange("transport_error");
                warn!(error = %e, "remote login exchange failed, keeping prior result");
                return current;
            }
        };

        let target = match resolved {
            Some(user) => user,
            None => match self.store.find_by_email(&email).await {
                Some(user) => {
                    info!(
                        user_id = %user.id,
                        remote_user_id = identity.id,
                        "bound remote identity to local user by email"
                    );
                    user
                }
                None => match self.provision(&identity, &email, secret).await {
                    Some(user) => user,
                    None => return current,
                },
            },
        };

        self.store_remote_session(target.id, &identity, &token).await;
        AuthOutcome::User(target)
    }

    /// Drop the session user's cached token. Idempotent.
    pub async fn clear_cached_token(&self, session: &dyn CurrentUser) {
        let Some(user_id) = session.current_user_id() else {
            return;
        };
        match self.store.delete_metadata(user_id, REMOTE_TOKEN_KEY).await {
            Ok(()) => debug!(%user_id, "cleared cached remote token"),
            Err(e) => warn!(%user_id, error = %e, "failed to clear cached remote token"),
        }
    }

    /// Freemius user id of the session user.
    pub async fn get_remote_user_id(&self, session: &dyn CurrentUser) -> Option<u64> {
        let user_id = session.current_user_id()?;
        let value = self.store.get_metadata(user_id, REMOTE_USER_ID_KEY).await?;
        numeric_id(&value)
    }

    /// Cached Freemius token of the session user, expired or not.
    pub async fn get_cached_token(&self, session: &dyn CurrentUser) -> Option<RemoteToken> {
        let user_id = session.current_user_id()?;
        let value = self.store.get_metadata(user_id, REMOTE_TOKEN_KEY).await?;
        decode_token(value)
    }

    async fn has_fresh_token(&self, user_id: UserId) -> bool {
        let has_remote_id = self
            .store
            .get_metadata(user_id, REMOTE_USER_ID_KEY)
            .await
            .as_ref()
            .and_then(numeric_id)
            .is_some();
        if !has_remote_id {
            return false;
        }

        match self.store.get_metadata(user_id, REMOTE_TOKEN_KEY).await {
            Some(value) => decode_token(value).is_some_and(|t| t.is_valid_at(now_secs())),
            None => false,
        }
    }

    /// Create a local account for a remote identity with no local match.
    async fn provision(
        &self,
        identity: &RemoteIdentity,
        email: &str,
        secret: &Secret<String>,
    ) -> Option<LocalUser> {
        let username = unique_username(
            self.store.as_ref(),
            &base_username(identity),
            &identity.email,
        )
        .await;

        let user = match self.store.create(&username, secret, email).await {
            Ok(user) => user,
            Err(e) => {
                warn!(username = %username, error = %e, "failed to provision local user");
                return None;
            }
        };

        if let Err(e) = self
            .store
            .assign_roles(user.id, &[DEFAULT_ROLE, MARKETPLACE_ROLE])
            .await
        {
            warn!(user_id = %user.id, error = %e, "failed to assign roles to provisioned user");
        }

        metrics::record_user_provisioned();
        info!(
            user_id = %user.id,
            username = %username,
            remote_user_id = identity.id,
            "provisioned local user"
        );

        let user_id = user.id;
        Some(self.store.find_by_id(user_id).await.unwrap_or(user))
    }

    /// Write the token and remote id. The token is rolled back if the id
    /// cannot be written, so neither is left without the other.
    async fn store_remote_session(
        &self,
        user_id: UserId,
        identity: &RemoteIdentity,
        token: &RemoteToken,
    ) {
        let token_value = match serde_json::to_value(token) {
            Ok(value) => value,
            Err(e) => {
                warn!(%user_id, error = %e, "failed to encode remote token");
                return;
            }
        };

        if let Err(e) = self
            .store
            .set_metadata(user_id, REMOTE_TOKEN_KEY, token_value)
            .await
        {
            warn!(%user_id, error = %e, "failed to cache remote token");
            return;
        }

        if let Err(e) = self
            .store
            .set_metadata(user_id, REMOTE_USER_ID_KEY, Value::from(identity.id))
            .await
        {
            warn!(%user_id, error = %e, "failed to store remote user id, dropping cached token");
            if let Err(e) = self.store.delete_metadata(user_id, REMOTE_TOKEN_KEY).await {
                warn!(%user_id, error = %e, "failed to drop cached token");
            }
            return;
        }

        debug!(
            %user_id,
            remote_user_id = identity.id,
            expires = token.expires,
            "cached remote token"
        );
    }
}

impl AuthenticateHook for LoginMediator {
    fn authenticate<'a>(
        &'a self,
        prior: AuthOutcome,
        identifier: &'a str,
        secret: &'a Secret<String>,
    ) -> BoxFuture<'a, AuthOutcome> {
        Box::pin(LoginMediator::authenticate(self, prior, identifier, secret))
    }
}

impl LogoutHook for LoginMediator {
    fn on_logout<'a>(&'a self, session: &'a dyn CurrentUser) -> BoxFuture<'a, ()> {
        Box::pin(self.clear_cached_token(session))
    }
}

/// Numbers and numeric strings both count as a remote id.
fn numeric_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Empty values (null, "", {}) are treated as no token.
fn decode_token(value: Value) -> Option<RemoteToken> {
    let empty = match &value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
