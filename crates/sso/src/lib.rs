//! Freemius single sign-on for a local user base
//!
//! The `LoginMediator` sits in the host's authentication pipeline. When a
//! login cannot be satisfied from a cached Freemius token it exchanges the
//! user's credentials with Freemius, binds the returned identity to a local
//! account (matching by email or provisioning a new one) and caches the
//! access token in the user's metadata. On logout it drops the cached token.
//!
//! The pipeline is explicit: hooks are registered into an `AuthPipeline` at
//! startup and the host runs it per request.

pub mod mediator;
pub mod metrics;
pub mod outcome;
pub mod pipeline;
pub mod username;

pub use mediator::{
    DEFAULT_ROLE, LoginMediator, MARKETPLACE_ROLE, MEDIATOR_PRIORITY, REMOTE_TOKEN_KEY,
    REMOTE_USER_ID_KEY,
};
pub use outcome::{AuthError, AuthOutcome, codes};
pub use pipeline::{AuthPipeline, AuthenticateHook, LogoutHook};
