//! Freemius identity API client
//!
//! Exchanges an email + password for the Freemius person record and a user
//! access token. The crate has no knowledge of local users; the login
//! mediator in the `sso` crate decides what to do with the outcome.
//!
//! Flow:
//! 1. Build `ApiCredentials` once from configuration
//! 2. Wrap them in an `HttpIdentityClient`
//! 3. Call `IdentityClient::login()` per login attempt
//! 4. Match on `LoginOutcome` (authenticated vs rejected)

pub mod client;
pub mod constants;
pub mod error;
pub mod login;

pub use client::{ApiCredentials, HttpIdentityClient, IdentityClient};
pub use constants::*;
pub use error::{Error, Result};
pub use login::{LoginOutcome, RemoteError, RemoteIdentity, RemoteToken, parse_login_response};
