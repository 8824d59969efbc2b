//! Login exchange against the Freemius API
//!
//! A single form-encoded POST carrying the user's email and password plus the
//! store's developer credentials. The HTTP status is not inspected: Freemius
//! reports rejected credentials as a JSON error body, so the body is decoded
//! whatever the status line says.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use tracing::debug;

use crate::constants::{LOCAL_API_ROOT, LOGIN_PATH, PRODUCTION_API_ROOT};
use crate::error::{Error, Result};
use crate::login::{LoginOutcome, parse_login_response};

/// Store-level credentials sent with every login exchange.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub store_id: u64,
    pub developer_id: u64,
    pub developer_secret_key: Secret<String>,
    /// Target the local development API instead of production
    pub use_local_api: bool,
}

impl ApiCredentials {
    /// API root selected by `use_local_api`.
    pub fn api_root(&self) -> &'static str {
        if self.use_local_api {
            LOCAL_API_ROOT
        } else {
            PRODUCTION_API_ROOT
        }
    }
}

/// Remote credential exchange.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn IdentityClient>`), so tests can substitute a scripted client.
pub trait IdentityClient: Send + Sync {
    /// Exchange an email and password for a Freemius identity and token.
    ///
    /// `Err` means the exchange never produced a decodable answer (network
    /// failure, timeout, garbage body). A rejection by Freemius is
    /// `Ok(LoginOutcome::Rejected)`.
    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<LoginOutcome>> + Send + 'a>>;
}

/// `IdentityClient` backed by reqwest.
///
/// The request timeout is owned by the `reqwest::Client` passed in.
pub struct HttpIdentityClient {
    http: reqwest::Client,
    credentials: ApiCredentials,
    login_url: String,
}

impl HttpIdentityClient {
    pub fn new(http: reqwest::Client, credentials: ApiCredentials) -> Self {
        let login_url = format!("{}{}", credentials.api_root(), LOGIN_PATH);
        Self {
            http,
            credentials,
            login_url,
        }
    }

    /// Override the API root (self-hosted proxies, test servers).
    pub fn with_api_root(mut self, api_root: &str) -> Self {
        self.login_url = format!("{}{}", api_root.trim_end_matches('/'), LOGIN_PATH);
        self
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }
}

impl IdentityClient for HttpIdentityClient {
    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<LoginOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let store_id = self.credentials.store_id.to_string();
            let developer_id = self.credentials.developer_id.to_string();

            let response = self
                .http
                .post(&self.login_url)
                .form(&[
                    ("email", email),
                    ("password", password.expose().as_str()),
                    ("store_id", store_id.as_str()),
                    ("developer_id", developer_id.as_str()),
                    (
                        "developer_secret_key",
                        self.credentials.developer_secret_key.expose().as_str(),
                    ),
                ])
                .send()
                .await
                .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| Error::Http(format!("reading login response failed: {e}")))?;

            debug!(%status, bytes = body.len(), "login endpoint responded");

            parse_login_response(&body).map_err(|e| match e {
                Error::Decode(msg) => Error::Decode(format!("status {status}: {msg}")),
                other => other,
            })
        })
    }
}
