//! Login response model
//!
//! The login endpoint answers with one of two JSON shapes, regardless of the
//! HTTP status:
//! 1. `{"error": {"code": ..., "message": ...}}` for rejected credentials
//! 2. `{"user_token": {"person": {...}, "token": {"value": ..., "expires": ...}}}`
//!
//! When both keys are present the error wins.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Freemius user access token.
///
/// `expires` is a unix timestamp in seconds (absolute, not a delta).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteToken {
    pub value: String,
    #[serde(deserialize_with = "u64_from_number_or_string")]
    pub expires: u64,
}

impl RemoteToken {
    /// Whether the token is still usable at `now` (unix seconds).
    pub fn is_valid_at(&self, now: u64) -> bool {
        self.expires > now
    }
}

/// Freemius person record returned on a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteIdentity {
    #[serde(deserialize_with = "u64_from_number_or_string")]
    pub id: u64,
    pub email: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub first: String,
    #[serde(default)]
    pub last: Option<String>,
}

/// Application-level rejection from the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteError {
    #[serde(deserialize_with = "string_from_scalar")]
    pub code: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub message: String,
}

/// Decoded result of a login exchange that reached the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated {
        identity: RemoteIdentity,
        token: RemoteToken,
    },
    Rejected(RemoteError),
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    error: Option<RemoteError>,
    #[serde(default)]
    user_token: Option<UserToken>,
}

#[derive(Deserialize)]
struct UserToken {
    person: RemoteIdentity,
    token: RemoteToken,
}

/// Decode a login response body.
///
/// Returns `Error::Decode` when the body is not JSON or carries neither an
/// `error` nor a `user_token` object.
pub fn parse_login_response(body: &str) -> Result<LoginOutcome> {
    let response: LoginResponse = serde_json::from_str(body)
        .map_err(|e| Error::Decode(format!("malformed login body: {e}")))?;

    match response {
        LoginResponse {
            error: Some(error), ..
        } => Ok(LoginOutcome::Rejected(error)),
        LoginResponse {
            user_token: Some(user_token),
            ..
        } => Ok(LoginOutcome::Authenticated {
            identity: user_token.person,
            token: user_token.token,
        }),
        _ => Err(Error::Decode(
            "login body has neither error nor user_token".into(),
        )),
    }
}

/// Freemius serializes numeric ids and timestamps as either JSON numbers or
/// numeric strings depending on the endpoint version.
fn u64_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn string_or_null<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_from_scalar<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
