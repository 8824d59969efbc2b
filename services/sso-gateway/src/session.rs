//! In-memory login sessions
//!
//! Tokens are 32 random bytes, base64url encoded, handed to the client once.
//! Only their SHA-256 digest is kept as the map key, so a memory dump does
//! not reveal usable bearer tokens.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use user_store::{CurrentUser, UserId};

/// The authenticated user behind a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
}

impl CurrentUser for Session {
    fn current_user_id(&self) -> Option<UserId> {
        Some(self.user_id)
    }
}

struct SessionEntry {
    user_id: UserId,
    expires_at: Instant,
}

pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a session for `user_id` and return its bearer token.
    pub async fn issue(&self, user_id: UserId) -> String {
        let token = generate_token();
        let now = Instant::now();

        let mut sessions = self.sessions.lock().await;
        // Expired entries are only pruned on issue
        sessions.retain(|_, entry| entry.expires_at > now);
        sessions.insert(
            digest(&token),
            SessionEntry {
                user_id,
                expires_at: now + self.ttl,
            },
        );
        debug!(user_id = %user_id, active = sessions.len(), "session issued");
        token
    }

    pub async fn resolve(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&digest(token))
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| Session {
                user_id: entry.user_id,
            })
    }

    /// End the session. Returns it if it was still live.
    pub async fn revoke(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .remove(&digest(token))
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| Session {
                user_id: entry.user_id,
            })
    }

    pub async fn active(&self) -> usize {
        let now = Instant::now();
        let sessions = self.sessions.lock().await;
        sessions.values().filter(|e| e.expires_at > now).count()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
