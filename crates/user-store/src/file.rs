//! JSON-file user store
//!
//! Keeps all users in one JSON document. Every write rewrites the document
//! atomically (temp file + rename) while holding a tokio Mutex, so a single
//! metadata update is never observed half-written and concurrent writers
//! never interleave.
//!
//! The file holds password hashes and remote access tokens; it is created
//! with 0600 permissions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::password;
use crate::sanitize::sanitize_username;
use crate::store::{BoxFuture, UserStore};
use crate::user::{LocalUser, UserId};

/// Longest accepted username, in characters.
const MAX_USERNAME_LEN: usize = 60;

/// A user as persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    username: String,
    email: String,
    password_hash: String,
    #[serde(default)]
    roles: Vec<String>,
    registered_at: u64,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

impl StoredUser {
    fn snapshot(&self, id: u64) -> LocalUser {
        LocalUser {
            id: UserId(id),
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            registered_at: self.registered_at,
        }
    }
}

/// On-disk document.
#[derive(Debug, Serialize, Deserialize)]
struct UserFile {
    next_id: u64,
    users: BTreeMap<u64, StoredUser>,
}

impl UserFile {
    fn find(&self, predicate: impl Fn(&StoredUser) -> bool) -> Option<LocalUser> {
        self.users
            .iter()
            .find(|(_, user)| predicate(user))
            .map(|(id, user)| user.snapshot(*id))
    }
}

/// File-backed `UserStore`.
pub struct FileUserStore {
    path: PathBuf,
    state: Mutex<UserFile>,
}

impl FileUserStore {
    /// Load users from the given file path.
    ///
    /// A missing file is created as an empty store.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading user file: {e}")))?;
            let file: UserFile = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing user file: {e}")))?;
            info!(path = %path.display(), users = file.users.len(), "loaded users");
            file
        } else {
            info!(path = %path.display(), "user file not found, starting with empty store");
            let file = UserFile {
                next_id: 1,
                users: BTreeMap::new(),
            };
            write_atomic(&path, &file).await?;
            file
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.state.lock().await.users.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn create_user(
        &self,
        username: &str,
        password: &Secret<String>,
        email: &str,
    ) -> Result<LocalUser> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::Rejected("empty_user_login: username is empty".into()));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(Error::Rejected(format!(
                "user_login_too_long: username exceeds {MAX_USERNAME_LEN} characters"
            )));
        }
        if sanitize_username(username) != username {
            return Err(Error::Rejected(format!(
                "invalid_username: {username:?} contains disallowed characters"
            )));
        }

        // Hash outside the lock; argon2 is deliberately slow
        let to_hash = password.clone();
        let password_hash =
            tokio::task::spawn_blocking(move || password::hash_password(to_hash.expose()))
                .await
                .map_err(|e| Error::Hash(format!("hashing task failed: {e}")))??;

        let mut state = self.state.lock().await;
        if state
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .is_some()
        {
            return Err(Error::Rejected(format!(
                "existing_user_login: username {username} is taken"
            )));
        }
        if !email.is_empty() && state.find(|u| u.email.eq_ignore_ascii_case(email)).is_some() {
            return Err(Error::Rejected(format!(
                "existing_user_email: {email} belongs to another account"
            )));
        }

        let id = state.next_id.max(1);
        let previous_next_id = state.next_id;
        let user = StoredUser {
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash,
            roles: Vec::new(),
            registered_at: now_secs(),
            metadata: BTreeMap::new(),
        };
        let snapshot = user.snapshot(id);
        state.users.insert(id, user);
        state.next_id = id + 1;
        // Memory only keeps what reached disk
        if let Err(e) = write_atomic(&self.path, &state).await {
            state.users.remove(&id);
            state.next_id = previous_next_id;
            return Err(e);
        }

        info!(user_id = id, username, "created user");
        Ok(snapshot)
    }

    /// Apply `update` to one stored user and persist. The user is restored
    /// to its previous state if the write fails.
    async fn update_user(
        &self,
        id: UserId,
        update: impl FnOnce(&mut StoredUser) -> bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&id.0)
            .ok_or_else(|| Error::NotFound(format!("user {id} not in store")))?;
        let previous = user.clone();
        if !update(user) {
            return Ok(());
        }
        if let Err(e) = write_atomic(&self.path, &state).await {
            state.users.insert(id.0, previous);
            return Err(e);
        }
        Ok(())
    }
}

impl UserStore for FileUserStore {
    fn find_by_id(&self, id: UserId) -> BoxFuture<'_, Option<LocalUser>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.users.get(&id.0).map(|u| u.snapshot(id.0))
        })
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Option<LocalUser>> {
        Box::pin(async move {
            if email.is_empty() {
                return None;
            }
            let state = self.state.lock().await;
            state.find(|u| u.email.eq_ignore_ascii_case(email))
        })
    }

    fn find_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Option<LocalUser>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.find(|u| u.username.eq_ignore_ascii_case(username))
        })
    }

    fn create<'a>(
        &'a self,
        username: &'a str,
        password: &'a Secret<String>,
        email: &'a str,
    ) -> BoxFuture<'a, Result<LocalUser>> {
        Box::pin(self.create_user(username, password, email))
    }

    fn assign_roles<'a>(&'a self, id: UserId, roles: &'a [&'a str]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.update_user(id, |user| {
                let mut assigned: Vec<String> = Vec::with_capacity(roles.len());
                for role in roles {
                    if !assigned.iter().any(|r| r.as_str() == *role) {
                        assigned.push((*role).to_owned());
                    }
                }
                user.roles = assigned;
                true
            })
            .await?;
            debug!(user_id = %id, ?roles, "assigned roles");
            Ok(())
        })
    }

    fn get_metadata<'a>(&'a self, id: UserId, key: &'a str) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state
                .users
                .get(&id.0)
                .and_then(|u| u.metadata.get(key).cloned())
        })
    }

    fn set_metadata<'a>(
        &'a self,
        id: UserId,
        key: &'a str,
        value: Value,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.update_user(id, |user| {
                user.metadata.insert(key.to_owned(), value);
                true
            })
            .await?;
            debug!(user_id = %id, key, "set metadata");
            Ok(())
        })
    }

    fn delete_metadata<'a>(&'a self, id: UserId, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let result = self
                .update_user(id, |user| user.metadata.remove(key).is_some())
                .await;
            match result {
                // Deleting from a user that no longer exists leaves nothing behind either
                Err(Error::NotFound(msg)) => {
                    warn!(user_id = %id, key, error = %msg, "metadata delete for unknown user");
                    Ok(())
                }
                other => other,
            }
        })
    }

    fn username_exists<'a>(&'a self, username: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.find_by_username(username).await.is_some() })
    }

    fn verify_password<'a>(
        &'a self,
        id: UserId,
        password: &'a Secret<String>,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let hash = {
                let state = self.state.lock().await;
                match state.users.get(&id.0) {
                    Some(user) => user.password_hash.clone(),
                    None => return false,
                }
            };
            let candidate = password.clone();
            tokio::task::spawn_blocking(move || {
                password::verify_password(&hash, candidate.expose())
            })
            .await
            .unwrap_or(false)
        })
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Write the user document atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets permissions to 0600 since the file contains password
/// hashes and access tokens.
async fn write_atomic(path: &Path, data: &UserFile) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing users: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("user file path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".users.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp user file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting user file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp user file: {e}")))?;

    debug!(path = %path.display(), "persisted users");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store(dir: &tempfile::TempDir) -> FileUserStore {
        FileUserStore::load(dir.path().join("users.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        assert!(!path.exists());
        let store = FileUserStore::load(path.clone()).await.unwrap();
        assert!(store.is_empty().await);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn users_and_metadata_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let store = FileUserStore::load(path.clone()).await.unwrap();
        let user = store
            .create("jane.doe", &Secret::from("pw"), "jane@example.com")
            .await
            .unwrap();
        store
            .set_metadata(user.id, "remote_user_id", json!(42))
            .await
            .unwrap();

        let reloaded = FileUserStore::load(path).await.unwrap();
        let found = reloaded.find_by_email("jane@example.com").await.unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.username, "jane.doe");
        assert_eq!(
            reloaded.get_metadata(user.id, "remote_user_id").await,
            Some(json!(42))
        );
        assert!(reloaded.verify_password(user.id, &Secret::from("pw")).await);
    }

    /// A store whose directory has been removed, so every write fails.
    async fn unwritable_store_with_user() -> (tempfile::TempDir, FileUserStore, LocalUser) {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        let store = FileUserStore::load(data.join("users.json")).await.unwrap();
        let user = store
            .create("jane", &Secret::from("pw"), "jane@example.com")
            .await
            .unwrap();
        store
            .set_metadata(user.id, "remote_user_id", json!(1))
            .await
            .unwrap();
        std::fs::remove_dir_all(&data).unwrap();
        (dir, store, user)
    }

    #[tokio::test]
    async fn failed_create_leaves_no_user_behind() {
        let (_dir, store, _) = unwritable_store_with_user().await;

        let result = store
            .create("john", &Secret::from("pw"), "john@example.com")
            .await;

        assert!(matches!(result, Err(Error::Io(_))), "got: {result:?}");
        assert_eq!(store.len().await, 1);
        assert!(store.find_by_email("john@example.com").await.is_none());
        assert!(!store.username_exists("john").await);
    }

    #[tokio::test]
    async fn failed_create_does_not_consume_an_id() {
        let (dir, store, _) = unwritable_store_with_user().await;
        assert!(store.create("john", &Secret::from("pw"), "j@x.io").await.is_err());

        std::fs::create_dir(dir.path().join("data")).unwrap();
        let john = store
            .create("john", &Secret::from("pw"), "j@x.io")
            .await
            .unwrap();
        assert_eq!(john.id, UserId(2));
    }

    #[tokio::test]
    async fn failed_metadata_writes_keep_previous_values() {
        let (_dir, store, user) = unwritable_store_with_user().await;

        assert!(
            store
                .set_metadata(user.id, "remote_user_id", json!(2))
                .await
                .is_err()
        );
        assert_eq!(
            store.get_metadata(user.id, "remote_user_id").await,
            Some(json!(1))
        );

        assert!(
            store
                .set_metadata(user.id, "remote_token", json!({"value": "t"}))
                .await
                .is_err()
        );
        assert_eq!(store.get_metadata(user.id, "remote_token").await, None);

        assert!(
            store
                .delete_metadata(user.id, "remote_user_id")
                .await
                .is_err()
        );
        assert_eq!(
            store.get_metadata(user.id, "remote_user_id").await,
            Some(json!(1))
        );

        assert!(store.assign_roles(user.id, &["subscriber"]).await.is_err());
        let reread = store.find_by_id(user.id).await.unwrap();
        assert!(reread.roles.is_empty());
    }

    #[tokio::test]
    async fn ids_are_sequential_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let a = store.create("a", &Secret::from("x"), "a@x.io").await.unwrap();
        let b = store.create("b", &Secret::from("x"), "b@x.io").await.unwrap();
        assert_eq!(a.id, UserId(1));
        assert_eq!(b.id, UserId(2));
    }

    #[tokio::test]
    async fn lookups_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store
            .create("Jane", &Secret::from("pw"), "Jane@Example.com")
            .await
            .unwrap();

        assert!(store.find_by_email("jane@example.com").await.is_some());
        assert!(store.find_by_username("JANE").await.is_some());
        assert!(store.username_exists("jane").await);
        assert!(!store.username_exists("jane1").await);
        assert!(store.find_by_email("").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store
            .create("jane", &Secret::from("pw"), "jane@example.com")
            .await
            .unwrap();

        let dup_login = store
            .create("jane", &Secret::from("pw"), "other@example.com")
            .await;
        assert!(
            matches!(dup_login, Err(Error::Rejected(msg)) if msg.starts_with("existing_user_login"))
        );

        let dup_email = store
            .create("jane2", &Secret::from("pw"), "JANE@example.com")
            .await;
        assert!(
            matches!(dup_email, Err(Error::Rejected(msg)) if msg.starts_with("existing_user_email"))
        );

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn invalid_usernames_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        for username in ["", "   ", "jane!", &"x".repeat(61)] {
            let result = store.create(username, &Secret::from("pw"), "").await;
            assert!(
                matches!(result, Err(Error::Rejected(_))),
                "{username:?} must be rejected, got {result:?}"
            );
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn assign_roles_replaces_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let user = store.create("jane", &Secret::from("pw"), "j@x.io").await.unwrap();

        store
            .assign_roles(user.id, &["subscriber", "edd_subscriber", "subscriber"])
            .await
            .unwrap();
        let found = store.find_by_id(user.id).await.unwrap();
        assert_eq!(found.roles, vec!["subscriber", "edd_subscriber"]);

        store.assign_roles(user.id, &["editor"]).await.unwrap();
        let found = store.find_by_id(user.id).await.unwrap();
        assert_eq!(found.roles, vec!["editor"]);
    }

    #[tokio::test]
    async fn assign_roles_for_unknown_user_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let result = store.assign_roles(UserId(99), &["subscriber"]).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn metadata_overwrite_and_idempotent_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let user = store.create("jane", &Secret::from("pw"), "j@x.io").await.unwrap();

        store
            .set_metadata(user.id, "remote_token", json!({"value": "a", "expires": 1}))
            .await
            .unwrap();
        store
            .set_metadata(user.id, "remote_token", json!({"value": "b", "expires": 2}))
            .await
            .unwrap();
        assert_eq!(
            store.get_metadata(user.id, "remote_token").await,
            Some(json!({"value": "b", "expires": 2}))
        );

        store.delete_metadata(user.id, "remote_token").await.unwrap();
        store.delete_metadata(user.id, "remote_token").await.unwrap();
        assert_eq!(store.get_metadata(user.id, "remote_token").await, None);

        // Unknown users have no metadata to delete
        store.delete_metadata(UserId(99), "remote_token").await.unwrap();
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_do_not_verify() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let user = store.create("jane", &Secret::from("pw"), "j@x.io").await.unwrap();

        assert!(!store.verify_password(user.id, &Secret::from("nope")).await);
        assert!(!store.verify_password(UserId(99), &Secret::from("pw")).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = FileUserStore::load(path.clone()).await.unwrap();
        store.create("jane", &Secret::from("pw"), "j@x.io").await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "user file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_creates_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = std::sync::Arc::new(FileUserStore::load(path.clone()).await.unwrap());

        let mut handles = vec![];
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .create(&format!("user{i}"), &Secret::from("pw"), &format!("u{i}@x.io"))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.len().await, 8);
        let reloaded = FileUserStore::load(path).await.unwrap();
        assert_eq!(reloaded.len().await, 8);
    }
}
