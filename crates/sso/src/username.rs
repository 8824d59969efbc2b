//! Username derivation for provisioned accounts

use freemius_api::RemoteIdentity;
use user_store::UserStore;

/// Longest base name kept before numeric suffixes are appended.
const MAX_BASE_LEN: usize = 50;

/// `first.last` in lowercase, or just `first` when there is no last name.
/// Falls back to the local part of the email when the name is empty.
pub fn base_username(identity: &RemoteIdentity) -> String {
    let name = match identity.last.as_deref() {
        Some(last) if !last.is_empty() => format!("{}.{}", identity.first, last),
        _ => identity.first.clone(),
    }
    .to_lowercase();

    if name.is_empty() {
        email_local_part(&identity.email).to_owned()
    } else {
        name
    }
}

/// Everything before the first `@`.
pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or_default()
}

/// Sanitize `base` and append the smallest numeric suffix (none, 1, 2, ...)
/// that the store does not already hold.
///
/// When sanitizing leaves no letters or digits, the sanitized local part of
/// `fallback_email` is used as the base instead.
pub async fn unique_username(store: &dyn UserStore, base: &str, fallback_email: &str) -> String {
    let mut base = store.sanitize_username(base);
    if !base.chars().any(|c| c.is_ascii_alphanumeric()) {
        base = store.sanitize_username(email_local_part(fallback_email));
    }
    let base: String = base.chars().take(MAX_BASE_LEN).collect();

    let mut suffix: u64 = 0;
    loop {
        let candidate = if suffix == 0 {
            base.clone()
        } else {
            format!("{base}{suffix}")
        };
        if !store.username_exists(&candidate).await {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use user_store::FileUserStore;

    fn identity(first: &str, last: Option<&str>, email: &str) -> RemoteIdentity {
        RemoteIdentity {
            id: 1,
            email: email.into(),
            first: first.into(),
            last: last.map(str::to_owned),
        }
    }

    #[test]
    fn base_joins_first_and_last_lowercased() {
        assert_eq!(
            base_username(&identity("Jane", Some("Doe"), "jane@example.com")),
            "jane.doe"
        );
    }

    #[test]
    fn base_omits_missing_or_empty_last_name() {
        assert_eq!(base_username(&identity("Jane", None, "j@x.io")), "jane");
        assert_eq!(base_username(&identity("Jane", Some(""), "j@x.io")), "jane");
    }

    #[test]
    fn base_falls_back_to_email_local_part() {
        assert_eq!(
            base_username(&identity("", None, "JDoe@example.com")),
            "JDoe"
        );
    }

    #[test]
    fn local_part_without_at_is_whole_string() {
        assert_eq!(email_local_part("nobody"), "nobody");
        assert_eq!(email_local_part("a@b@c"), "a");
    }

    #[tokio::test]
    async fn suffix_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileUserStore::load(dir.path().join("users.json"))
            .await
            .unwrap();
        store.create("jane", &Secret::from("pw"), "a@x.io").await.unwrap();
        store.create("jane1", &Secret::from("pw"), "b@x.io").await.unwrap();

        assert_eq!(unique_username(&store, "jane", "jane@x.io").await, "jane2");
        assert_eq!(unique_username(&store, "john", "john@x.io").await, "john");
    }

    #[tokio::test]
    async fn unsanitizable_base_uses_email_local_part() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileUserStore::load(dir.path().join("users.json"))
            .await
            .unwrap();

        assert_eq!(unique_username(&store, "李.王", "li.wang@x.io").await, "li.wang");
    }

    #[tokio::test]
    async fn long_bases_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileUserStore::load(dir.path().join("users.json"))
            .await
            .unwrap();

        let name = unique_username(&store, &"a".repeat(80), "a@x.io").await;
        assert_eq!(name.len(), MAX_BASE_LEN);
    }
}
