//! Credentials lookup for repository access.
//!
//! Fetchers and Git mechanisms look credentials up by repo URL; nothing in
//! the core ever mutates them.

use async_trait::async_trait;

use crate::config::CredentialEntry;

/// Credential material for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Read-only credentials lookup by repository URL.
#[async_trait]
pub trait CredentialsStore: Send + Sync {
    /// Credentials for `repo_url`, or `None` when the repo is anonymous.
    async fn get(&self, repo_url: &str) -> Option<Credentials>;
}

/// Credentials seeded from controller configuration. The longest matching
/// URL prefix wins, so a specific repo entry can shadow a host-wide one.
#[derive(Debug, Default)]
pub struct StaticCredentialsStore {
    entries: Vec<CredentialEntry>,
}

impl StaticCredentialsStore {
    pub fn new(entries: Vec<CredentialEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CredentialsStore for StaticCredentialsStore {
    async fn get(&self, repo_url: &str) -> Option<Credentials> {
        self.entries
            .iter()
            .filter(|e| repo_url.starts_with(&e.url_prefix))
            .max_by_key(|e| e.url_prefix.len())
            .map(|e| Credentials {
                username: e.username.clone(),
                password: e.password.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(prefix: &str, user: &str) -> CredentialEntry {
        CredentialEntry {
            url_prefix: prefix.to_string(),
            username: user.to_string(),
            password: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let store = StaticCredentialsStore::new(vec![
            entry("https://git.example.com", "host-bot"),
            entry("https://git.example.com/team/app.git", "repo-bot"),
        ]);

        let creds = store
            .get("https://git.example.com/team/app.git")
            .await
            .unwrap();
        assert_eq!(creds.username, "repo-bot");

        let creds = store
            .get("https://git.example.com/other/repo.git")
            .await
            .unwrap();
        assert_eq!(creds.username, "host-bot");
    }

    #[tokio::test]
    async fn unknown_repo_is_anonymous() {
        let store = StaticCredentialsStore::new(vec![entry("https://git.example.com", "bot")]);
        assert!(store.get("https://other.example.com/repo.git").await.is_none());
    }
}
