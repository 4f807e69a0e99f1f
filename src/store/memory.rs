//! # In-Memory Secret Store
//!
//! Versioned secret store with staging labels, kept entirely in process memory.
//!
//! Storage layout per secret: versions in insertion order (oldest first), each
//! with an immutable payload and its set of staging labels.
//!
//! Attaching a label to a version detaches it from every other version and
//! strips any other label from the target, so a label points at one version and
//! labels stay mutually exclusive per version. Moving the current label demotes
//! the vacated version to previous inside the same write lock.
//!
//! This is ephemeral - data does not persist across restarts.
//! Thread-safe using `Arc<RwLock>` for concurrent access.

use super::{PutOutcome, SecretStore, VersionSummary};
use crate::constants::{LABEL_CURRENT, LABEL_PREVIOUS};
use crate::error::StoreError;
use crate::observability::metrics;
use crate::secret_value::SecretValue;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

const BACKEND: &str = "memory";

#[derive(Debug, Clone)]
struct StoredVersion {
    token: String,
    value: SecretValue,
    labels: BTreeSet<String>,
}

/// Secret entry containing all versions
/// Versions are stored in order (oldest first)
#[derive(Debug, Clone, Default)]
struct SecretEntry {
    versions: Vec<StoredVersion>,
}

impl SecretEntry {
    fn find(&self, token: &str) -> Option<&StoredVersion> {
        self.versions.iter().find(|v| v.token == token)
    }

    fn holders<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a StoredVersion> + 'a {
        self.versions.iter().filter(move |v| v.labels.contains(label))
    }

    fn push(&mut self, token: &str, value: SecretValue, labels: &[&str]) {
        self.versions.push(StoredVersion {
            token: token.to_string(),
            value,
            labels: BTreeSet::new(),
        });
        for label in labels {
            self.attach(label, token);
        }
    }

    fn attach(&mut self, label: &str, token: &str) {
        for version in &mut self.versions {
            if version.token == token {
                version.labels.clear();
                version.labels.insert(label.to_string());
            } else {
                version.labels.remove(label);
            }
        }
    }

    fn summaries(&self) -> Vec<VersionSummary> {
        self.versions
            .iter()
            .map(|version| VersionSummary {
                token: version.token.clone(),
                labels: version.labels.iter().cloned().collect(),
            })
            .collect()
    }
}

/// In-memory [`SecretStore`] implementation
#[derive(Clone, Debug, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, SecretEntry>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a version directly, bypassing rotation (used to seed a secret)
    ///
    /// Overwrites nothing: an existing token is left untouched.
    pub async fn seed_version(&self, secret_id: &str, token: &str, value: &str, labels: &[&str]) {
        let mut secrets = self.secrets.write().await;
        let entry = secrets.entry(secret_id.to_string()).or_default();
        if entry.find(token).is_some() {
            return;
        }
        entry.push(token, SecretValue::new(value), labels);
    }

    /// Force a label onto a version without any of the move semantics
    ///
    /// Only useful to reproduce a store that already violates its label
    /// invariant (two current versions after an external bug).
    pub async fn force_label(&self, secret_id: &str, token: &str, label: &str) {
        let mut secrets = self.secrets.write().await;
        if let Some(version) = secrets
            .get_mut(secret_id)
            .and_then(|entry| entry.versions.iter_mut().find(|v| v.token == token))
        {
            version.labels.insert(label.to_string());
        }
    }

    /// Versions and labels of a secret, oldest first
    pub async fn snapshot(&self, secret_id: &str) -> Option<Vec<VersionSummary>> {
        let secrets = self.secrets.read().await;
        secrets.get(secret_id).map(SecretEntry::summaries)
    }

    /// Token currently carrying `label`, if any
    pub async fn token_with_label(&self, secret_id: &str, label: &str) -> Option<String> {
        let secrets = self.secrets.read().await;
        secrets
            .get(secret_id)
            .and_then(|entry| entry.holders(label).next())
            .map(|version| version.token.clone())
    }

    /// Number of versions stored for a secret
    pub async fn version_count(&self, secret_id: &str) -> usize {
        let secrets = self.secrets.read().await;
        secrets.get(secret_id).map_or(0, |entry| entry.versions.len())
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn put_version(
        &self,
        secret_id: &str,
        token: &str,
        value: &SecretValue,
        labels: &[&str],
    ) -> Result<PutOutcome, StoreError> {
        metrics::record_store_operation(BACKEND, "put_version");
        let mut secrets = self.secrets.write().await;
        let entry = secrets.entry(secret_id.to_string()).or_default();

        if entry.find(token).is_some() {
            debug!(
                secret.id = secret_id,
                rotation.token = token,
                "Version already present, skipping write"
            );
            return Ok(PutOutcome::AlreadyExists);
        }

        entry.push(token, value.clone(), labels);
        debug!(
            secret.id = secret_id,
            rotation.token = token,
            labels = ?labels,
            "Added version"
        );
        Ok(PutOutcome::Created)
    }

    async fn get_version(&self, secret_id: &str, token: &str) -> Result<SecretValue, StoreError> {
        metrics::record_store_operation(BACKEND, "get_version");
        let secrets = self.secrets.read().await;
        secrets
            .get(secret_id)
            .and_then(|entry| entry.find(token))
            .map(|version| version.value.clone())
            .ok_or_else(|| StoreError::NotFound {
                secret_id: secret_id.to_string(),
                token: token.to_string(),
            })
    }

    async fn list_versions(&self, secret_id: &str) -> Result<Vec<VersionSummary>, StoreError> {
        metrics::record_store_operation(BACKEND, "list_versions");
        let secrets = self.secrets.read().await;
        secrets
            .get(secret_id)
            .map(SecretEntry::summaries)
            .ok_or_else(|| StoreError::SecretNotFound {
                secret_id: secret_id.to_string(),
            })
    }

    async fn move_label(
        &self,
        secret_id: &str,
        label: &str,
        to_token: &str,
        from_token: &str,
    ) -> Result<(), StoreError> {
        metrics::record_store_operation(BACKEND, "move_label");
        let mut secrets = self.secrets.write().await;
        let entry = secrets
            .get_mut(secret_id)
            .filter(|entry| entry.find(to_token).is_some())
            .ok_or_else(|| StoreError::NotFound {
                secret_id: secret_id.to_string(),
                token: to_token.to_string(),
            })?;

        let from_holds_label = entry
            .find(from_token)
            .is_some_and(|version| version.labels.contains(label));
        if !from_holds_label {
            let holder = entry.holders(label).next().map(|v| v.token.clone());
            metrics::increment_store_operation_errors(BACKEND);
            return Err(StoreError::Conflict {
                secret_id: secret_id.to_string(),
                label: label.to_string(),
                reason: match holder {
                    Some(token) => format!("label is attached to {token}, not {from_token}"),
                    None => format!("label is not attached to {from_token}"),
                },
            });
        }

        if to_token == from_token {
            return Ok(());
        }

        entry.attach(label, to_token);
        if label == LABEL_CURRENT {
            entry.attach(LABEL_PREVIOUS, from_token);
        }
        debug!(
            secret.id = secret_id,
            label = label,
            from = from_token,
            to = to_token,
            "Moved staging label"
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LABEL_PENDING;

    fn labels_of(versions: &[VersionSummary], token: &str) -> Vec<String> {
        versions
            .iter()
            .find(|v| v.token == token)
            .map(|v| v.labels.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_put_version_does_not_overwrite() {
        let store = InMemorySecretStore::new();
        let first = SecretValue::new("first");
        let second = SecretValue::new("second");

        let outcome = store
            .put_version("db-pass", "v2", &first, &[LABEL_PENDING])
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::Created);

        let outcome = store
            .put_version("db-pass", "v2", &second, &[LABEL_PENDING])
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::AlreadyExists);

        let value = store.get_version("db-pass", "v2").await.unwrap();
        assert_eq!(value.expose(), "first");
        assert_eq!(store.version_count("db-pass").await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_version_is_not_found() {
        let store = InMemorySecretStore::new();
        store.seed_version("db-pass", "v1", "one", &[LABEL_CURRENT]).await;

        let err = store.get_version("db-pass", "v9").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { ref token, .. } if token == "v9"));
    }

    #[tokio::test]
    async fn test_attaching_pending_moves_it_off_older_version() {
        let store = InMemorySecretStore::new();
        store.seed_version("db-pass", "v1", "one", &[LABEL_CURRENT]).await;
        store.seed_version("db-pass", "v2", "two", &[LABEL_PENDING]).await;
        store
            .put_version("db-pass", "v3", &SecretValue::new("three"), &[LABEL_PENDING])
            .await
            .unwrap();

        let versions = store.snapshot("db-pass").await.unwrap();
        assert!(labels_of(&versions, "v2").is_empty());
        assert_eq!(labels_of(&versions, "v3"), vec![LABEL_PENDING.to_string()]);
        assert_eq!(labels_of(&versions, "v1"), vec![LABEL_CURRENT.to_string()]);
    }

    #[tokio::test]
    async fn test_move_current_demotes_previous_holder() {
        let store = InMemorySecretStore::new();
        store.seed_version("db-pass", "v0", "zero", &[LABEL_PREVIOUS]).await;
        store.seed_version("db-pass", "v1", "one", &[LABEL_CURRENT]).await;
        store.seed_version("db-pass", "v2", "two", &[LABEL_PENDING]).await;

        store
            .move_label("db-pass", LABEL_CURRENT, "v2", "v1")
            .await
            .unwrap();

        let versions = store.snapshot("db-pass").await.unwrap();
        assert!(labels_of(&versions, "v0").is_empty());
        assert_eq!(labels_of(&versions, "v1"), vec![LABEL_PREVIOUS.to_string()]);
        assert_eq!(labels_of(&versions, "v2"), vec![LABEL_CURRENT.to_string()]);
    }

    #[tokio::test]
    async fn test_move_label_from_wrong_version_conflicts() {
        let store = InMemorySecretStore::new();
        store.seed_version("db-pass", "v1", "one", &[LABEL_CURRENT]).await;
        store.seed_version("db-pass", "v2", "two", &[LABEL_PENDING]).await;
        store.seed_version("db-pass", "v3", "three", &[]).await;

        let err = store
            .move_label("db-pass", LABEL_CURRENT, "v2", "v3")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        // Nothing moved
        assert_eq!(
            store.token_with_label("db-pass", LABEL_CURRENT).await.as_deref(),
            Some("v1")
        );
        assert_eq!(
            store.token_with_label("db-pass", LABEL_PENDING).await.as_deref(),
            Some("v2")
        );
    }

    #[tokio::test]
    async fn test_move_label_to_unknown_version_is_not_found() {
        let store = InMemorySecretStore::new();
        store.seed_version("db-pass", "v1", "one", &[LABEL_CURRENT]).await;

        let err = store
            .move_label("db-pass", LABEL_CURRENT, "v2", "v1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_versions_preserves_insertion_order() {
        let store = InMemorySecretStore::new();
        store.seed_version("db-pass", "b", "one", &[]).await;
        store.seed_version("db-pass", "a", "two", &[]).await;

        let tokens: Vec<String> = store
            .list_versions("db-pass")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.token)
            .collect();
        assert_eq!(tokens, vec!["b".to_string(), "a".to_string()]);
    }
}
