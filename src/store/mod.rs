//! # Secret Store
//!
//! Abstract interface for the managed secret store that drives rotation.
//!
//! The rotator only needs four capabilities from the store: write a version
//! under a request token, read a version by token, list versions with their
//! staging labels, and move a staging label from one version to another.
//! Any secret-management backend implementing [`SecretStore`] is a valid
//! collaborator.
//!
//! - `aws`: AWS Secrets Manager
//! - `memory`: in-process store used by tests and the `memory` backend

use crate::error::StoreError;
use crate::secret_value::SecretValue;
use async_trait::async_trait;

pub mod aws;
pub mod memory;

pub use aws::AwsSecretsManagerStore;
pub use memory::InMemorySecretStore;

/// Outcome of [`SecretStore::put_version`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new version was written
    Created,
    /// A version already existed under the token; nothing was written
    AlreadyExists,
}

/// A version as reported by [`SecretStore::list_versions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSummary {
    /// Version identifier (the request token that created it)
    pub token: String,
    /// Staging labels currently attached to the version
    pub labels: Vec<String>,
}

impl VersionSummary {
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Capability surface of a managed secret store
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Write `value` as a new version under `token` carrying `labels`
    ///
    /// Must not overwrite: if `token` already has a version the call is a no-op
    /// returning [`PutOutcome::AlreadyExists`].
    async fn put_version(
        &self,
        secret_id: &str,
        token: &str,
        value: &SecretValue,
        labels: &[&str],
    ) -> Result<PutOutcome, StoreError>;

    /// Read the payload stored under `token`
    ///
    /// Fails with [`StoreError::NotFound`] if the secret or version is absent.
    async fn get_version(&self, secret_id: &str, token: &str) -> Result<SecretValue, StoreError>;

    /// List every version of the secret with its staging labels
    async fn list_versions(&self, secret_id: &str) -> Result<Vec<VersionSummary>, StoreError>;

    /// Atomically move `label` from `from_token` to `to_token`
    ///
    /// When moving the current label the store demotes `from_token` to the
    /// previous label as part of the same call. Fails with
    /// [`StoreError::Conflict`] if `from_token` no longer carries `label`.
    async fn move_label(
        &self,
        secret_id: &str,
        label: &str,
        to_token: &str,
        from_token: &str,
    ) -> Result<(), StoreError>;

    /// Whether [`SecretStore::move_label`] is a single compare-and-swap
    ///
    /// Stores returning `false` get their finish calls serialized per secret.
    fn atomic_label_moves(&self) -> bool {
        true
    }

    /// Backend name used in logs and metrics
    fn backend_name(&self) -> &'static str;
}
