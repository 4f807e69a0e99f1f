//! Common test utilities for rotation integration tests
//!
//! Provides rustls setup, downstream doubles, a deterministic generator,
//! misbehaving store wrappers and the staging label invariant check.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::{bail, Result};
use async_trait::async_trait;
use secret_rotator::constants::{LABEL_CURRENT, LABEL_PENDING, LABEL_PREVIOUS};
use secret_rotator::downstream::{CredentialApplier, CredentialVerifier};
use secret_rotator::error::StoreError;
use secret_rotator::generator::CredentialGenerator;
use secret_rotator::store::{InMemorySecretStore, PutOutcome, SecretStore, VersionSummary};
use secret_rotator::SecretValue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

/// Store seeded with `v1` as the current version of `db-pass`
pub async fn db_pass_store() -> InMemorySecretStore {
    let store = InMemorySecretStore::new();
    store
        .seed_version("db-pass", "v1", "initial-password", &[LABEL_CURRENT])
        .await;
    store
}

/// Labels attached to `token`, empty if the version has none or is missing
pub fn labels_of(versions: &[VersionSummary], token: &str) -> Vec<String> {
    versions
        .iter()
        .find(|v| v.token == token)
        .map(|v| v.labels.clone())
        .unwrap_or_default()
}

/// Assert each rotation label is attached to at most one version
pub async fn assert_label_invariants(store: &InMemorySecretStore, secret_id: &str) {
    let versions = store.snapshot(secret_id).await.unwrap_or_default();
    for label in [LABEL_CURRENT, LABEL_PENDING, LABEL_PREVIOUS] {
        let holders: Vec<&str> = versions
            .iter()
            .filter(|v| v.has_label(label))
            .map(|v| v.token.as_str())
            .collect();
        assert!(
            holders.len() <= 1,
            "{label} is attached to {} versions of {secret_id}: {holders:?}",
            holders.len()
        );
    }
}

/// Applier that records every value it is given
#[derive(Debug, Default)]
pub struct RecordingApplier {
    pub applied: Mutex<Vec<String>>,
}

#[async_trait]
impl CredentialApplier for RecordingApplier {
    async fn apply(&self, _secret_id: &str, value: &SecretValue) -> Result<()> {
        self.applied.lock().unwrap().push(value.expose().to_string());
        Ok(())
    }
}

/// Verifier that records every value it is given and accepts them all
#[derive(Debug, Default)]
pub struct RecordingVerifier {
    pub verified: Mutex<Vec<String>>,
}

#[async_trait]
impl CredentialVerifier for RecordingVerifier {
    async fn verify(&self, _secret_id: &str, value: &SecretValue) -> Result<()> {
        self.verified.lock().unwrap().push(value.expose().to_string());
        Ok(())
    }
}

/// Verifier that always rejects
#[derive(Debug, Default)]
pub struct FailingVerifier {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CredentialVerifier for FailingVerifier {
    async fn verify(&self, _secret_id: &str, _value: &SecretValue) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("authentication failed for candidate credential")
    }
}

/// Applier that never answers within any reasonable timeout
#[derive(Debug, Default)]
pub struct HangingApplier;

#[async_trait]
impl CredentialApplier for HangingApplier {
    async fn apply(&self, _secret_id: &str, _value: &SecretValue) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// Generator returning `candidate-<n>` and counting calls
#[derive(Debug, Default)]
pub struct FixedGenerator {
    pub calls: AtomicUsize,
}

impl CredentialGenerator for FixedGenerator {
    fn generate(&self, _length: usize) -> Result<SecretValue> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SecretValue::new(format!("candidate-{n}")))
    }
}

/// Store wrapper whose `list_versions` stalls past any test timeout
#[derive(Debug, Default)]
pub struct StallingStore {
    pub inner: InMemorySecretStore,
}

#[async_trait]
impl SecretStore for StallingStore {
    async fn put_version(
        &self,
        secret_id: &str,
        token: &str,
        value: &SecretValue,
        labels: &[&str],
    ) -> Result<PutOutcome, StoreError> {
        self.inner.put_version(secret_id, token, value, labels).await
    }

    async fn get_version(&self, secret_id: &str, token: &str) -> Result<SecretValue, StoreError> {
        self.inner.get_version(secret_id, token).await
    }

    async fn list_versions(&self, secret_id: &str) -> Result<Vec<VersionSummary>, StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        self.inner.list_versions(secret_id).await
    }

    async fn move_label(
        &self,
        secret_id: &str,
        label: &str,
        to_token: &str,
        from_token: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .move_label(secret_id, label, to_token, from_token)
            .await
    }

    fn backend_name(&self) -> &'static str {
        "stalling"
    }
}

/// Store wrapper where another writer promotes `racer` right after each listing
///
/// The listing still reports the old holder of the current label, so the
/// rotator's label move races a concurrent promotion.
#[derive(Debug, Default)]
pub struct RacingStore {
    pub inner: InMemorySecretStore,
    pub racer: String,
}

#[async_trait]
impl SecretStore for RacingStore {
    async fn put_version(
        &self,
        secret_id: &str,
        token: &str,
        value: &SecretValue,
        labels: &[&str],
    ) -> Result<PutOutcome, StoreError> {
        self.inner.put_version(secret_id, token, value, labels).await
    }

    async fn get_version(&self, secret_id: &str, token: &str) -> Result<SecretValue, StoreError> {
        self.inner.get_version(secret_id, token).await
    }

    async fn list_versions(&self, secret_id: &str) -> Result<Vec<VersionSummary>, StoreError> {
        let versions = self.inner.list_versions(secret_id).await?;
        if let Some(current) = self.inner.token_with_label(secret_id, LABEL_CURRENT).await {
            if current != self.racer {
                self.inner
                    .move_label(secret_id, LABEL_CURRENT, &self.racer, &current)
                    .await?;
            }
        }
        Ok(versions)
    }

    async fn move_label(
        &self,
        secret_id: &str,
        label: &str,
        to_token: &str,
        from_token: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .move_label(secret_id, label, to_token, from_token)
            .await
    }

    fn backend_name(&self) -> &'static str {
        "racing"
    }
}
