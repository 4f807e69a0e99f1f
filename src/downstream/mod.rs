//! # Downstream Consumers
//!
//! Integration points for the system that consumes the rotated credential.
//!
//! - [`CredentialApplier`] pushes a candidate so it becomes accepted going forward
//! - [`CredentialVerifier`] uses a candidate and confirms it is accepted
//!
//! Secrets with no external consumer (generated tokens, shared keys) use
//! [`NoopDownstream`], which accepts everything.

use crate::secret_value::SecretValue;
use anyhow::Result;
use async_trait::async_trait;

pub mod http;

pub use http::HttpDownstream;

/// Pushes a candidate credential to its consumer
///
/// Implementations must tolerate being called more than once with the same
/// value.
#[async_trait]
pub trait CredentialApplier: Send + Sync {
    async fn apply(&self, secret_id: &str, value: &SecretValue) -> Result<()>;
}

/// Confirms the consumer accepts a candidate credential
///
/// Implementations must not have side effects beyond the attempt itself.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, secret_id: &str, value: &SecretValue) -> Result<()>;
}

/// Applier and verifier for secrets with no external consumer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDownstream;

#[async_trait]
impl CredentialApplier for NoopDownstream {
    async fn apply(&self, _secret_id: &str, _value: &SecretValue) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CredentialVerifier for NoopDownstream {
    async fn verify(&self, _secret_id: &str, _value: &SecretValue) -> Result<()> {
        Ok(())
    }
}
