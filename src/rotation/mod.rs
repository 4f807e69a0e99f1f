//! # Rotation State Machine
//!
//! One handler per rotation step. Every handler is idempotent: the store may
//! redeliver any step any number of times and the outcome is the same as a
//! single delivery.
//!
//! Per attempt (one request token) the candidate moves forward only:
//!
//! ```text
//! NONE -> PENDING_CREATED -> PENDING_SET -> PENDING_TESTED -> CURRENT
//! ```
//!
//! All rotation state lives in the store. The rotator holds injected
//! collaborators and, for stores without atomic label moves, a per-secret lock
//! that serializes `finish`.

mod locks;

pub use locks::SecretLocks;

use crate::config::RotatorConfig;
use crate::constants::{
    DEFAULT_DOWNSTREAM_TIMEOUT_MS, DEFAULT_PASSWORD_LENGTH, DEFAULT_STORE_TIMEOUT_MS,
    LABEL_CURRENT, LABEL_PENDING,
};
use crate::downstream::{CredentialApplier, CredentialVerifier, NoopDownstream};
use crate::error::{CurrentVersionProblem, RotationError, StoreError};
use crate::event::RotationStep;
use crate::generator::{CredentialGenerator, RandomPasswordGenerator};
use crate::observability::metrics;
use crate::secret_value::SecretValue;
use crate::store::{PutOutcome, SecretStore};
use anyhow::anyhow;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Rotation step handlers bound to one store and one downstream consumer
pub struct Rotator {
    store: Arc<dyn SecretStore>,
    generator: Arc<dyn CredentialGenerator>,
    applier: Arc<dyn CredentialApplier>,
    verifier: Arc<dyn CredentialVerifier>,
    password_length: usize,
    store_timeout: Duration,
    downstream_timeout: Duration,
    locks: SecretLocks,
}

impl std::fmt::Debug for Rotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rotator")
            .field("store", &self.store.backend_name())
            .field("password_length", &self.password_length)
            .field("store_timeout", &self.store_timeout)
            .field("downstream_timeout", &self.downstream_timeout)
            .finish_non_exhaustive()
    }
}

impl Rotator {
    /// Rotator with a random generator, a no-op downstream and default timeouts
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            generator: Arc::new(RandomPasswordGenerator::default()),
            applier: Arc::new(NoopDownstream),
            verifier: Arc::new(NoopDownstream),
            password_length: DEFAULT_PASSWORD_LENGTH,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            downstream_timeout: Duration::from_millis(DEFAULT_DOWNSTREAM_TIMEOUT_MS),
            locks: SecretLocks::new(),
        }
    }

    /// Rotator configured from [`RotatorConfig`]
    ///
    /// # Errors
    ///
    /// Returns an error if the password policy leaves no usable character pool.
    pub fn from_config(
        store: Arc<dyn SecretStore>,
        applier: Arc<dyn CredentialApplier>,
        verifier: Arc<dyn CredentialVerifier>,
        config: &RotatorConfig,
    ) -> anyhow::Result<Self> {
        let generator = RandomPasswordGenerator::from_policy(&config.password_policy)?;
        Ok(Self::new(store)
            .with_generator(Arc::new(generator))
            .with_applier(applier)
            .with_verifier(verifier)
            .with_password_length(config.password_policy.length)
            .with_store_timeout(config.store_timeout())
            .with_downstream_timeout(config.downstream_timeout()))
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn CredentialGenerator>) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn with_applier(mut self, applier: Arc<dyn CredentialApplier>) -> Self {
        self.applier = applier;
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn with_password_length(mut self, length: usize) -> Self {
        self.password_length = length;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_downstream_timeout(mut self, timeout: Duration) -> Self {
        self.downstream_timeout = timeout;
        self
    }

    /// Name of the store backend, for logs
    #[must_use]
    pub fn store_backend(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Run one step with span, logging and metrics around the handler
    ///
    /// # Errors
    ///
    /// Returns the handler's error unchanged.
    pub async fn run_step(
        &self,
        step: RotationStep,
        secret_id: &str,
        token: &str,
    ) -> Result<(), RotationError> {
        let span = info_span!(
            "rotation.step",
            secret.id = %secret_id,
            rotation.token = %token,
            rotation.step = %step,
        );

        async {
            info!("Starting {} step", step);
            metrics::increment_steps(step.as_str());
            let start = Instant::now();

            let result = match step {
                RotationStep::Create => self.create(secret_id, token).await,
                RotationStep::Set => self.set(secret_id, token).await,
                RotationStep::Test => self.test(secret_id, token).await,
                RotationStep::Finish => self.finish(secret_id, token).await,
            };

            metrics::observe_step_duration(step.as_str(), start.elapsed().as_secs_f64());
            match &result {
                Ok(()) => info!("Completed {} step", step),
                Err(e) => {
                    metrics::increment_step_errors(step.as_str(), e.kind());
                    if e.is_retriable() {
                        warn!(error.kind = e.kind(), "{} step failed: {}", step, e);
                    } else {
                        error!(error.kind = e.kind(), "{} step failed: {}", step, e);
                    }
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Generate a candidate and store it under `token` as the pending version
    ///
    /// A version already stored under `token` means the step was redelivered:
    /// nothing is generated or written.
    ///
    /// # Errors
    ///
    /// [`RotationError::Step`] if generation or the store write fails.
    pub async fn create(&self, secret_id: &str, token: &str) -> Result<(), RotationError> {
        let step = RotationStep::Create;

        match self
            .store_call("get_version", self.store.get_version(secret_id, token))
            .await
        {
            Ok(_) => {
                debug!("Version already exists for token, nothing to create");
                metrics::increment_idempotent_skips(step.as_str());
                return Ok(());
            }
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(RotationError::from_store(step, secret_id, e)),
        }

        let value = self
            .generator
            .generate(self.password_length)
            .map_err(|e| RotationError::step(step, secret_id, e))?;

        let outcome = self
            .store_call(
                "put_version",
                self.store
                    .put_version(secret_id, token, &value, &[LABEL_PENDING]),
            )
            .await
            .map_err(|e| RotationError::step(step, secret_id, e))?;

        match outcome {
            PutOutcome::Created => info!("Stored new pending version"),
            PutOutcome::AlreadyExists => {
                debug!("Concurrent delivery stored the version first");
                metrics::increment_idempotent_skips(step.as_str());
            }
        }
        Ok(())
    }

    /// Push the version stored under `token` to the consumer
    ///
    /// # Errors
    ///
    /// [`RotationError::NotFound`] if no version exists under `token`,
    /// [`RotationError::Step`] if the applier fails.
    pub async fn set(&self, secret_id: &str, token: &str) -> Result<(), RotationError> {
        let step = RotationStep::Set;
        let value = self.fetch_candidate(step, secret_id, token).await?;

        self.downstream_call("apply", self.applier.apply(secret_id, &value))
            .await
            .map_err(|e| RotationError::step(step, secret_id, e))
    }

    /// Confirm the consumer accepts the version stored under `token`
    ///
    /// Never touches staging labels, so a failure leaves the old current
    /// credential in place.
    ///
    /// # Errors
    ///
    /// [`RotationError::NotFound`] if no version exists under `token`,
    /// [`RotationError::Step`] if the verifier fails.
    pub async fn test(&self, secret_id: &str, token: &str) -> Result<(), RotationError> {
        let step = RotationStep::Test;
        let value = self.fetch_candidate(step, secret_id, token).await?;

        self.downstream_call("verify", self.verifier.verify(secret_id, &value))
            .await
            .map_err(|e| RotationError::step(step, secret_id, e))
    }

    /// Promote the version stored under `token` to current
    ///
    /// # Errors
    ///
    /// - [`RotationError::MissingCurrentVersion`] when zero or several versions
    ///   carry the current label
    /// - [`RotationError::NotFound`] when `token` is not a version of the secret
    /// - [`RotationError::Conflict`] when the current label moved concurrently
    /// - [`RotationError::Step`] on store timeouts and backend failures
    pub async fn finish(&self, secret_id: &str, token: &str) -> Result<(), RotationError> {
        let step = RotationStep::Finish;

        let _guard = if self.store.atomic_label_moves() {
            None
        } else {
            Some(self.locks.acquire(secret_id).await)
        };

        let versions = self
            .store_call("list_versions", self.store.list_versions(secret_id))
            .await
            .map_err(|e| RotationError::from_store(step, secret_id, e))?;

        let current: Vec<&str> = versions
            .iter()
            .filter(|v| v.has_label(LABEL_CURRENT))
            .map(|v| v.token.as_str())
            .collect();

        let old_token = match current.as_slice() {
            [] => {
                return Err(RotationError::MissingCurrentVersion {
                    secret_id: secret_id.to_string(),
                    problem: CurrentVersionProblem::Missing,
                })
            }
            [only] if *only == token => {
                debug!("Version is already current, nothing to finish");
                metrics::increment_idempotent_skips(step.as_str());
                return Ok(());
            }
            [only] => (*only).to_string(),
            many => {
                return Err(RotationError::MissingCurrentVersion {
                    secret_id: secret_id.to_string(),
                    problem: CurrentVersionProblem::Ambiguous(many.len()),
                })
            }
        };

        if !versions.iter().any(|v| v.token == token) {
            return Err(RotationError::NotFound {
                secret_id: secret_id.to_string(),
                token: token.to_string(),
            });
        }

        self.store_call(
            "move_label",
            self.store
                .move_label(secret_id, LABEL_CURRENT, token, &old_token),
        )
        .await
        .map_err(|e| RotationError::from_store(step, secret_id, e))?;

        info!(rotation.previous = %old_token, "Promoted version to current");
        Ok(())
    }

    async fn fetch_candidate(
        &self,
        step: RotationStep,
        secret_id: &str,
        token: &str,
    ) -> Result<SecretValue, RotationError> {
        self.store_call("get_version", self.store.get_version(secret_id, token))
            .await
            .map_err(|e| RotationError::from_store(step, secret_id, e))
    }

    async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?self.store_timeout, "Store call timed out");
                metrics::increment_store_operation_errors(self.store.backend_name());
                Err(StoreError::Timeout {
                    operation,
                    timeout: self.store_timeout,
                })
            }
        }
    }

    async fn downstream_call(
        &self,
        operation: &'static str,
        call: impl Future<Output = anyhow::Result<()>>,
    ) -> anyhow::Result<()> {
        match tokio::time::timeout(self.downstream_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "downstream {operation} timed out after {:?}",
                self.downstream_timeout
            )),
        }
    }
}
