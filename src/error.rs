//! # Errors
//!
//! Failure taxonomy reported back to the secret store.
//!
//! Handlers never recover from these internally. Each one is returned to the
//! invoker unchanged in kind and the store's own retry policy decides whether
//! to redeliver the step.

use crate::event::RotationStep;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the store capability surface
#[derive(Debug, Error)]
pub enum StoreError {
    /// No version exists under the requested token
    #[error("version {token} of secret {secret_id} not found")]
    NotFound { secret_id: String, token: String },

    /// The secret itself does not exist
    #[error("secret {secret_id} not found")]
    SecretNotFound { secret_id: String },

    /// A label move lost a race: `from_token` no longer carries `label`
    #[error("staging label {label} on secret {secret_id} could not be moved: {reason}")]
    Conflict {
        secret_id: String,
        label: String,
        reason: String,
    },

    /// The backend call did not complete within the caller's deadline
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Any other backend failure
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Why `finish` could not identify a single current version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentVersionProblem {
    /// No version carries the current label
    Missing,
    /// More than one version carries the current label
    Ambiguous(usize),
}

impl fmt::Display for CurrentVersionProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("no version carries the current label"),
            Self::Ambiguous(count) => {
                write!(f, "{count} versions carry the current label")
            }
        }
    }
}

/// Errors returned by the dispatcher and the rotation step handlers
#[derive(Debug, Error)]
pub enum RotationError {
    /// The event named a step outside the rotation protocol
    #[error("secret rotation step not supported: {step}")]
    UnsupportedStep { step: String },

    /// A version the step depends on does not exist in the store
    #[error("version {token} of secret {secret_id} not found")]
    NotFound { secret_id: String, token: String },

    /// The secret being rotated does not exist in the store
    #[error("secret {secret_id} not found")]
    SecretNotFound { secret_id: String },

    /// Generator, store write, applier or verifier failure within a step
    #[error("{step} step failed for secret {secret_id}: {source:#}")]
    Step {
        step: RotationStep,
        secret_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The store's current label invariant does not hold at finish time
    #[error("cannot finish rotation of secret {secret_id}: {problem}")]
    MissingCurrentVersion {
        secret_id: String,
        problem: CurrentVersionProblem,
    },

    /// The label swap raced with another writer
    #[error("label swap conflict on secret {secret_id}: {reason}")]
    Conflict { secret_id: String, reason: String },
}

impl RotationError {
    /// Wrap a collaborator failure as a step failure
    pub fn step(step: RotationStep, secret_id: &str, source: impl Into<anyhow::Error>) -> Self {
        Self::Step {
            step,
            secret_id: secret_id.to_string(),
            source: source.into(),
        }
    }

    /// Map a store failure raised during `step`
    ///
    /// Not-found and conflict keep their own kinds; timeouts and backend errors
    /// are step failures the store may redeliver.
    pub fn from_store(step: RotationStep, secret_id: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { secret_id, token } => Self::NotFound { secret_id, token },
            StoreError::SecretNotFound { secret_id } => Self::SecretNotFound { secret_id },
            StoreError::Conflict { secret_id, reason, .. } => Self::Conflict { secret_id, reason },
            StoreError::Timeout { .. } => Self::step(step, secret_id, err),
            StoreError::Backend(source) => Self::step(step, secret_id, source),
        }
    }

    /// Whether redelivering the same step may succeed
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Step { .. } | Self::Conflict { .. })
    }

    /// Stable tag for metrics and error envelopes
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedStep { .. } => "unsupported_step",
            Self::NotFound { .. } | Self::SecretNotFound { .. } => "not_found",
            Self::Step { .. } => "rotation_step",
            Self::MissingCurrentVersion { .. } => "missing_current_version",
            Self::Conflict { .. } => "conflict",
        }
    }
}
