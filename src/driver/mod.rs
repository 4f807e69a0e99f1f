//! # Local Rotation Driver
//!
//! Plays the secret store's role when a rotation is started from the command
//! line: sends create, set, test and finish for one request token in order,
//! retrying only the failed step when its error is retriable.

pub mod backoff;

use crate::config::RotatorConfig;
use crate::dispatch;
use crate::error::RotationError;
use crate::event::{RotationEvent, RotationStep};
use crate::rotation::Rotator;
use backoff::FibonacciBackoff;
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts taken per step by a completed rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub secret_id: String,
    pub request_token: String,
    pub attempts: Vec<(RotationStep, u32)>,
}

impl RotationReport {
    /// Total step deliveries, retries included
    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.attempts.iter().map(|(_, n)| n).sum()
    }
}

/// Drives full rotation attempts against a [`Rotator`]
#[derive(Debug, Clone)]
pub struct RotationDriver {
    rotator: Arc<Rotator>,
    max_attempts: u32,
    backoff_min_secs: u64,
    backoff_max_secs: u64,
}

impl RotationDriver {
    #[must_use]
    pub fn new(
        rotator: Arc<Rotator>,
        max_attempts: u32,
        backoff_min_secs: u64,
        backoff_max_secs: u64,
    ) -> Self {
        Self {
            rotator,
            max_attempts: max_attempts.max(1),
            backoff_min_secs,
            backoff_max_secs,
        }
    }

    #[must_use]
    pub fn from_config(rotator: Arc<Rotator>, config: &RotatorConfig) -> Self {
        Self::new(
            rotator,
            config.max_step_attempts,
            config.backoff_min_secs,
            config.backoff_max_secs,
        )
    }

    /// Run create, set, test and finish for `request_token`
    ///
    /// # Errors
    ///
    /// Returns the first non-retriable error, or the last error of a step that
    /// exhausted its attempts. Later steps are not attempted.
    pub async fn rotate(
        &self,
        secret_id: &str,
        request_token: &str,
    ) -> Result<RotationReport, RotationError> {
        info!(
            secret.id = secret_id,
            rotation.token = request_token,
            "Starting rotation"
        );

        let mut attempts = Vec::with_capacity(RotationStep::ALL.len());
        for step in RotationStep::ALL {
            let event = RotationEvent::new(secret_id, request_token, step);
            let taken = self.deliver(&event, step).await?;
            attempts.push((step, taken));
        }

        info!(
            secret.id = secret_id,
            rotation.token = request_token,
            "Rotation complete"
        );
        Ok(RotationReport {
            secret_id: secret_id.to_string(),
            request_token: request_token.to_string(),
            attempts,
        })
    }

    async fn deliver(&self, event: &RotationEvent, step: RotationStep) -> Result<u32, RotationError> {
        let mut backoff = FibonacciBackoff::new(self.backoff_min_secs, self.backoff_max_secs);
        let mut attempt = 1;
        loop {
            match dispatch::handle(&self.rotator, event).await {
                Ok(()) => return Ok(attempt),
                Err(e) if e.is_retriable() && attempt < self.max_attempts => {
                    let delay = backoff.next_backoff();
                    let next_attempt_at = chrono::Utc::now()
                        + chrono::Duration::milliseconds(
                            i64::try_from(delay.as_millis()).unwrap_or(i64::MAX),
                        );
                    warn!(
                        secret.id = %event.secret_id,
                        rotation.step = %step,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Retrying {} step with Fibonacci backoff: {}s (next attempt at {})",
                        step,
                        delay.as_secs(),
                        next_attempt_at.to_rfc3339()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
