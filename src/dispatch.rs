//! # Dispatcher
//!
//! Routes a [`RotationEvent`] to exactly one step handler. Parsing the step is
//! the only place an unsupported value can surface, and it does so before any
//! store call.

use crate::error::RotationError;
use crate::event::RotationEvent;
use crate::observability::metrics;
use crate::rotation::Rotator;
use tracing::warn;

/// Handle one rotation event
///
/// # Errors
///
/// [`RotationError::UnsupportedStep`] for an unknown step, otherwise whatever
/// the step handler returns.
pub async fn handle(rotator: &Rotator, event: &RotationEvent) -> Result<(), RotationError> {
    let step = event.step().inspect_err(|e| {
        metrics::increment_step_errors("unsupported", e.kind());
        warn!(
            secret.id = %event.secret_id,
            rotation.token = %event.request_token,
            step = %event.step,
            "Rejecting unsupported rotation step"
        );
    })?;

    rotator
        .run_step(step, &event.secret_id, &event.request_token)
        .await
}
