//! # Rotation Events
//!
//! Wire shape of the event the secret store sends for each rotation step.
//!
//! ```json
//! { "SecretId": "db-pass", "ClientRequestToken": "v2", "Step": "createSecret" }
//! ```
//!
//! The `Step` field is kept as a raw string on the wire so that an unknown value
//! reaches the dispatcher and fails with [`RotationError::UnsupportedStep`]
//! instead of being rejected as malformed JSON.

use crate::error::RotationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One phase of the rotation protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RotationStep {
    /// Generate a candidate and store it as the pending version
    Create,
    /// Push the pending value to the consuming system
    Set,
    /// Confirm the consuming system accepts the pending value
    Test,
    /// Promote the pending version to current
    Finish,
}

impl RotationStep {
    /// All steps in protocol order
    pub const ALL: [RotationStep; 4] = [Self::Create, Self::Set, Self::Test, Self::Finish];

    /// Wire name used in the `Step` field
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Create => "createSecret",
            Self::Set => "setSecret",
            Self::Test => "testSecret",
            Self::Finish => "finishSecret",
        }
    }

    /// Short name used for metric labels and span fields
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Set => "set",
            Self::Test => "test",
            Self::Finish => "finish",
        }
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationStep {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.wire_name() == s)
            .ok_or_else(|| RotationError::UnsupportedStep {
                step: s.to_string(),
            })
    }
}

/// Event delivered by the secret store for a single rotation step
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RotationEvent {
    /// Secret being rotated (name or ARN)
    #[serde(rename = "SecretId")]
    pub secret_id: String,
    /// Idempotency key shared by all steps of one rotation attempt
    #[serde(rename = "ClientRequestToken")]
    pub request_token: String,
    /// Raw step name, parsed by [`RotationEvent::step`]
    #[serde(rename = "Step")]
    pub step: String,
}

impl RotationEvent {
    pub fn new(
        secret_id: impl Into<String>,
        request_token: impl Into<String>,
        step: RotationStep,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            request_token: request_token.into(),
            step: step.wire_name().to_string(),
        }
    }

    /// Parse the step name
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::UnsupportedStep`] for anything other than the four
    /// protocol step names.
    pub fn step(&self) -> Result<RotationStep, RotationError> {
        self.step.parse()
    }

    /// Parse an event from its JSON representation
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON or a field is missing.
    pub fn from_json(payload: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
