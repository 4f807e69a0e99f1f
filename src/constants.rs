//! # Constants
//!
//! Shared constants used throughout the rotator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Staging label carried by the credential of record
pub const LABEL_CURRENT: &str = "AWSCURRENT";

/// Staging label carried by the candidate version of an in-flight rotation
pub const LABEL_PENDING: &str = "AWSPENDING";

/// Staging label carried by the version demoted by the last successful finish
pub const LABEL_PREVIOUS: &str = "AWSPREVIOUS";

/// Default generated credential length (matches the store's rotation samples)
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// Upper bound for generated credential length
pub const MAX_PASSWORD_LENGTH: usize = 4096;

/// Default timeout for a single store call (milliseconds)
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 10_000;

/// Default timeout for a single apply/verify call (milliseconds)
pub const DEFAULT_DOWNSTREAM_TIMEOUT_MS: u64 = 10_000;

/// Default HTTP server port for the rotation endpoint, metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default number of attempts per step when the rotator drives a rotation itself
pub const DEFAULT_MAX_STEP_ATTEMPTS: u32 = 5;

/// Default Fibonacci backoff floor for locally driven retries (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;

/// Default Fibonacci backoff ceiling for locally driven retries (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 30;
