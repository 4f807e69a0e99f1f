//! # Rotator Configuration
//!
//! Settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_DOWNSTREAM_TIMEOUT_MS,
    DEFAULT_MAX_STEP_ATTEMPTS, DEFAULT_METRICS_PORT, DEFAULT_PASSWORD_LENGTH,
    DEFAULT_STORE_TIMEOUT_MS, MAX_PASSWORD_LENGTH,
};
use crate::generator::PasswordPolicy;
use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which secret store the rotator talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// AWS Secrets Manager
    Aws,
    /// In-process store (local runs and tests)
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => bail!("unknown store backend '{other}' (expected 'aws' or 'memory')"),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => f.write_str("aws"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// AWS Secrets Manager connection settings
#[derive(Debug, Clone, Default)]
pub struct AwsStoreConfig {
    /// Region override; falls back to the SDK's default provider chain
    pub region: Option<String>,
    /// Endpoint override for local stacks
    pub endpoint_url: Option<String>,
}

/// HTTP downstream settings
///
/// Both URLs unset selects the no-op applier/verifier.
#[derive(Clone, Default)]
pub struct DownstreamConfig {
    /// Endpoint receiving the new password (POST)
    pub apply_url: Option<String>,
    /// Endpoint probed with the new password (GET, basic auth)
    pub verify_url: Option<String>,
    /// Username presented when verifying
    pub username: Option<String>,
    /// Bearer token authorizing the apply call
    pub admin_token: Option<String>,
}

impl fmt::Debug for DownstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownstreamConfig")
            .field("apply_url", &self.apply_url)
            .field("verify_url", &self.verify_url)
            .field("username", &self.username)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl DownstreamConfig {
    /// Whether an HTTP consumer is configured at all
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.apply_url.is_some() || self.verify_url.is_some()
    }
}

/// Rotator configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct RotatorConfig {
    /// Generated credential policy
    pub password_policy: PasswordPolicy,
    /// Timeout applied to every store call (milliseconds)
    pub store_timeout_ms: u64,
    /// Timeout applied to every apply/verify call (milliseconds)
    pub downstream_timeout_ms: u64,
    /// Secret store backend
    pub store_backend: StoreBackend,
    /// AWS Secrets Manager settings
    pub aws: AwsStoreConfig,
    /// Downstream consumer settings
    pub downstream: DownstreamConfig,
    /// HTTP server port for the rotation endpoint, metrics and probes
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Attempts per step when the rotator drives a rotation itself
    pub max_step_attempts: u32,
    /// Fibonacci backoff floor for locally driven retries (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff ceiling for locally driven retries (seconds)
    pub backoff_max_secs: u64,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            password_policy: PasswordPolicy::default(),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            downstream_timeout_ms: DEFAULT_DOWNSTREAM_TIMEOUT_MS,
            store_backend: StoreBackend::Aws,
            aws: AwsStoreConfig::default(),
            downstream: DownstreamConfig::default(),
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            max_step_attempts: DEFAULT_MAX_STEP_ATTEMPTS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl RotatorConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    ///
    /// Returns an error if `ROTATOR_STORE_BACKEND` names an unknown backend.
    pub fn from_env() -> Result<Self> {
        let store_backend = match std::env::var("ROTATOR_STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::Aws,
        };

        Ok(Self {
            password_policy: PasswordPolicy {
                length: env_var_or_default("ROTATOR_PASSWORD_LENGTH", DEFAULT_PASSWORD_LENGTH),
                include_punctuation: env_var_or_default_bool("ROTATOR_INCLUDE_PUNCTUATION", false),
                exclude_characters: env_var_or_default_str("ROTATOR_EXCLUDE_CHARACTERS", ""),
            },
            store_timeout_ms: env_var_or_default(
                "ROTATOR_STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            ),
            downstream_timeout_ms: env_var_or_default(
                "ROTATOR_DOWNSTREAM_TIMEOUT_MS",
                DEFAULT_DOWNSTREAM_TIMEOUT_MS,
            ),
            store_backend,
            aws: AwsStoreConfig {
                region: env_var_opt("AWS_REGION"),
                endpoint_url: env_var_opt("ROTATOR_AWS_ENDPOINT_URL"),
            },
            downstream: DownstreamConfig {
                apply_url: env_var_opt("ROTATOR_DOWNSTREAM_APPLY_URL"),
                verify_url: env_var_opt("ROTATOR_DOWNSTREAM_VERIFY_URL"),
                username: env_var_opt("ROTATOR_DOWNSTREAM_USERNAME"),
                admin_token: env_var_opt("ROTATOR_DOWNSTREAM_ADMIN_TOKEN"),
            },
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            max_step_attempts: env_var_or_default(
                "ROTATOR_MAX_STEP_ATTEMPTS",
                DEFAULT_MAX_STEP_ATTEMPTS,
            ),
            backoff_min_secs: env_var_or_default(
                "ROTATOR_BACKOFF_MIN_SECS",
                DEFAULT_BACKOFF_MIN_SECS,
            ),
            backoff_max_secs: env_var_or_default(
                "ROTATOR_BACKOFF_MAX_SECS",
                DEFAULT_BACKOFF_MAX_SECS,
            ),
        })
    }

    /// Reject settings the rotator cannot run with
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let length = self.password_policy.length;
        if length == 0 || length > MAX_PASSWORD_LENGTH {
            bail!("password length must be between 1 and {MAX_PASSWORD_LENGTH}, got {length}");
        }
        if self.store_timeout_ms == 0 {
            bail!("store timeout must be greater than zero");
        }
        if self.downstream_timeout_ms == 0 {
            bail!("downstream timeout must be greater than zero");
        }
        if self.max_step_attempts == 0 {
            bail!("max step attempts must be at least 1");
        }
        if self.backoff_min_secs > self.backoff_max_secs {
            bail!(
                "backoff minimum ({}s) exceeds maximum ({}s)",
                self.backoff_min_secs,
                self.backoff_max_secs
            );
        }
        if self.downstream.apply_url.is_some() != self.downstream.verify_url.is_some() {
            bail!("downstream apply and verify URLs must be configured together");
        }
        Ok(())
    }

    /// Get store call timeout
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Get downstream call timeout
    #[must_use]
    pub fn downstream_timeout(&self) -> Duration {
        Duration::from_millis(self.downstream_timeout_ms)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a non-empty environment variable
fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
