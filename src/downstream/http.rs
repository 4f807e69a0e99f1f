//! # HTTP Downstream
//!
//! Applier and verifier for consumers that manage credentials over HTTP, for
//! example a search cluster's `POST /_security/user/<name>/_password`.
//!
//! - apply: `POST <apply_url>` with `{"password": "<value>"}`, authorized by
//!   the admin bearer token when one is configured
//! - verify: `GET <verify_url>` with basic auth `<username>:<value>`
//!
//! Any non-2xx response is a failure.

use super::{CredentialApplier, CredentialVerifier};
use crate::config::DownstreamConfig;
use crate::secret_value::SecretValue;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Serialize)]
struct PasswordUpdate<'a> {
    password: &'a str,
}

/// HTTP-backed [`CredentialApplier`] and [`CredentialVerifier`]
#[derive(Clone)]
pub struct HttpDownstream {
    client: reqwest::Client,
    apply_url: String,
    verify_url: String,
    username: String,
    admin_token: Option<String>,
}

impl std::fmt::Debug for HttpDownstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDownstream")
            .field("apply_url", &self.apply_url)
            .field("verify_url", &self.verify_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl HttpDownstream {
    /// Build from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if either URL is missing or the HTTP client cannot be built.
    pub fn from_config(config: &DownstreamConfig) -> Result<Self> {
        let apply_url = config
            .apply_url
            .clone()
            .context("downstream apply URL is not configured")?;
        let verify_url = config
            .verify_url
            .clone()
            .context("downstream verify URL is not configured")?;

        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build downstream HTTP client")?;

        Ok(Self {
            client,
            apply_url,
            verify_url,
            username: config.username.clone().unwrap_or_default(),
            admin_token: config.admin_token.clone(),
        })
    }
}

#[async_trait]
impl CredentialApplier for HttpDownstream {
    async fn apply(&self, secret_id: &str, value: &SecretValue) -> Result<()> {
        debug!(secret.id = secret_id, url = %self.apply_url, "Applying credential downstream");

        let mut request = self.client.post(&self.apply_url).json(&PasswordUpdate {
            password: value.expose(),
        });
        if let Some(token) = &self.admin_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.apply_url))?;

        let status = response.status();
        if !status.is_success() {
            warn!(secret.id = secret_id, status = %status, "Downstream rejected new credential");
            bail!("downstream apply returned {status}");
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialVerifier for HttpDownstream {
    async fn verify(&self, secret_id: &str, value: &SecretValue) -> Result<()> {
        debug!(secret.id = secret_id, url = %self.verify_url, "Verifying credential downstream");

        let response = self
            .client
            .get(&self.verify_url)
            .basic_auth(&self.username, Some(value.expose()))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.verify_url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("downstream verify returned {status}");
        }
        Ok(())
    }
}
