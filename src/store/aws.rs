//! # AWS Secrets Manager Store
//!
//! [`SecretStore`] backed by AWS Secrets Manager.
//!
//! Capability mapping:
//! - `put_version` → `GetSecretValue(VersionId)` then `PutSecretValue(ClientRequestToken, VersionStages)`
//! - `get_version` → `GetSecretValue(VersionId)`
//! - `list_versions` → `ListSecretVersionIds` (all pages, deprecated versions included)
//! - `move_label` → `UpdateSecretVersionStage(MoveToVersionId, RemoveFromVersionId)`
//!
//! `UpdateSecretVersionStage` with `RemoveFromVersionId` is a compare-and-swap
//! on the service side, and moving `AWSCURRENT` makes the service attach
//! `AWSPREVIOUS` to the vacated version in the same call.

use super::{PutOutcome, SecretStore, VersionSummary};
use crate::config::AwsStoreConfig;
use crate::error::StoreError;
use crate::observability::metrics;
use crate::secret_value::SecretValue;
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use std::time::Instant;
use tracing::{debug, debug_span, info, info_span, warn, Instrument};

const BACKEND: &str = "aws";

/// AWS Secrets Manager store implementation
pub struct AwsSecretsManagerStore {
    client: SecretsManagerClient,
    region: String,
}

impl std::fmt::Debug for AwsSecretsManagerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretsManagerStore")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl AwsSecretsManagerStore {
    /// Create a new AWS Secrets Manager store using the default credential chain
    ///
    /// # Errors
    ///
    /// Returns an error if no region can be resolved from configuration or the
    /// environment.
    pub async fn new(config: &AwsStoreConfig) -> Result<Self> {
        let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            builder = builder.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            info!(
                provider = BACKEND,
                endpoint = %endpoint,
                "Using AWS Secrets Manager endpoint override"
            );
            builder = builder.endpoint_url(endpoint);
        }

        let sdk_config = builder.load().await;
        let region = sdk_config
            .region()
            .map(ToString::to_string)
            .ok_or_else(|| anyhow::anyhow!("No AWS region configured (set AWS_REGION)"))?;

        Ok(Self::from_client(SecretsManagerClient::new(&sdk_config), region))
    }

    /// Wrap an already configured client
    pub fn from_client(client: SecretsManagerClient, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    fn backend_failure(&self, operation: &str, secret_id: &str, detail: &str) -> StoreError {
        metrics::increment_store_operation_errors(BACKEND);
        warn!(
            provider = BACKEND,
            region = %self.region,
            secret_id = secret_id,
            operation = operation,
            error = %detail,
            "AWS Secrets Manager call failed"
        );
        StoreError::Backend(anyhow::anyhow!(
            "AWS {operation} failed for secret {secret_id}: {detail}"
        ))
    }
}

/// Payload of a `GetSecretValue` response, string first then binary
fn secret_payload(string: Option<&str>, binary: Option<&[u8]>) -> Option<SecretValue> {
    string
        .map(SecretValue::from)
        .or_else(|| binary.map(|blob| SecretValue::new(String::from_utf8_lossy(blob))))
}

/// Convert a `ListSecretVersionIds` entry; entries without an id are skipped
fn version_summary(version_id: Option<&str>, stages: &[String]) -> Option<VersionSummary> {
    version_id.map(|token| VersionSummary {
        token: token.to_string(),
        labels: stages.to_vec(),
    })
}

#[async_trait]
impl SecretStore for AwsSecretsManagerStore {
    async fn put_version(
        &self,
        secret_id: &str,
        token: &str,
        value: &SecretValue,
        labels: &[&str],
    ) -> Result<PutOutcome, StoreError> {
        let span = info_span!(
            "aws.secret.put_version",
            secret.id = secret_id,
            rotation.token = token,
            region = %self.region
        );
        let start = Instant::now();

        async move {
            match self.get_version(secret_id, token).await {
                Ok(_) => {
                    debug!("Version already present, skipping PutSecretValue");
                    return Ok(PutOutcome::AlreadyExists);
                }
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }

            metrics::record_store_operation(BACKEND, "put_version");
            let result = self
                .client
                .put_secret_value()
                .secret_id(secret_id)
                .client_request_token(token)
                .secret_string(value.expose())
                .set_version_stages(Some(labels.iter().map(ToString::to_string).collect()))
                .send()
                .await;
            metrics::observe_store_duration(BACKEND, start.elapsed().as_secs_f64());

            match result {
                Ok(_) => Ok(PutOutcome::Created),
                Err(e) => {
                    let detail = DisplayErrorContext(&e).to_string();
                    let service_error = e.into_service_error();
                    if service_error.is_resource_exists_exception() {
                        // Lost a race with a redelivered create for the same token
                        Ok(PutOutcome::AlreadyExists)
                    } else if service_error.is_resource_not_found_exception() {
                        Err(StoreError::SecretNotFound {
                            secret_id: secret_id.to_string(),
                        })
                    } else {
                        Err(self.backend_failure("PutSecretValue", secret_id, &detail))
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn get_version(&self, secret_id: &str, token: &str) -> Result<SecretValue, StoreError> {
        let span = debug_span!(
            "aws.secret.get_version",
            secret.id = secret_id,
            rotation.token = token,
            region = %self.region
        );
        let start = Instant::now();

        async move {
            metrics::record_store_operation(BACKEND, "get_version");
            let result = self
                .client
                .get_secret_value()
                .secret_id(secret_id)
                .version_id(token)
                .send()
                .await;
            metrics::observe_store_duration(BACKEND, start.elapsed().as_secs_f64());

            match result {
                Ok(response) => secret_payload(
                    response.secret_string(),
                    response.secret_binary().map(|blob| blob.as_ref()),
                )
                .ok_or_else(|| {
                    self.backend_failure(
                        "GetSecretValue",
                        secret_id,
                        "secret has no string or binary value",
                    )
                }),
                Err(e) => {
                    let detail = DisplayErrorContext(&e).to_string();
                    if e.into_service_error().is_resource_not_found_exception() {
                        Err(StoreError::NotFound {
                            secret_id: secret_id.to_string(),
                            token: token.to_string(),
                        })
                    } else {
                        Err(self.backend_failure("GetSecretValue", secret_id, &detail))
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn list_versions(&self, secret_id: &str) -> Result<Vec<VersionSummary>, StoreError> {
        let span = debug_span!(
            "aws.secret.list_versions",
            secret.id = secret_id,
            region = %self.region
        );
        let start = Instant::now();

        async move {
            let mut versions = Vec::new();
            let mut next_token: Option<String> = None;

            loop {
                metrics::record_store_operation(BACKEND, "list_versions");
                let response = match self
                    .client
                    .list_secret_version_ids()
                    .secret_id(secret_id)
                    .include_deprecated(true)
                    .set_next_token(next_token.take())
                    .send()
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        let detail = DisplayErrorContext(&e).to_string();
                        return if e.into_service_error().is_resource_not_found_exception() {
                            Err(StoreError::SecretNotFound {
                                secret_id: secret_id.to_string(),
                            })
                        } else {
                            Err(self.backend_failure("ListSecretVersionIds", secret_id, &detail))
                        };
                    }
                };

                versions.extend(
                    response
                        .versions()
                        .iter()
                        .filter_map(|entry| version_summary(entry.version_id(), entry.version_stages())),
                );

                match response.next_token() {
                    Some(token) => next_token = Some(token.to_string()),
                    None => break,
                }
            }

            metrics::observe_store_duration(BACKEND, start.elapsed().as_secs_f64());
            Ok(versions)
        }
        .instrument(span)
        .await
    }

    async fn move_label(
        &self,
        secret_id: &str,
        label: &str,
        to_token: &str,
        from_token: &str,
    ) -> Result<(), StoreError> {
        let span = info_span!(
            "aws.secret.move_label",
            secret.id = secret_id,
            label = label,
            from = from_token,
            to = to_token,
            region = %self.region
        );
        let start = Instant::now();

        async move {
            metrics::record_store_operation(BACKEND, "move_label");
            let result = self
                .client
                .update_secret_version_stage()
                .secret_id(secret_id)
                .version_stage(label)
                .move_to_version_id(to_token)
                .remove_from_version_id(from_token)
                .send()
                .await;
            metrics::observe_store_duration(BACKEND, start.elapsed().as_secs_f64());

            match result {
                Ok(_) => Ok(()),
                Err(e) => {
                    let detail = DisplayErrorContext(&e).to_string();
                    let service_error = e.into_service_error();
                    if service_error.is_invalid_parameter_exception()
                        || service_error.is_invalid_request_exception()
                    {
                        metrics::increment_store_operation_errors(BACKEND);
                        Err(StoreError::Conflict {
                            secret_id: secret_id.to_string(),
                            label: label.to_string(),
                            reason: detail,
                        })
                    } else if service_error.is_resource_not_found_exception() {
                        Err(StoreError::NotFound {
                            secret_id: secret_id.to_string(),
                            token: to_token.to_string(),
                        })
                    } else {
                        Err(self.backend_failure("UpdateSecretVersionStage", secret_id, &detail))
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{LABEL_CURRENT, LABEL_PREVIOUS};

    #[test]
    fn test_secret_payload_prefers_string() {
        let value = secret_payload(Some("from-string"), Some(b"from-binary")).unwrap();
        assert_eq!(value.expose(), "from-string");
    }

    #[test]
    fn test_secret_payload_falls_back_to_binary() {
        let value = secret_payload(None, Some(b"from-binary")).unwrap();
        assert_eq!(value.expose(), "from-binary");
    }

    #[test]
    fn test_secret_payload_empty_response() {
        assert!(secret_payload(None, None).is_none());
    }

    #[test]
    fn test_version_summary_keeps_stages() {
        let stages = vec![LABEL_CURRENT.to_string()];
        let summary = version_summary(Some("v2"), &stages).unwrap();

        assert_eq!(summary.token, "v2");
        assert!(summary.has_label(LABEL_CURRENT));
        assert!(!summary.has_label(LABEL_PREVIOUS));
    }

    #[test]
    fn test_version_summary_skips_missing_id() {
        assert!(version_summary(None, &[]).is_none());
    }
}
