//! # Command Line
//!
//! ## Usage
//!
//! ```bash
//! # Handle one rotation event, as the secret store would deliver it
//! secret-rotator invoke --event event.json
//! echo '{"SecretId":"db-pass","ClientRequestToken":"v2","Step":"createSecret"}' \
//!   | secret-rotator invoke --event -
//!
//! # Drive a full rotation locally with a fresh request token
//! secret-rotator rotate --secret-id db-pass
//!
//! # Serve POST /rotate, /metrics and probes
//! secret-rotator serve --port 5000
//! ```
//!
//! `--store memory` swaps the AWS backend for the in-process store.

use crate::config::{RotatorConfig, StoreBackend};
use crate::constants::LABEL_CURRENT;
use crate::dispatch;
use crate::downstream::{CredentialApplier, CredentialVerifier, HttpDownstream, NoopDownstream};
use crate::driver::RotationDriver;
use crate::event::RotationEvent;
use crate::generator::{CredentialGenerator, RandomPasswordGenerator};
use crate::rotation::Rotator;
use crate::server::{self, ServerState};
use crate::store::{AwsSecretsManagerStore, InMemorySecretStore, SecretStore};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;

/// Version with build metadata, as shown by `--version`
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_DATETIME"),
    ")"
);

/// Rotation callback for managed secret stores
#[derive(Parser, Debug)]
#[command(name = "secret-rotator", version = VERSION, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Secret store backend: aws or memory (overrides ROTATOR_STORE_BACKEND)
    #[arg(long, global = true)]
    pub store: Option<StoreBackend>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Handle a single rotation event
    Invoke {
        /// Path to the event JSON, or '-' for stdin
        #[arg(long)]
        event: String,
    },
    /// Run create, set, test and finish for one request token
    Rotate {
        /// Secret name or ARN
        #[arg(long)]
        secret_id: String,

        /// Request token for the attempt (defaults to a fresh UUID)
        #[arg(long)]
        token: Option<String>,

        /// Seed a current version first (memory backend only)
        #[arg(long)]
        seed: bool,
    },
    /// Serve the rotation endpoint, metrics and probes over HTTP
    Serve {
        /// Listen port (overrides METRICS_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Execute the parsed command
///
/// # Errors
///
/// Returns an error if the collaborators cannot be built or the command fails.
pub async fn run(cli: Cli, config: RotatorConfig) -> Result<()> {
    match cli.command {
        Commands::Invoke { event } => {
            let rotator = build_rotator(&config, build_store(&config).await?)?;
            invoke_command(&rotator, &event).await
        }
        Commands::Rotate {
            secret_id,
            token,
            seed,
        } => {
            let store = if seed {
                seeded_memory_store(&config, &secret_id).await?
            } else {
                build_store(&config).await?
            };
            let rotator = Arc::new(build_rotator(&config, store)?);
            let token = token.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            rotate_command(RotationDriver::from_config(rotator, &config), &secret_id, &token).await
        }
        Commands::Serve { port } => {
            let rotator = Arc::new(build_rotator(&config, build_store(&config).await?)?);
            serve_command(rotator, port.unwrap_or(config.metrics_port)).await
        }
    }
}

/// Store selected by the configured backend
///
/// # Errors
///
/// Returns an error if the AWS client cannot be configured.
pub async fn build_store(config: &RotatorConfig) -> Result<Arc<dyn SecretStore>> {
    match config.store_backend {
        StoreBackend::Aws => Ok(Arc::new(AwsSecretsManagerStore::new(&config.aws).await?)),
        StoreBackend::Memory => Ok(Arc::new(InMemorySecretStore::new())),
    }
}

/// Rotator wired to `store` and the configured downstream
///
/// # Errors
///
/// Returns an error if the downstream or password policy is unusable.
pub fn build_rotator(config: &RotatorConfig, store: Arc<dyn SecretStore>) -> Result<Rotator> {
    let (applier, verifier): (Arc<dyn CredentialApplier>, Arc<dyn CredentialVerifier>) =
        if config.downstream.is_configured() {
            let http = Arc::new(HttpDownstream::from_config(&config.downstream)?);
            (Arc::clone(&http) as Arc<dyn CredentialApplier>, http)
        } else {
            (Arc::new(NoopDownstream), Arc::new(NoopDownstream))
        };

    let downstream = if config.downstream.is_configured() {
        "http"
    } else {
        "noop"
    };
    info!(
        store.backend = store.backend_name(),
        downstream, "Rotator configured"
    );
    Rotator::from_config(store, applier, verifier, config)
}

async fn seeded_memory_store(
    config: &RotatorConfig,
    secret_id: &str,
) -> Result<Arc<dyn SecretStore>> {
    if config.store_backend != StoreBackend::Memory {
        bail!("--seed is only supported with the memory store backend");
    }

    let store = InMemorySecretStore::new();
    let value = RandomPasswordGenerator::from_policy(&config.password_policy)?
        .generate(config.password_policy.length)?;
    let token = uuid::Uuid::new_v4().to_string();
    store
        .seed_version(secret_id, &token, value.expose(), &[LABEL_CURRENT])
        .await;
    info!(secret.id = secret_id, rotation.token = %token, "Seeded current version");
    Ok(Arc::new(store))
}

async fn read_event(source: &str) -> Result<RotationEvent> {
    let payload = if source == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("Failed to read event from stdin")?;
        buffer
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read event file {source}"))?
    };
    RotationEvent::from_json(&payload).context("Invalid rotation event")
}

async fn invoke_command(rotator: &Rotator, source: &str) -> Result<()> {
    let event = read_event(source).await?;
    dispatch::handle(rotator, &event).await?;
    println!("{}", json!({ "status": "ok" }));
    Ok(())
}

async fn rotate_command(driver: RotationDriver, secret_id: &str, token: &str) -> Result<()> {
    let report = driver.rotate(secret_id, token).await?;

    let attempts: serde_json::Map<String, serde_json::Value> = report
        .attempts
        .iter()
        .map(|(step, n)| (step.as_str().to_string(), json!(n)))
        .collect();
    println!(
        "{}",
        json!({
            "status": "ok",
            "secretId": report.secret_id,
            "clientRequestToken": report.request_token,
            "attempts": attempts,
        })
    );
    Ok(())
}

async fn serve_command(rotator: Arc<Rotator>, port: u16) -> Result<()> {
    let state = Arc::new(ServerState {
        rotator,
        is_ready: Arc::new(AtomicBool::new(true)),
    });

    tokio::select! {
        result = server::start_server(port, state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rotate_defaults() {
        let cli = Cli::try_parse_from(["secret-rotator", "rotate", "--secret-id", "db-pass"]).unwrap();
        match cli.command {
            Commands::Rotate {
                secret_id,
                token,
                seed,
            } => {
                assert_eq!(secret_id, "db-pass");
                assert!(token.is_none());
                assert!(!seed);
            }
            other => panic!("Expected rotate, got {other:?}"),
        }
        assert!(cli.store.is_none());
    }

    #[test]
    fn test_parse_global_store_override() {
        let cli = Cli::try_parse_from(["secret-rotator", "invoke", "--event", "-", "--store", "memory"])
            .unwrap();
        assert_eq!(cli.store, Some(StoreBackend::Memory));
    }

    #[test]
    fn test_unknown_store_rejected() {
        assert!(Cli::try_parse_from(["secret-rotator", "serve", "--store", "vault"]).is_err());
    }

    #[tokio::test]
    async fn test_seed_requires_memory_backend() {
        let config = RotatorConfig::default();
        assert!(seeded_memory_store(&config, "db-pass").await.is_err());
    }

    #[tokio::test]
    async fn test_read_event_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(
            &path,
            r#"{"SecretId":"db-pass","ClientRequestToken":"v2","Step":"testSecret"}"#,
        )
        .unwrap();

        let event = read_event(path.to_str().unwrap()).await.unwrap();
        assert_eq!(event.request_token, "v2");
    }

    #[tokio::test]
    async fn test_invoke_against_memory_store() {
        let store = Arc::new(InMemorySecretStore::new());
        store.seed_version("db-pass", "v1", "one", &[LABEL_CURRENT]).await;
        let rotator = Rotator::new(store.clone());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(
            &path,
            r#"{"SecretId":"db-pass","ClientRequestToken":"v2","Step":"createSecret"}"#,
        )
        .unwrap();

        invoke_command(&rotator, path.to_str().unwrap()).await.unwrap();
        assert_eq!(store.version_count("db-pass").await, 2);
    }
}
