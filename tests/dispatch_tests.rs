//! # Dispatch Tests
//!
//! Event routing as the secret store would deliver it.

mod common;

use common::{assert_label_invariants, db_pass_store, labels_of, FailingVerifier};
use secret_rotator::constants::{LABEL_CURRENT, LABEL_PENDING, LABEL_PREVIOUS};
use secret_rotator::dispatch;
use secret_rotator::{RotationError, RotationEvent, RotationStep, Rotator};
use std::sync::Arc;

fn event(token: &str, step: &str) -> RotationEvent {
    RotationEvent::from_json(&format!(
        r#"{{"SecretId":"db-pass","ClientRequestToken":"{token}","Step":"{step}"}}"#
    ))
    .unwrap()
}

#[tokio::test]
async fn test_store_delivered_rotation() {
    let store = Arc::new(db_pass_store().await);
    let rotator = Rotator::new(store.clone());

    for step in ["createSecret", "setSecret", "testSecret", "finishSecret"] {
        dispatch::handle(&rotator, &event("v2", step)).await.unwrap();
        assert_label_invariants(&store, "db-pass").await;
    }

    let versions = store.snapshot("db-pass").await.unwrap();
    assert_eq!(labels_of(&versions, "v2"), vec![LABEL_CURRENT.to_string()]);
    assert_eq!(labels_of(&versions, "v1"), vec![LABEL_PREVIOUS.to_string()]);
}

#[tokio::test]
async fn test_rollback_step_is_unsupported_and_mutates_nothing() {
    let store = Arc::new(db_pass_store().await);
    let before = store.snapshot("db-pass").await;
    let rotator = Rotator::new(store.clone());

    let err = dispatch::handle(&rotator, &event("v2", "rollbackSecret"))
        .await
        .unwrap_err();

    assert!(matches!(err, RotationError::UnsupportedStep { ref step } if step == "rollbackSecret"));
    assert!(!err.is_retriable());
    assert_eq!(err.to_string(), "secret rotation step not supported: rollbackSecret");
    assert_eq!(store.snapshot("db-pass").await, before);
}

#[tokio::test]
async fn test_failed_test_step_then_redelivery_succeeds() {
    let store = Arc::new(db_pass_store().await);
    let failing = Rotator::new(store.clone()).with_verifier(Arc::new(FailingVerifier::default()));

    dispatch::handle(&failing, &event("v2", "createSecret")).await.unwrap();
    dispatch::handle(&failing, &event("v2", "setSecret")).await.unwrap();
    assert!(dispatch::handle(&failing, &event("v2", "testSecret")).await.is_err());
    assert_eq!(
        store.token_with_label("db-pass", LABEL_PENDING).await.as_deref(),
        Some("v2")
    );

    // The consumer recovers; the store redelivers the same step
    let healthy = Rotator::new(store.clone());
    dispatch::handle(&healthy, &RotationEvent::new("db-pass", "v2", RotationStep::Test))
        .await
        .unwrap();
    dispatch::handle(&healthy, &RotationEvent::new("db-pass", "v2", RotationStep::Finish))
        .await
        .unwrap();

    assert_eq!(
        store.token_with_label("db-pass", LABEL_CURRENT).await.as_deref(),
        Some("v2")
    );
}
