//! # Configuration
//!
//! Rotator-level settings loaded from environment variables.
//!
//! - `rotator`: `RotatorConfig` and its sub-sections

pub mod rotator;

pub use rotator::{AwsStoreConfig, DownstreamConfig, RotatorConfig, StoreBackend};
