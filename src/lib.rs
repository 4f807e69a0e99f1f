//! Secret Rotator Library
//!
//! Rotation callback for managed secret stores. The store drives a rotation by
//! delivering four events per request token (create, set, test, finish); the
//! handlers here generate a candidate credential, push it to its consumer,
//! verify it and promote it by moving staging labels.

pub mod cli;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod downstream;
pub mod driver;
pub mod error;
pub mod event;
pub mod generator;
pub mod observability;
pub mod rotation;
pub mod secret_value;
pub mod server;
pub mod store;

pub use error::{RotationError, StoreError};
pub use event::{RotationEvent, RotationStep};
pub use rotation::Rotator;
pub use secret_value::SecretValue;
