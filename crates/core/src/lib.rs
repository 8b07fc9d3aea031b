//! Core functionality shared across the hashline workspace.
//!
//! Configuration, error types and logging setup used by the switch crate
//! and the integration tests.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, LivenessConfig, NetworkConfig, RoutingConfig};
pub use error::{CoreError, Result};
