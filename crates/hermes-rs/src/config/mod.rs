//! Configuration loading for the hermes-rs gateway.
//!
//! - [`local_routes`] - YAML local route file parsing

pub mod local_routes;
