//! Logging setup for the hermes-rs gateway.

pub mod logger;
