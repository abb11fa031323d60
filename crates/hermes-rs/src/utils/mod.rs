//! Utility functions for the hermes-rs gateway.
//!
//! - [`route_matcher`] - Path pattern matching and method validation

pub mod route_matcher;
