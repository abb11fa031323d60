//! HTTP-layer middleware for the hermes-rs gateway.
//!
//! - [`request_id`] - Request id extraction, minting, and response echo

pub mod request_id;
