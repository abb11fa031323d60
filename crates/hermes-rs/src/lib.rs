//! # hermes-rs
//!
//! Library behind the Hermes API gateway: a lightweight reverse proxy that
//! terminates HTTP, matches requests against a prioritized route table,
//! runs an admission plugin chain (authentication, rate limiting, circuit
//! breaking, header shaping), picks an upstream instance by load-balancing
//! policy, and forwards with retry and timeout handling.
//!
//! # Architecture
//!
//! ```text
//! Client -> Request ID middleware -> Route match -> Plugin chain (before)
//!        -> Balancer -> Proxy forwarder -> Plugin chain (after) -> Metrics
//! ```
//!
//! Routes come from two sources merged by priority: the service registry
//! (refreshed periodically) and a local YAML file (boosted so local rules
//! win ties). Failures surface as gateway status codes: 404 for unmatched
//! paths, 429 on rate limits, 503 for open circuits or missing instances,
//! 502/504 for upstream transport failures.
//!
//! # Module Organization
//!
//! - [`models`] - Domain types, configuration, error kinds
//! - [`config`] - Local route file loading
//! - [`registry`] - Registry client and the route table
//! - [`plugins`] - The admission pipeline and its four default plugins
//! - [`services`] - Balancer, proxy forwarder, metrics accumulator
//! - [`routes`] - HTTP endpoints: catch-all proxy, health, metrics
//! - [`middleware`] - Request id middleware
//! - [`logs`] - Logger configuration
//! - [`utils`] - Route pattern matching

pub mod config;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod plugins;
pub mod registry;
pub mod routes;
pub mod services;
pub mod utils;
