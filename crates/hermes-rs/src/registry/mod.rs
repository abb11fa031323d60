//! Service registry integration.
//!
//! - [`client`] - Registration, heartbeat, and deregistration
//! - [`route_table`] - Remote + local route collections with copy-on-write
//!   snapshots

pub mod client;
pub mod route_table;
