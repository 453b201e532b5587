//! Ground-Station Telemetry/Command Hub
//!
//! A single long-lived hub process owns the one upstream connection to a
//! telemetry/command backend and re-exposes it to any number of local
//! console instances as a generic RPC surface plus per-channel,
//! last-value-cached, multicast telemetry streams.

pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod rpc;
pub mod server;
pub mod upstream;

pub use error::{HubError, Result};
