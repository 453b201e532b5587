//! Upstream module - transport client for the telemetry/command backend

pub mod tcp;
pub mod types;
pub mod wire;

pub use tcp::TcpUpstream;
pub use types::{
    ChannelSchema, CommandAck, CommandRequest, CommandSchema, DataType, FieldSchema,
    ParamSchema, ParamValue, SatelliteSchema, TelemetryFrame,
};

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// A live telemetry feed: unbounded, order-preserving, lazily produced,
/// terminated only by connection loss.
pub type TelemetryFeed = BoxStream<'static, TelemetryFrame>;

/// Client for the single upstream connection to the backend.
///
/// The hub holds exactly one of these regardless of how many consumers
/// attach. Reconnect policy lives in the fan-out hub's supervising loop,
/// not here: any failure is reported once and the hub retries.
#[async_trait]
pub trait UpstreamClient: Send + Sync + 'static {
    /// Fetch the schema describing all telemetry channels and commands.
    async fn get_schema(&self) -> Result<SatelliteSchema>;

    /// Submit one command for execution.
    async fn submit_command(&self, command: CommandRequest) -> Result<CommandAck>;

    /// Open the telemetry feed. The returned stream ends only when the
    /// connection is lost; it must never panic the caller.
    async fn open_feed(&self) -> Result<TelemetryFeed>;
}

#[async_trait]
impl<U: UpstreamClient + ?Sized> UpstreamClient for Arc<U> {
    async fn get_schema(&self) -> Result<SatelliteSchema> {
        (**self).get_schema().await
    }

    async fn submit_command(&self, command: CommandRequest) -> Result<CommandAck> {
        (**self).submit_command(command).await
    }

    async fn open_feed(&self) -> Result<TelemetryFeed> {
        (**self).open_feed().await
    }
}
