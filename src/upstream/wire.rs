//! Wire messages for the framed upstream protocol

use super::types::{CommandAck, CommandRequest, SatelliteSchema};
use serde::{Deserialize, Serialize};

/// Request sent by the hub to the backend.
///
/// `GetSchema` and `SubmitCommand` are unary; `OpenFeed` converts the
/// connection into a one-way telemetry stream after a single
/// [`UpstreamReply::FeedOpened`] confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamRequest {
    GetSchema,
    SubmitCommand { command: CommandRequest },
    OpenFeed,
}

/// Reply sent by the backend to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamReply {
    Schema { schema: SatelliteSchema },
    Ack { ack: CommandAck },
    FeedOpened,
    Error { message: String },
}
