//! Wire frames exchanged between a consumer proxy and the hub dispatcher
//!
//! One duplex connection is opened per consumer; all of that consumer's
//! calls multiplex over it. Every call carries a fresh `call_id` — the
//! single-use reply path — and receives exactly one [`ServerFrame::Response`].
//! A stream-returning call answers with a transferable stream id; subsequent
//! elements bypass the request/response envelope as [`ServerFrame::StreamItem`].

use crate::error::{ErrorKind, HubError};
use crate::upstream::TelemetryFrame;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a single in-flight call; the single-use reply path.
pub type CallId = Uuid;

/// Identifier of a live telemetry stream transferred to a consumer.
pub type StreamId = Uuid;

/// Frames flowing from consumer to hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Request {
        call_id: CallId,
        procedure: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
    CancelStream {
        stream_id: StreamId,
    },
}

/// Frames flowing from hub to consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Response {
        call_id: CallId,
        outcome: CallOutcome,
    },
    StreamItem {
        stream_id: StreamId,
        frame: TelemetryFrame,
    },
    StreamEnd {
        stream_id: StreamId,
    },
}

/// Exactly one of these is sent per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CallOutcome {
    Value { value: serde_json::Value },
    Stream { stream_id: StreamId },
    Error { error: CallError },
}

impl CallOutcome {
    pub fn from_error(err: &HubError) -> Self {
        CallOutcome::Error {
            error: CallError::from(err),
        }
    }
}

/// Failure description delivered to the calling consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&HubError> for CallError {
    fn from(err: &HubError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<CallError> for HubError {
    fn from(err: CallError) -> Self {
        HubError::Remote {
            kind: err.kind,
            message: err.message,
        }
    }
}

/// The procedure set exposed to consumers.
///
/// Dispatch is by name on the wire, but the set itself is static, so both
/// ends go through this enum instead of bare strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    GetSchema,
    SubmitCommand,
    OpenTelemetryStream,
}

impl Procedure {
    pub const fn name(self) -> &'static str {
        match self {
            Procedure::GetSchema => "getSchema",
            Procedure::SubmitCommand => "submitCommand",
            Procedure::OpenTelemetryStream => "openTelemetryStream",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "getSchema" => Some(Procedure::GetSchema),
            "submitCommand" => Some(Procedure::SubmitCommand),
            "openTelemetryStream" => Some(Procedure::OpenTelemetryStream),
            _ => None,
        }
    }
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
