//! Domain types exchanged with the telemetry/command backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded telemetry update for a single channel.
///
/// The payload is replaced wholesale on every update; the hub never merges
/// partial values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Channel name, e.g. `RT.OBC.TEMP`
    pub channel: String,

    /// Generation time stamped by the backend
    pub generation_time: DateTime<Utc>,

    /// Decoded payload
    pub payload: serde_json::Value,
}

impl TelemetryFrame {
    pub fn new(channel: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            channel: channel.into(),
            generation_time: Utc::now(),
            payload,
        }
    }
}

/// Primitive value types understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Integer,
    Double,
    Text,
    Bool,
}

/// Description of one field within a telemetry channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub data_type: DataType,
}

/// Description of one telemetry channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// Description of one command parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    pub data_type: DataType,
}

/// Description of one command accepted by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamSchema>,
}

/// Full description of all telemetry channels and commands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatelliteSchema {
    #[serde(default)]
    pub channels: Vec<ChannelSchema>,
    #[serde(default)]
    pub commands: Vec<CommandSchema>,
}

/// Typed positional command parameter. Encoding parameters from user input
/// is the consuming layer's responsibility; the hub passes them through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Integer(i64),
    Double(f64),
    Text(String),
    Bool(bool),
}

/// Command submission request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub params: Vec<ParamValue>,
}

/// Acknowledgement for an accepted command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    pub command: String,
    pub accepted_at: DateTime<Utc>,
}
