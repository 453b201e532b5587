//! Shared test fixtures: a scripted upstream backend

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tmtc_hub::error::{HubError, Result};
use tmtc_hub::upstream::{
    ChannelSchema, CommandAck, CommandRequest, CommandSchema, DataType, FieldSchema,
    ParamSchema, SatelliteSchema, TelemetryFeed, TelemetryFrame, UpstreamClient,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Upstream backend driven entirely by the test: feed sessions are queued
/// through [`FeedScript`], commands are recorded, and any command whose name
/// starts with `BAD` is rejected.
pub struct MockUpstream {
    schema: SatelliteSchema,
    feeds: Mutex<VecDeque<mpsc::UnboundedReceiver<TelemetryFrame>>>,
    pub commands: Mutex<Vec<CommandRequest>>,
}

/// Handle for queueing feed sessions on a [`MockUpstream`].
pub struct FeedScript {
    upstream: Arc<MockUpstream>,
}

impl FeedScript {
    /// Queue one feed session. Frames sent on the returned sender flow to
    /// the hub once it opens this session; dropping the sender ends the
    /// session, simulating upstream connection loss.
    pub fn add_session(&self) -> mpsc::UnboundedSender<TelemetryFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.upstream.feeds.lock().unwrap().push_back(rx);
        tx
    }
}

pub fn mock_upstream() -> (Arc<MockUpstream>, FeedScript) {
    let upstream = Arc::new(MockUpstream {
        schema: test_schema(),
        feeds: Mutex::new(VecDeque::new()),
        commands: Mutex::new(Vec::new()),
    });
    let script = FeedScript {
        upstream: upstream.clone(),
    };
    (upstream, script)
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn get_schema(&self) -> Result<SatelliteSchema> {
        Ok(self.schema.clone())
    }

    async fn submit_command(&self, command: CommandRequest) -> Result<CommandAck> {
        self.commands.lock().unwrap().push(command.clone());
        if command.command.starts_with("BAD") {
            return Err(HubError::Upstream(format!(
                "command rejected: {}",
                command.command
            )));
        }
        Ok(CommandAck {
            command: command.command,
            accepted_at: Utc::now(),
        })
    }

    async fn open_feed(&self) -> Result<TelemetryFeed> {
        let rx = self
            .feeds
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| HubError::Upstream("backend unavailable".into()))?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

/// Upstream whose feed connect never completes, so the hub stays pinned in
/// the `Connecting` state for the whole test.
pub struct StalledUpstream;

#[async_trait]
impl UpstreamClient for StalledUpstream {
    async fn get_schema(&self) -> Result<SatelliteSchema> {
        Ok(test_schema())
    }

    async fn submit_command(&self, command: CommandRequest) -> Result<CommandAck> {
        Ok(CommandAck {
            command: command.command,
            accepted_at: Utc::now(),
        })
    }

    async fn open_feed(&self) -> Result<TelemetryFeed> {
        futures::future::pending().await
    }
}

pub fn test_schema() -> SatelliteSchema {
    SatelliteSchema {
        channels: vec![
            ChannelSchema {
                name: "RT.OBC.TEMP".into(),
                description: Some("OBC board temperature".into()),
                fields: vec![FieldSchema {
                    name: "value".into(),
                    data_type: DataType::Double,
                }],
            },
            ChannelSchema {
                name: "RT.EPS.VOLT".into(),
                description: None,
                fields: vec![FieldSchema {
                    name: "value".into(),
                    data_type: DataType::Double,
                }],
            },
        ],
        commands: vec![
            CommandSchema {
                name: "OBC.RESET".into(),
                description: None,
                params: vec![],
            },
            CommandSchema {
                name: "AOCS.SET_MODE".into(),
                description: Some("Switch attitude control mode".into()),
                params: vec![ParamSchema {
                    name: "mode".into(),
                    data_type: DataType::Integer,
                }],
            },
        ],
    }
}

pub fn frame(channel: &str, value: f64) -> TelemetryFrame {
    TelemetryFrame::new(channel, serde_json::json!({ "value": value }))
}

pub fn value_of(frame: &TelemetryFrame) -> f64 {
    frame.payload["value"].as_f64().expect("numeric payload")
}
