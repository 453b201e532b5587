//! Framed TCP implementation of the upstream transport

use super::wire::{UpstreamReply, UpstreamRequest};
use super::{CommandAck, CommandRequest, SatelliteSchema, TelemetryFeed, TelemetryFrame, UpstreamClient};
use crate::config::UpstreamConfig;
use crate::error::{HubError, Result};
use crate::rpc::codec;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

/// Upstream transport over framed JSON on TCP.
///
/// Unary calls use a short-lived connection each (connect, one request, one
/// reply); the telemetry feed holds its connection open until the backend
/// drops it.
pub struct TcpUpstream {
    addr: String,
    connect_timeout: Duration,
}

impl TcpUpstream {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            addr: config.addr(),
            connect_timeout: config.connect_timeout(),
        }
    }

    async fn connect(&self) -> Result<Framed<TcpStream, LengthDelimitedCodec>> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| HubError::Upstream(format!("connect to {} timed out", self.addr)))??;
        Ok(Framed::new(stream, LengthDelimitedCodec::new()))
    }

    /// One request, one reply, connection discarded.
    async fn exchange(&self, request: UpstreamRequest) -> Result<UpstreamReply> {
        let mut framed = self.connect().await?;
        framed.send(codec::encode(&request)?).await?;
        let frame = framed.next().await.ok_or(HubError::ConnectionClosed)??;
        codec::decode(&frame)
    }
}

#[async_trait]
impl UpstreamClient for TcpUpstream {
    async fn get_schema(&self) -> Result<SatelliteSchema> {
        match self.exchange(UpstreamRequest::GetSchema).await? {
            UpstreamReply::Schema { schema } => Ok(schema),
            UpstreamReply::Error { message } => Err(HubError::Upstream(message)),
            other => Err(HubError::Upstream(format!(
                "unexpected reply to schema lookup: {other:?}"
            ))),
        }
    }

    async fn submit_command(&self, command: CommandRequest) -> Result<CommandAck> {
        debug!(command = %command.command, "Submitting command upstream");
        match self.exchange(UpstreamRequest::SubmitCommand { command }).await? {
            UpstreamReply::Ack { ack } => Ok(ack),
            UpstreamReply::Error { message } => Err(HubError::Upstream(message)),
            other => Err(HubError::Upstream(format!(
                "unexpected reply to command submission: {other:?}"
            ))),
        }
    }

    async fn open_feed(&self) -> Result<TelemetryFeed> {
        let mut framed = self.connect().await?;
        framed.send(codec::encode(&UpstreamRequest::OpenFeed)?).await?;

        let frame = framed.next().await.ok_or(HubError::ConnectionClosed)??;
        match codec::decode::<UpstreamReply>(&frame)? {
            UpstreamReply::FeedOpened => {}
            UpstreamReply::Error { message } => return Err(HubError::Upstream(message)),
            other => {
                return Err(HubError::Upstream(format!(
                    "unexpected reply to feed open: {other:?}"
                )))
            }
        }

        // A read error terminates the feed; an undecodable frame is skipped.
        let feed = framed
            .take_while(|frame| futures::future::ready(frame.is_ok()))
            .filter_map(|frame| async move {
                let bytes = frame.ok()?;
                match codec::decode::<TelemetryFrame>(&bytes) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!(error = %e, "Dropping undecodable telemetry frame");
                        None
                    }
                }
            })
            .boxed();

        Ok(feed)
    }
}
