//! Per-consumer connection handling and request dispatch

use crate::error::{HubError, Result};
use crate::hub::{FanoutHub, SubscriptionCanceller, TelemetrySubscription};
use crate::rpc::codec;
use crate::rpc::frames::{CallId, CallOutcome, ClientFrame, Procedure, ServerFrame, StreamId};
use crate::upstream::{CommandRequest, UpstreamClient};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A live stream handed to this consumer: the cancel capability plus the
/// forwarding task. The receiving half belongs to the forwarder; this entry
/// is all the dispatcher retains.
struct StreamEntry {
    canceller: SubscriptionCanceller,
    task: JoinHandle<()>,
}

impl StreamEntry {
    async fn shut_down(self) {
        if self.canceller.cancel().await.is_err() {
            // Hub gone; the forwarder cannot end on its own anymore.
            self.task.abort();
        }
    }
}

pub(super) async fn handle<U: UpstreamClient>(
    socket: TcpStream,
    hub: FanoutHub,
    upstream: Arc<U>,
) -> Result<()> {
    let (read_half, write_half) = socket.into_split();
    let mut reader = codec::frame_read(read_half);
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(256);

    // Single writer task; request handlers and stream forwarders funnel
    // their frames through it, which also serializes replay-before-live for
    // freshly opened streams.
    let writer = tokio::spawn(async move {
        let mut framed = codec::frame_write(write_half);
        while let Some(frame) = out_rx.recv().await {
            if codec::send_frame(&mut framed, &frame).await.is_err() {
                break;
            }
        }
    });

    let mut streams: HashMap<StreamId, StreamEntry> = HashMap::new();

    while let Some(frame) = reader.next().await {
        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Consumer connection read error");
                break;
            }
        };
        match codec::decode::<ClientFrame>(&bytes) {
            Ok(ClientFrame::Request {
                call_id,
                procedure,
                args,
            }) => {
                dispatch(
                    call_id, &procedure, args, &hub, &upstream, &out_tx, &mut streams,
                )
                .await;
            }
            Ok(ClientFrame::CancelStream { stream_id }) => {
                match streams.remove(&stream_id) {
                    Some(entry) => entry.shut_down().await,
                    // Already cancelled or never existed; cancel is idempotent.
                    None => debug!(%stream_id, "Cancel for unknown stream"),
                }
            }
            // No call id recoverable, so nothing to fail; the connection
            // itself stays up.
            Err(e) => warn!(error = %e, "Skipping malformed client frame"),
        }
    }

    // Consumer detached: every live subscription must reach the hub's
    // cancel path, or the subscriber table leaks.
    for (_, entry) in streams.drain() {
        entry.shut_down().await;
    }
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

async fn dispatch<U: UpstreamClient>(
    call_id: CallId,
    procedure: &str,
    args: Vec<serde_json::Value>,
    hub: &FanoutHub,
    upstream: &Arc<U>,
    out_tx: &mpsc::Sender<ServerFrame>,
    streams: &mut HashMap<StreamId, StreamEntry>,
) {
    let Some(proc) = Procedure::parse(procedure) else {
        let err = HubError::UnknownProcedure(procedure.to_string());
        respond(out_tx, call_id, CallOutcome::from_error(&err)).await;
        return;
    };
    debug!(%call_id, procedure = %proc, "Dispatching call");

    match proc {
        // Unary calls run in their own task so a stalled upstream lookup
        // stalls only this call, never the connection.
        Procedure::GetSchema => {
            let upstream = upstream.clone();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                let outcome = match upstream.get_schema().await {
                    Ok(schema) => value_outcome(&schema),
                    Err(e) => CallOutcome::from_error(&e),
                };
                respond(&out_tx, call_id, outcome).await;
            });
        }
        Procedure::SubmitCommand => {
            let command: CommandRequest = match parse_arg(&args, 0) {
                Ok(command) => command,
                Err(e) => {
                    respond(out_tx, call_id, CallOutcome::from_error(&e)).await;
                    return;
                }
            };
            let upstream = upstream.clone();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                let outcome = match upstream.submit_command(command).await {
                    Ok(ack) => value_outcome(&ack),
                    Err(e) => CallOutcome::from_error(&e),
                };
                respond(&out_tx, call_id, outcome).await;
            });
        }
        Procedure::OpenTelemetryStream => {
            let channel: String = match parse_arg(&args, 0) {
                Ok(channel) => channel,
                Err(e) => {
                    respond(out_tx, call_id, CallOutcome::from_error(&e)).await;
                    return;
                }
            };
            match hub.subscribe(&channel).await {
                Ok(subscription) => {
                    let stream_id = subscription.id();
                    let canceller = subscription.canceller();
                    // Response first, then the forwarder: the writer channel
                    // preserves order, so the stream id reaches the consumer
                    // before the replayed cached value does.
                    respond(out_tx, call_id, CallOutcome::Stream { stream_id }).await;
                    let task = tokio::spawn(forward(subscription, stream_id, out_tx.clone()));
                    streams.insert(stream_id, StreamEntry { canceller, task });
                }
                Err(e) => respond(out_tx, call_id, CallOutcome::from_error(&e)).await,
            }
        }
    }
}

/// Pump subscription frames to the consumer until the registration is gone.
async fn forward(
    mut subscription: TelemetrySubscription,
    stream_id: StreamId,
    out_tx: mpsc::Sender<ServerFrame>,
) {
    while let Some(frame) = subscription.next().await {
        if out_tx
            .send(ServerFrame::StreamItem { stream_id, frame })
            .await
            .is_err()
        {
            break;
        }
    }
    let _ = out_tx.send(ServerFrame::StreamEnd { stream_id }).await;
}

async fn respond(out_tx: &mpsc::Sender<ServerFrame>, call_id: CallId, outcome: CallOutcome) {
    let _ = out_tx
        .send(ServerFrame::Response { call_id, outcome })
        .await;
}

fn value_outcome<T: Serialize>(value: &T) -> CallOutcome {
    match serde_json::to_value(value) {
        Ok(value) => CallOutcome::Value { value },
        Err(e) => CallOutcome::from_error(&HubError::Internal(e.to_string())),
    }
}

fn parse_arg<T: DeserializeOwned>(args: &[serde_json::Value], index: usize) -> Result<T> {
    let value = args
        .get(index)
        .ok_or_else(|| HubError::InvalidArgs(format!("missing argument {index}")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| HubError::InvalidArgs(format!("argument {index}: {e}")))
}
