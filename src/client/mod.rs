//! Client module - consumer-side call proxy over the hub RPC protocol

mod stream;

pub use stream::TelemetryStream;

use crate::error::{HubError, Result};
use crate::rpc::codec;
use crate::rpc::frames::{CallId, CallOutcome, ClientFrame, Procedure, ServerFrame, StreamId};
use crate::upstream::{CommandAck, CommandRequest, SatelliteSchema, TelemetryFrame};
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::{Arc, Weak};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

const STREAM_BUFFER: usize = 64;

/// Reply delivered to a pending call by the background reader.
enum CallReply {
    Outcome(CallOutcome),
    Stream {
        stream_id: StreamId,
        rx: mpsc::Receiver<TelemetryFrame>,
    },
}

pub(crate) struct ClientInner {
    out_tx: mpsc::Sender<ClientFrame>,
    /// Reply-path table: one single-use slot per in-flight call
    pending: DashMap<CallId, oneshot::Sender<CallReply>>,
    /// Live stream sinks, keyed by the transferred stream id
    streams: DashMap<StreamId, mpsc::Sender<TelemetryFrame>>,
}

impl ClientInner {
    pub(crate) fn release_stream(&self, stream_id: StreamId) {
        self.streams.remove(&stream_id);
        let _ = self
            .out_tx
            .try_send(ClientFrame::CancelStream { stream_id });
    }

    fn route(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Response { call_id, outcome } => {
                // Single-use reply path: stop listening the moment the
                // response arrives.
                let Some((_, reply_tx)) = self.pending.remove(&call_id) else {
                    debug!(%call_id, "Response with no pending call");
                    return;
                };
                let reply = match outcome {
                    CallOutcome::Stream { stream_id } => {
                        // Register the sink before handing out the stream id
                        // so the replayed cached value cannot slip past.
                        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
                        self.streams.insert(stream_id, tx);
                        CallReply::Stream { stream_id, rx }
                    }
                    other => CallReply::Outcome(other),
                };
                if let Err(unclaimed) = reply_tx.send(reply) {
                    // The caller gave up on the call; a transferred stream
                    // must still be cancelled or the hub side leaks.
                    if let CallReply::Stream { stream_id, .. } = unclaimed {
                        self.release_stream(stream_id);
                    }
                }
            }
            ServerFrame::StreamItem { stream_id, frame } => {
                if let Some(tx) = self.streams.get(&stream_id) {
                    if tx.try_send(frame).is_err() {
                        debug!(%stream_id, "Local stream buffer full, frame dropped");
                    }
                }
            }
            ServerFrame::StreamEnd { stream_id } => {
                self.streams.remove(&stream_id);
            }
        }
    }
}

/// Consumer-side proxy to the hub.
///
/// Cheap to clone; all calls multiplex over the one connection opened at
/// attach time. Concurrent calls are unordered with respect to one another
/// and each resolves on its own reply path.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<ClientInner>,
}

impl HubClient {
    /// Attach to a running hub.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        Ok(Self::from_socket(socket))
    }

    fn from_socket(socket: TcpStream) -> Self {
        let (read_half, write_half) = socket.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientFrame>(64);

        let inner = Arc::new(ClientInner {
            out_tx,
            pending: DashMap::new(),
            streams: DashMap::new(),
        });

        tokio::spawn(async move {
            let mut framed = codec::frame_write(write_half);
            while let Some(frame) = out_rx.recv().await {
                if codec::send_frame(&mut framed, &frame).await.is_err() {
                    break;
                }
            }
        });

        // The reader holds only a weak reference: once every proxy handle
        // and stream is dropped, the writer closes and this task drains out.
        let weak: Weak<ClientInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            let mut framed = codec::frame_read(read_half);
            while let Some(frame) = framed.next().await {
                let Ok(bytes) = frame else { break };
                let Some(inner) = weak.upgrade() else { break };
                match codec::decode::<ServerFrame>(&bytes) {
                    Ok(frame) => inner.route(frame),
                    Err(e) => debug!(error = %e, "Skipping malformed server frame"),
                }
            }
            if let Some(inner) = weak.upgrade() {
                // Dropping the reply slots resolves every pending call with
                // a connection-closed error; dropping the sinks ends streams.
                inner.pending.clear();
                inner.streams.clear();
            }
        });

        Self { inner }
    }

    /// Generic call-by-name. Typed wrappers below are thin shells over this.
    pub async fn call(
        &self,
        procedure: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<CallOutcome> {
        match self.call_inner(procedure, args).await? {
            CallReply::Outcome(outcome) => Ok(outcome),
            CallReply::Stream { stream_id, .. } => {
                // Caller asked for a raw outcome; do not strand the stream.
                self.inner.release_stream(stream_id);
                Ok(CallOutcome::Stream { stream_id })
            }
        }
    }

    async fn call_inner(
        &self,
        procedure: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<CallReply> {
        let call_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner.pending.insert(call_id, reply_tx);

        let request = ClientFrame::Request {
            call_id,
            procedure: procedure.to_string(),
            args,
        };
        if self.inner.out_tx.send(request).await.is_err() {
            self.inner.pending.remove(&call_id);
            return Err(HubError::ConnectionClosed);
        }

        match reply_rx.await {
            Ok(reply) => Ok(reply),
            Err(_) => {
                self.inner.pending.remove(&call_id);
                Err(HubError::ConnectionClosed)
            }
        }
    }

    /// Fetch the schema describing all telemetry channels and commands.
    pub async fn get_schema(&self) -> Result<SatelliteSchema> {
        let value = expect_value(self.call(Procedure::GetSchema.name(), Vec::new()).await?)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Submit one command and wait for its acknowledgement.
    pub async fn submit_command(&self, command: &CommandRequest) -> Result<CommandAck> {
        let args = vec![serde_json::to_value(command)?];
        let value = expect_value(self.call(Procedure::SubmitCommand.name(), args).await?)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Open a live, cancellable telemetry stream for one channel. The last
    /// cached value, if any, arrives first.
    pub async fn open_telemetry_stream(&self, channel: &str) -> Result<TelemetryStream> {
        let args = vec![serde_json::Value::String(channel.to_string())];
        match self
            .call_inner(Procedure::OpenTelemetryStream.name(), args)
            .await?
        {
            CallReply::Stream { stream_id, rx } => Ok(TelemetryStream::new(
                stream_id,
                rx,
                self.inner.clone(),
            )),
            CallReply::Outcome(CallOutcome::Error { error }) => Err(error.into()),
            CallReply::Outcome(_) => {
                Err(HubError::Internal("expected a stream outcome".into()))
            }
        }
    }
}

fn expect_value(outcome: CallOutcome) -> Result<serde_json::Value> {
    match outcome {
        CallOutcome::Value { value } => Ok(value),
        CallOutcome::Error { error } => Err(error.into()),
        CallOutcome::Stream { .. } => {
            Err(HubError::Internal("unexpected stream outcome".into()))
        }
    }
}
