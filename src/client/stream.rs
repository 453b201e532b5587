//! Consumer-held telemetry stream handle

use super::ClientInner;
use crate::error::{HubError, Result};
use crate::rpc::frames::{ClientFrame, StreamId};
use crate::upstream::TelemetryFrame;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// A live telemetry stream transferred to this consumer.
///
/// Ends only on cancellation; upstream outages just pause it. Dropping the
/// handle without calling [`cancel`](Self::cancel) sends a best-effort
/// cancel so the hub-side registration is still released.
pub struct TelemetryStream {
    stream_id: StreamId,
    rx: mpsc::Receiver<TelemetryFrame>,
    inner: Arc<ClientInner>,
    cancelled: bool,
}

impl TelemetryStream {
    pub(super) fn new(
        stream_id: StreamId,
        rx: mpsc::Receiver<TelemetryFrame>,
        inner: Arc<ClientInner>,
    ) -> Self {
        Self {
            stream_id,
            rx,
            inner,
            cancelled: false,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Receive the next frame; `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<TelemetryFrame> {
        self.rx.recv().await
    }

    /// Cancel the stream. No frames are delivered after the hub processes
    /// the cancellation; one already-in-flight frame may still be dropped
    /// locally.
    pub async fn cancel(mut self) -> Result<()> {
        self.cancelled = true;
        self.inner.streams.remove(&self.stream_id);
        self.inner
            .out_tx
            .send(ClientFrame::CancelStream {
                stream_id: self.stream_id,
            })
            .await
            .map_err(|_| HubError::ConnectionClosed)
    }
}

impl Stream for TelemetryStream {
    type Item = TelemetryFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for TelemetryStream {
    fn drop(&mut self) {
        if !self.cancelled {
            self.inner.release_stream(self.stream_id);
        }
    }
}
