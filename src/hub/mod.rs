//! Telemetry fan-out hub - last-value cache and per-channel multicast
//!
//! One supervising task owns the cache and the subscriber table behind a
//! command channel; consumers only ever hold subscribe/cancel capabilities.
//! The same task drives the upstream feed and is therefore the sole writer
//! of the cache, which keeps "no two hub-side operations run simultaneously"
//! true without any locking.

mod fanout;

pub use fanout::{ConnectionState, HubConfig, HubStats};

use crate::error::{HubError, Result};
use crate::upstream::{TelemetryFrame, UpstreamClient};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

/// Identifier for one live subscription; doubles as the wire stream id.
pub type SubscriptionId = Uuid;

pub(crate) enum HubCommand {
    Subscribe {
        channel: String,
        reply: oneshot::Sender<TelemetrySubscription>,
    },
    Cancel {
        id: SubscriptionId,
        done: Option<oneshot::Sender<()>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Cloneable handle to the hub task.
#[derive(Clone)]
pub struct FanoutHub {
    command_tx: mpsc::Sender<HubCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl FanoutHub {
    /// Spawn the supervising hub task and return a handle to it.
    ///
    /// The task runs until every handle (and every live subscription) is
    /// dropped.
    pub fn spawn<U: UpstreamClient>(upstream: U, config: HubConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        // The task only keeps a weak sender to itself, so it stops once
        // every handle and every live subscription is gone.
        tokio::spawn(fanout::run(
            upstream,
            config,
            command_rx,
            command_tx.downgrade(),
            state_tx,
        ));
        Self {
            command_tx,
            state_rx,
        }
    }

    /// Register a subscriber for one channel.
    ///
    /// If a cached value exists it is queued for the new subscriber before
    /// any later live update, so late joiners never wait for the next
    /// upstream tick.
    pub async fn subscribe(&self, channel: &str) -> Result<TelemetrySubscription> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(HubCommand::Subscribe {
                channel: channel.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| HubError::Internal("hub task is gone".into()))?;
        reply_rx
            .await
            .map_err(|_| HubError::Internal("hub task dropped subscribe reply".into()))
    }

    /// Remove one registration. Idempotent; effective once this returns.
    pub async fn cancel(&self, id: SubscriptionId) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(HubCommand::Cancel {
                id,
                done: Some(done_tx),
            })
            .await
            .map_err(|_| HubError::Internal("hub task is gone".into()))?;
        done_rx
            .await
            .map_err(|_| HubError::Internal("hub task dropped cancel ack".into()))
    }

    /// Current upstream connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch upstream connection state transitions.
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Snapshot of cache and subscriber-table sizes.
    pub async fn stats(&self) -> Result<HubStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(HubCommand::Stats { reply: reply_tx })
            .await
            .map_err(|_| HubError::Internal("hub task is gone".into()))?;
        reply_rx
            .await
            .map_err(|_| HubError::Internal("hub task dropped stats reply".into()))
    }
}

/// One live telemetry subscription.
///
/// Its only capabilities are receiving frames and cancellation. Dropping it
/// without cancelling still enqueues a best-effort cancel so the hub's
/// subscriber table cannot grow past the number of live handles.
pub struct TelemetrySubscription {
    id: SubscriptionId,
    channel: String,
    rx: mpsc::Receiver<TelemetryFrame>,
    command_tx: mpsc::Sender<HubCommand>,
    cancelled: bool,
}

impl TelemetrySubscription {
    pub(crate) fn new(
        id: SubscriptionId,
        channel: String,
        rx: mpsc::Receiver<TelemetryFrame>,
        command_tx: mpsc::Sender<HubCommand>,
    ) -> Self {
        Self {
            id,
            channel,
            rx,
            command_tx,
            cancelled: false,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receive the next frame; `None` once the registration is gone.
    pub async fn next(&mut self) -> Option<TelemetryFrame> {
        self.rx.recv().await
    }

    /// Receive a frame that is already queued, without waiting.
    pub fn try_next(&mut self) -> Option<TelemetryFrame> {
        self.rx.try_recv().ok()
    }

    /// A detached cancel capability for this subscription.
    pub fn canceller(&self) -> SubscriptionCanceller {
        SubscriptionCanceller {
            id: self.id,
            command_tx: self.command_tx.clone(),
        }
    }

    /// Cancel this subscription; effective once this returns.
    pub async fn cancel(mut self) -> Result<()> {
        self.cancelled = true;
        let canceller = self.canceller();
        canceller.cancel().await
    }
}

impl Stream for TelemetrySubscription {
    type Item = TelemetryFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for TelemetrySubscription {
    fn drop(&mut self) {
        if !self.cancelled {
            let _ = self.command_tx.try_send(HubCommand::Cancel {
                id: self.id,
                done: None,
            });
        }
    }
}

/// Cancel capability detached from the receiving half, so a dispatcher can
/// hand the frames to a forwarding task and keep only this.
#[derive(Clone)]
pub struct SubscriptionCanceller {
    id: SubscriptionId,
    command_tx: mpsc::Sender<HubCommand>,
}

impl SubscriptionCanceller {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the registration from the subscriber table. Idempotent.
    pub async fn cancel(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(HubCommand::Cancel {
                id: self.id,
                done: Some(done_tx),
            })
            .await
            .map_err(|_| HubError::Internal("hub task is gone".into()))?;
        done_rx
            .await
            .map_err(|_| HubError::Internal("hub task dropped cancel ack".into()))
    }
}
