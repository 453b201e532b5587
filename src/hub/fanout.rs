//! Supervising task driving the upstream feed into the fan-out tables

use super::{HubCommand, SubscriptionId, TelemetrySubscription};
use crate::error::Result;
use crate::upstream::{TelemetryFeed, TelemetryFrame, UpstreamClient};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Upstream connection lifecycle. Cache updates happen only while
/// `Streaming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
}

/// Configuration for the fan-out hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Fixed interval between reconnect attempts after feed loss
    pub retry_interval: Duration,
    /// Per-subscriber delivery buffer
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            subscriber_buffer: 64,
        }
    }
}

/// Snapshot of hub-internal table sizes
#[derive(Debug, Clone, Copy)]
pub struct HubStats {
    pub cached_channels: usize,
    pub active_subscriptions: usize,
    pub state: ConnectionState,
}

pub(super) async fn run<U: UpstreamClient>(
    upstream: U,
    config: HubConfig,
    command_rx: mpsc::Receiver<HubCommand>,
    command_tx: mpsc::WeakSender<HubCommand>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let task = HubTask {
        config,
        command_rx,
        command_tx,
        state_tx,
        cache: HashMap::new(),
        subscribers: HashMap::new(),
        channel_index: HashMap::new(),
    };
    task.run(upstream).await;
    debug!("Hub task stopped");
}

struct HubTask {
    config: HubConfig,
    command_rx: mpsc::Receiver<HubCommand>,
    /// Upgraded and handed to subscriptions so dropping one can enqueue its
    /// own cancel; weak here so the task itself never keeps the channel open
    command_tx: mpsc::WeakSender<HubCommand>,
    state_tx: watch::Sender<ConnectionState>,
    /// Last value per channel, overwritten wholesale on every update
    cache: HashMap<String, TelemetryFrame>,
    /// Registered delivery sinks per channel
    subscribers: HashMap<String, Vec<(SubscriptionId, mpsc::Sender<TelemetryFrame>)>>,
    /// Subscription id -> channel, for O(1) cancel
    channel_index: HashMap<SubscriptionId, String>,
}

impl HubTask {
    async fn run<U: UpstreamClient>(mut self, upstream: U) {
        loop {
            self.set_state(ConnectionState::Connecting);
            match self.connect(&upstream).await {
                Some(Ok(mut feed)) => {
                    self.set_state(ConnectionState::Streaming);
                    info!("Upstream telemetry feed established");
                    loop {
                        tokio::select! {
                            maybe_cmd = self.command_rx.recv() => match maybe_cmd {
                                Some(cmd) => self.handle_command(cmd),
                                None => return,
                            },
                            maybe_frame = feed.next() => match maybe_frame {
                                Some(frame) => self.publish(frame),
                                None => {
                                    warn!("Upstream telemetry feed ended");
                                    break;
                                }
                            },
                        }
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Upstream feed connect failed"),
                None => return,
            }
            self.set_state(ConnectionState::Disconnected);
            let retry_interval = self.config.retry_interval;
            if !self.idle(retry_interval).await {
                return;
            }
        }
    }

    /// Drive the upstream connect while still serving commands, so
    /// subscribe/cancel stay responsive in every connection state. A slow
    /// or black-holed backend stalls only the connect, never the hub.
    ///
    /// Returns `None` once every hub handle is gone.
    async fn connect<U: UpstreamClient>(&mut self, upstream: &U) -> Option<Result<TelemetryFeed>> {
        let connecting = upstream.open_feed();
        tokio::pin!(connecting);
        loop {
            tokio::select! {
                result = &mut connecting => return Some(result),
                maybe_cmd = self.command_rx.recv() => match maybe_cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => return None,
                },
            }
        }
    }

    /// Keep serving commands while waiting out the reconnect interval, so
    /// subscribe/cancel stay responsive during an upstream outage.
    ///
    /// Returns `false` once every hub handle is gone.
    async fn idle(&mut self, interval: Duration) -> bool {
        let deadline = tokio::time::sleep(interval);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return true,
                maybe_cmd = self.command_rx.recv() => match maybe_cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => return false,
                },
            }
        }
    }

    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Subscribe { channel, reply } => {
                // The subscriber that sent this command still holds a strong
                // sender, so the upgrade cannot fail here.
                let Some(command_tx) = self.command_tx.upgrade() else {
                    return;
                };
                let id = Uuid::new_v4();
                let (tx, rx) = mpsc::channel(self.config.subscriber_buffer.max(1));
                // Replay before registration: the cached value lands in the
                // sink ahead of any update published after this command.
                if let Some(last) = self.cache.get(&channel) {
                    let _ = tx.try_send(last.clone());
                }
                self.subscribers
                    .entry(channel.clone())
                    .or_default()
                    .push((id, tx));
                self.channel_index.insert(id, channel.clone());
                debug!(channel = %channel, subscription = %id, "Registered telemetry subscriber");
                let subscription = TelemetrySubscription::new(id, channel, rx, command_tx);
                let _ = reply.send(subscription);
            }
            HubCommand::Cancel { id, done } => {
                self.remove_subscriber(id);
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(HubStats {
                    cached_channels: self.cache.len(),
                    active_subscriptions: self.channel_index.len(),
                    state: *self.state_tx.borrow(),
                });
            }
        }
    }

    /// Overwrite the cache entry, then deliver to every registered sink for
    /// the channel. Delivery to one subscriber follows upstream arrival
    /// order; a subscriber whose buffer is full loses this frame only.
    fn publish(&mut self, frame: TelemetryFrame) {
        trace!(channel = %frame.channel, "Telemetry update");
        self.cache.insert(frame.channel.clone(), frame.clone());
        if let Some(sinks) = self.subscribers.get(&frame.channel) {
            for (id, tx) in sinks {
                if tx.try_send(frame.clone()).is_err() {
                    debug!(
                        subscription = %id,
                        channel = %frame.channel,
                        "Subscriber not keeping up, frame dropped"
                    );
                }
            }
        }
    }

    fn remove_subscriber(&mut self, id: SubscriptionId) {
        let Some(channel) = self.channel_index.remove(&id) else {
            return;
        };
        if let Some(sinks) = self.subscribers.get_mut(&channel) {
            sinks.retain(|(sid, _)| *sid != id);
            if sinks.is_empty() {
                // The cached value outlives its subscribers
                self.subscribers.remove(&channel);
            }
        }
        debug!(channel = %channel, subscription = %id, "Cancelled telemetry subscriber");
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = *self.state_tx.borrow() != state;
        if changed {
            info!(state = ?state, "Upstream connection state changed");
        }
        let _ = self.state_tx.send(state);
    }
}
