//! Server module - dispatcher for consumer connections

mod connection;

use crate::error::Result;
use crate::hub::FanoutHub;
use crate::upstream::UpstreamClient;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Hub-side endpoint accepting consumer connections.
///
/// Each consumer gets one duplex connection; every call it makes multiplexes
/// over it. Consumers are independent: one consumer's in-flight call never
/// blocks another's.
pub struct HubServer<U> {
    hub: FanoutHub,
    upstream: Arc<U>,
}

impl<U: UpstreamClient> HubServer<U> {
    pub fn new(hub: FanoutHub, upstream: Arc<U>) -> Self {
        Self { hub, upstream }
    }

    /// Run the accept loop forever.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "Consumer listener ready");
        loop {
            let (socket, peer) = listener.accept().await?;
            debug!(%peer, "Consumer attached");
            let hub = self.hub.clone();
            let upstream = self.upstream.clone();
            tokio::spawn(async move {
                if let Err(e) = connection::handle(socket, hub, upstream).await {
                    debug!(%peer, error = %e, "Consumer connection ended with error");
                }
                debug!(%peer, "Consumer detached");
            });
        }
    }
}
