//! Packet handler chain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bedrock_net::{Packet, PacketSink};

use crate::error::ProxyError;

/// Which peer sent a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The game client.
    Client,
    /// The game server.
    Server,
}

impl Origin {
    /// The other peer.
    pub fn counterpart(self) -> Self {
        match self {
            Origin::Client => Origin::Server,
            Origin::Server => Origin::Client,
        }
    }
}

/// Per-session state shared by every handler and both relay directions.
pub struct SessionContext {
    upstream: Arc<dyn PacketSink>,
    downstream: Arc<dyn PacketSink>,
    client_cache: AtomicBool,
}

impl SessionContext {
    pub fn new(upstream: Arc<dyn PacketSink>, downstream: Arc<dyn PacketSink>) -> Self {
        Self {
            upstream,
            downstream,
            client_cache: AtomicBool::new(false),
        }
    }

    /// Writer towards the server.
    pub fn upstream(&self) -> &Arc<dyn PacketSink> {
        &self.upstream
    }

    /// Writer towards the client.
    pub fn downstream(&self) -> &Arc<dyn PacketSink> {
        &self.downstream
    }

    /// Writer towards `origin`.
    pub fn sink(&self, origin: Origin) -> &Arc<dyn PacketSink> {
        match origin {
            Origin::Client => &self.downstream,
            Origin::Server => &self.upstream,
        }
    }

    /// Whether the client keeps its own blob cache.
    pub fn client_cache(&self) -> bool {
        self.client_cache.load(Ordering::Acquire)
    }

    pub fn set_client_cache(&self, enabled: bool) {
        self.client_cache.store(enabled, Ordering::Release);
    }
}

/// One stage of the relay. Handlers run in chain order for every packet.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called once before any packet is relayed.
    async fn on_session_start(&self, _ctx: &SessionContext) -> Result<(), ProxyError> {
        Ok(())
    }

    /// Inspect a packet. `Ok(Some)` passes it (possibly replaced) to the next
    /// handler, `Ok(None)` drops it, `Err` ends the session.
    async fn handle(
        &self,
        ctx: &SessionContext,
        origin: Origin,
        packet: Packet,
    ) -> Result<Option<Packet>, ProxyError>;

    /// Called once after both directions stopped.
    async fn on_session_end(&self, _ctx: &SessionContext) {}
}

/// Run `packet` through `handlers` in order.
pub async fn run_chain(
    handlers: &[Arc<dyn PacketHandler>],
    ctx: &SessionContext,
    origin: Origin,
    packet: Packet,
) -> Result<Option<Packet>, ProxyError> {
    let mut packet = packet;
    for handler in handlers {
        match handler.handle(ctx, origin, packet).await? {
            Some(next) => packet = next,
            None => {
                tracing::trace!("{} dropped a packet from {origin:?}", handler.name());
                return Ok(None);
            }
        }
    }
    Ok(Some(packet))
}
