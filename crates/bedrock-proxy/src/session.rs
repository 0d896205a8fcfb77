//! One relayed client/server pair.
//!
//! Each direction runs in its own task: read a packet, pass it through the
//! handler chain, write the result to the other peer. Packets from one peer
//! are written in the order they were read. When either direction stops, the
//! other one is told to stop too and the peer that is still connected gets a
//! disconnect message.

use std::sync::Arc;

use bedrock_net::{Disconnect, Packet, PacketSink, PacketSource};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::handler::{Origin, PacketHandler, SessionContext, run_chain};

/// Why a relay direction stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectionEnd {
    /// The peer closed its side.
    Closed,
    /// The other direction or the listener asked us to stop.
    Cancelled,
    /// Reading, handling or writing failed.
    Failed(String),
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnd {
    /// Outcome of the client → server direction.
    pub client: DirectionEnd,
    /// Outcome of the server → client direction.
    pub server: DirectionEnd,
    /// Message sent to the peer that was still connected.
    pub reason: String,
}

/// Wait until the flag turns true. A dropped sender never fires.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// A relay between one client and one server.
pub struct ProxySession {
    ctx: Arc<SessionContext>,
    handlers: Arc<[Arc<dyn PacketHandler>]>,
    disconnect_reason: String,
}

impl ProxySession {
    /// `upstream` writes to the server, `downstream` to the client.
    pub fn new(
        upstream: Arc<dyn PacketSink>,
        downstream: Arc<dyn PacketSink>,
        handlers: Vec<Arc<dyn PacketHandler>>,
        disconnect_reason: impl Into<String>,
    ) -> Self {
        Self {
            ctx: Arc::new(SessionContext::new(upstream, downstream)),
            handlers: handlers.into(),
            disconnect_reason: disconnect_reason.into(),
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Relay until either peer goes away, a handler fails or `shutdown`
    /// turns true. Returns once both directions stopped and every handler
    /// saw the end of the session.
    pub async fn run(
        self,
        client: Box<dyn PacketSource>,
        server: Box<dyn PacketSource>,
        shutdown: watch::Receiver<bool>,
    ) -> SessionEnd {
        for handler in self.handlers.iter() {
            if let Err(e) = handler.on_session_start(&self.ctx).await {
                warn!("Handler {} failed to start: {e}", handler.name());
                let reason = e.to_string();
                self.notify(Origin::Client, &reason).await;
                self.close_both().await;
                return SessionEnd {
                    client: DirectionEnd::Cancelled,
                    server: DirectionEnd::Cancelled,
                    reason,
                };
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);

        let client_task = tokio::spawn(relay(
            Origin::Client,
            client,
            Arc::clone(&self.ctx),
            Arc::clone(&self.handlers),
            Arc::clone(&stop_tx),
            stop_rx.clone(),
            shutdown.clone(),
        ));
        let server_task = tokio::spawn(relay(
            Origin::Server,
            server,
            Arc::clone(&self.ctx),
            Arc::clone(&self.handlers),
            Arc::clone(&stop_tx),
            stop_rx,
            shutdown,
        ));

        let client_end = client_task
            .await
            .unwrap_or_else(|e| DirectionEnd::Failed(format!("relay task: {e}")));
        let server_end = server_task
            .await
            .unwrap_or_else(|e| DirectionEnd::Failed(format!("relay task: {e}")));

        let reason = self.finish(&client_end, &server_end).await;

        for handler in self.handlers.iter() {
            handler.on_session_end(&self.ctx).await;
        }
        info!(client = ?client_end, server = ?server_end, "Session ended: {reason}");
        SessionEnd {
            client: client_end,
            server: server_end,
            reason,
        }
    }

    /// Tell whichever peer is still there why the session ended, then close
    /// both writers.
    async fn finish(&self, client: &DirectionEnd, server: &DirectionEnd) -> String {
        let (reason, notify) = match (client, server) {
            // a failure is reported to the peer on the other side of it
            (DirectionEnd::Failed(reason), _) => (reason.clone(), Some(Origin::Server)),
            (_, DirectionEnd::Failed(reason)) => (reason.clone(), Some(Origin::Client)),
            (DirectionEnd::Closed, DirectionEnd::Closed) => (self.disconnect_reason.clone(), None),
            (DirectionEnd::Closed, _) => (self.disconnect_reason.clone(), Some(Origin::Server)),
            (_, DirectionEnd::Closed) => (self.disconnect_reason.clone(), Some(Origin::Client)),
            (DirectionEnd::Cancelled, DirectionEnd::Cancelled) => {
                (self.disconnect_reason.clone(), Some(Origin::Client))
            }
        };
        if let Some(peer) = notify {
            self.notify(peer, &reason).await;
        }
        self.close_both().await;
        reason
    }

    async fn notify(&self, peer: Origin, reason: &str) {
        let packet = Packet::Disconnect(Disconnect {
            message: reason.to_string(),
        });
        if let Err(e) = self.ctx.sink(peer).write_packet(&packet).await {
            debug!("Could not send disconnect to {peer:?}: {e}");
        }
    }

    async fn close_both(&self) {
        for peer in [Origin::Client, Origin::Server] {
            if let Err(e) = self.ctx.sink(peer).close().await {
                debug!("Closing {peer:?} writer: {e}");
            }
        }
    }
}

async fn relay(
    origin: Origin,
    mut reader: Box<dyn PacketSource>,
    ctx: Arc<SessionContext>,
    handlers: Arc<[Arc<dyn PacketHandler>]>,
    stop_tx: Arc<watch::Sender<bool>>,
    mut stop_rx: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> DirectionEnd {
    let target = ctx.sink(origin.counterpart()).clone();
    let end = loop {
        let read = tokio::select! {
            read = reader.read_packet() => read,
            _ = stopped(&mut stop_rx) => break DirectionEnd::Cancelled,
            _ = stopped(&mut shutdown) => break DirectionEnd::Cancelled,
        };
        let packet = match read {
            Ok(packet) => packet,
            Err(e) if e.is_closed() => {
                debug!("{origin:?} closed the connection");
                break DirectionEnd::Closed;
            }
            Err(e) => break DirectionEnd::Failed(format!("{origin:?} connection: {e}")),
        };

        let name = packet.name();
        match run_chain(&handlers, &ctx, origin, packet).await {
            Ok(Some(packet)) => {
                if let Err(e) = target.write_packet(&packet).await {
                    break DirectionEnd::Failed(format!("writing {name}: {e}"));
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Handling {name} from {origin:?} failed: {e}");
                break DirectionEnd::Failed(e.to_string());
            }
        }
    };
    let _ = stop_tx.send(true);
    end
}
