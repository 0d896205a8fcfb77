//! Accepts game clients and relays each one to the configured server.

use std::sync::Arc;

use bedrock_blobcache::BlobCache;
use bedrock_config::Config;
use bedrock_net::{Disconnect, FrameConfig, Packet, PacketCodec, PacketSink, connect, split_tcp};
use bedrock_world::MapNotifier;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::ProxyError;
use crate::handler::PacketHandler;
use crate::handlers::{BlobCacheHandler, WorldHandler};
use crate::session::{ProxySession, SessionEnd};

/// Relay front end. Serves one client at a time; the blob cache outlives
/// sessions, world capture starts fresh for each one.
pub struct ProxyListener {
    config: Config,
    cache: Arc<BlobCache>,
    notifier: Arc<dyn MapNotifier>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ProxyListener {
    pub fn new(config: Config, cache: Arc<BlobCache>, notifier: Arc<dyn MapNotifier>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            cache,
            notifier,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(&self.config.proxy.listen_address).await?;
        tracing::info!("Relay listening on {}", listener.local_addr()?);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), ProxyError> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = result?;
                    tracing::info!("Accepted client {peer_addr}");
                    match self.serve(stream).await {
                        Ok(end) => tracing::info!("Client {peer_addr} done: {}", end.reason),
                        Err(e) => tracing::warn!("Session with {peer_addr} failed: {e}"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Relay shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Signal the listener and any running session to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn codec(&self) -> (PacketCodec, FrameConfig) {
        (
            PacketCodec::new(self.config.proxy.codec_version),
            FrameConfig {
                max_payload_size: self.config.proxy.max_frame_size,
            },
        )
    }

    fn handlers(&self) -> Vec<Arc<dyn PacketHandler>> {
        let world = Arc::new(WorldHandler::new(
            &self.config.world,
            self.config.proxy.server_name.clone(),
            Arc::clone(&self.notifier),
        ));
        let blobs: Arc<dyn PacketHandler> =
            Arc::new(BlobCacheHandler::new(Arc::clone(&self.cache)).with_consumer(world.clone()));
        let world: Arc<dyn PacketHandler> = world;
        vec![blobs, world]
    }

    async fn serve(&self, stream: TcpStream) -> Result<SessionEnd, ProxyError> {
        let (codec, frame) = self.codec();
        let (client_reader, client_writer) = split_tcp(stream, codec, frame.clone())?;

        let upstream = &self.config.proxy.upstream_address;
        let (server_reader, server_writer, _) = match connect(upstream, codec, frame).await {
            Ok(conn) => conn,
            Err(e) => {
                let message = format!("Could not reach {upstream}: {e}");
                let _ = client_writer
                    .write_packet(&Packet::Disconnect(Disconnect { message }))
                    .await;
                let _ = client_writer.close().await;
                return Err(e.into());
            }
        };

        let session = ProxySession::new(
            Arc::new(server_writer),
            Arc::new(client_writer),
            self.handlers(),
            self.config.proxy.disconnect_reason.clone(),
        );
        Ok(session
            .run(
                Box::new(client_reader),
                Box::new(server_reader),
                self.shutdown_rx.clone(),
            )
            .await)
    }
}
