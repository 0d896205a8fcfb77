//! Blob cache stage of the handler chain.
//!
//! Terrain packets that reference cached blobs are handed to the engine and
//! only come out again once every blob is known. Whatever the engine asks to
//! be written is written here, and every resolved packet is passed to the
//! [`ResolvedConsumer`] before anything else sees it.

use std::sync::Arc;

use async_trait::async_trait;
use bedrock_blobcache::{BlobCache, CacheOutcome};
use bedrock_net::{CacheBlob, ClientCacheStatus, Packet};
use tracing::{debug, info, trace, warn};

use crate::error::ProxyError;
use crate::handler::{Origin, PacketHandler, SessionContext};

/// Receives terrain packets with every blob filled in, in resolution order.
#[async_trait]
pub trait ResolvedConsumer: Send + Sync {
    async fn consume(&self, ctx: &SessionContext, packet: &Packet) -> Result<(), ProxyError>;

    /// Blobs a terrain packet referenced that were already in the store.
    /// Called before the packet resolves.
    async fn hit_blobs(&self, _ctx: &SessionContext, _blobs: &[CacheBlob]) {}
}

pub struct BlobCacheHandler {
    cache: Arc<BlobCache>,
    consumer: Option<Arc<dyn ResolvedConsumer>>,
}

impl BlobCacheHandler {
    pub fn new(cache: Arc<BlobCache>) -> Self {
        Self {
            cache,
            consumer: None,
        }
    }

    /// Send resolved terrain to `consumer`.
    pub fn with_consumer(mut self, consumer: Arc<dyn ResolvedConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    async fn consume(&self, ctx: &SessionContext, packet: &Packet) -> Result<(), ProxyError> {
        match &self.consumer {
            Some(consumer) => consumer.consume(ctx, packet).await,
            None => Ok(()),
        }
    }

    /// Carry out what the engine decided. Returns the packet to pass on.
    async fn apply(
        &self,
        ctx: &SessionContext,
        outcome: CacheOutcome,
    ) -> Result<Option<Packet>, ProxyError> {
        if !outcome.hit_blobs.is_empty() {
            trace!(hits = outcome.hit_blobs.len(), "Served blobs from the store");
            if let Some(consumer) = &self.consumer {
                consumer.hit_blobs(ctx, &outcome.hit_blobs).await;
            }
        }
        for packet in &outcome.to_upstream {
            ctx.upstream().write_packet(packet).await?;
        }
        for packet in &outcome.to_downstream {
            ctx.downstream().write_packet(packet).await?;
        }
        for packet in &outcome.resolved {
            self.consume(ctx, packet).await?;
            if outcome.deliver_resolved {
                ctx.downstream().write_packet(packet).await?;
            }
        }
        Ok(outcome.forward)
    }
}

#[async_trait]
impl PacketHandler for BlobCacheHandler {
    fn name(&self) -> &'static str {
        "blobcache"
    }

    async fn on_session_start(&self, _ctx: &SessionContext) -> Result<(), ProxyError> {
        if !self.cache.store().is_persistent() {
            warn!("Blob store is memory-only, blobs will not survive this session");
        }
        Ok(())
    }

    async fn handle(
        &self,
        ctx: &SessionContext,
        origin: Origin,
        packet: Packet,
    ) -> Result<Option<Packet>, ProxyError> {
        match (origin, packet) {
            (Origin::Server, Packet::LevelChunk(pk)) if pk.cache_enabled => {
                let outcome = self.cache.handle_chunk(pk, ctx.client_cache())?;
                self.apply(ctx, outcome).await
            }
            (Origin::Server, Packet::SubChunk(pk)) if pk.cache_enabled => {
                let outcome = self.cache.handle_sub_chunk(pk, ctx.client_cache())?;
                self.apply(ctx, outcome).await
            }
            // blobs were requested by us, not by the client
            (Origin::Server, Packet::ClientCacheMissResponse(pk)) => {
                let outcome = self.cache.handle_miss_response(pk, ctx.client_cache())?;
                self.apply(ctx, outcome).await?;
                Ok(None)
            }
            (Origin::Server, packet @ (Packet::LevelChunk(_) | Packet::SubChunk(_))) => {
                self.consume(ctx, &packet).await?;
                Ok(Some(packet))
            }
            (Origin::Client, Packet::ClientCacheStatus(pk)) => {
                debug!(enabled = pk.enabled, "Client blob cache status");
                ctx.set_client_cache(pk.enabled);
                Ok(Some(Packet::ClientCacheStatus(ClientCacheStatus {
                    enabled: true,
                })))
            }
            (Origin::Client, Packet::ClientCacheBlobStatus(pk)) => {
                let outcome = self.cache.handle_downstream_status(pk)?;
                self.apply(ctx, outcome).await?;
                Ok(None)
            }
            (_, packet) => Ok(Some(packet)),
        }
    }

    async fn on_session_end(&self, _ctx: &SessionContext) {
        let stats = self.cache.stats();
        info!(
            pending_fills = stats.pending_fills,
            pending_delivers = stats.pending_delivers,
            in_flight = stats.in_flight,
            queued = stats.queued,
            stored = self.cache.store().len(),
            "Blob cache at session end"
        );
        if let Err(e) = self.cache.store().flush() {
            warn!("Failed to flush blob store: {e}");
        }
    }
}
