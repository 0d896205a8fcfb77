//! World capture stage.
//!
//! Terrain reaches the assembler through [`ResolvedConsumer`] so that cached
//! packets are only seen once their blobs are filled. Everything else the
//! assembler cares about is read straight off the chain. Saving a world
//! touches the disk, so it runs on the blocking pool.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bedrock_config::WorldConfig;
use bedrock_net::Packet;
use bedrock_world::{ChunkAssembler, MapNotifier, PlayerPosition};
use tracing::{error, info, warn};

use crate::error::ProxyError;
use crate::handler::{Origin, PacketHandler, SessionContext};
use crate::handlers::blobcache::ResolvedConsumer;

pub struct WorldHandler {
    assembler: Arc<Mutex<ChunkAssembler>>,
}

fn lock(assembler: &Mutex<ChunkAssembler>) -> MutexGuard<'_, ChunkAssembler> {
    assembler.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorldHandler {
    pub fn new(
        config: &WorldConfig,
        server_name: impl Into<String>,
        notifier: Arc<dyn MapNotifier>,
    ) -> Self {
        Self {
            assembler: Arc::new(Mutex::new(ChunkAssembler::new(
                config,
                server_name,
                notifier,
            ))),
        }
    }

    pub fn assembler(&self) -> &Arc<Mutex<ChunkAssembler>> {
        &self.assembler
    }

    async fn change_dimension(&self, dimension: i32) -> Result<(), ProxyError> {
        let assembler = Arc::clone(&self.assembler);
        let saved =
            tokio::task::spawn_blocking(move || lock(&assembler).on_dimension_change(dimension))
                .await?;
        match saved {
            Ok(Some(path)) => info!("World saved to {}", path.display()),
            Ok(None) => {}
            Err(e) => error!("Keeping captured world after failed save: {e}"),
        }
        Ok(())
    }
}

#[async_trait]
impl ResolvedConsumer for WorldHandler {
    async fn consume(&self, ctx: &SessionContext, packet: &Packet) -> Result<(), ProxyError> {
        match packet {
            Packet::LevelChunk(pk) => {
                let result = lock(&self.assembler).process_chunk(pk);
                match result {
                    Ok(Some(request)) => {
                        ctx.upstream()
                            .write_packet(&Packet::SubChunkRequest(request))
                            .await?;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(
                        "Dropping column {},{}: {e}",
                        pk.position.x, pk.position.z
                    ),
                }
            }
            Packet::SubChunk(pk) => {
                lock(&self.assembler).process_sub_chunk(pk);
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl PacketHandler for WorldHandler {
    fn name(&self) -> &'static str {
        "world"
    }

    async fn handle(
        &self,
        _ctx: &SessionContext,
        origin: Origin,
        packet: Packet,
    ) -> Result<Option<Packet>, ProxyError> {
        match (origin, &packet) {
            (Origin::Server, Packet::ChangeDimension(pk)) => {
                self.change_dimension(pk.dimension).await?;
            }
            (Origin::Server, Packet::StartGame(pk)) => lock(&self.assembler).on_start_game(pk),
            (Origin::Server, Packet::GameRulesChanged(pk)) => {
                lock(&self.assembler).on_game_rules(pk)
            }
            (Origin::Server, Packet::AddActor(pk)) => lock(&self.assembler).on_add_actor(pk),
            (Origin::Server, Packet::SetActorData(pk)) => {
                lock(&self.assembler).on_set_actor_data(pk)
            }
            (Origin::Server, Packet::RemoveActor(pk)) => lock(&self.assembler).on_remove_actor(pk),
            (Origin::Server, Packet::SetActorMotion(pk)) => {
                lock(&self.assembler).on_actor_motion(pk)
            }
            (Origin::Server, Packet::MoveActorDelta(pk)) => {
                lock(&self.assembler).on_move_actor_delta(pk)
            }
            (Origin::Server, Packet::MoveActorAbsolute(pk)) => {
                lock(&self.assembler).on_move_actor_absolute(pk)
            }
            (Origin::Client, Packet::MovePlayer(pk)) => {
                lock(&self.assembler).set_player_position(PlayerPosition {
                    position: pk.position,
                    pitch: pk.pitch,
                    yaw: pk.yaw,
                    head_yaw: pk.head_yaw,
                })
            }
            _ => {}
        }
        Ok(Some(packet))
    }

    async fn on_session_end(&self, _ctx: &SessionContext) {
        let assembler = Arc::clone(&self.assembler);
        match tokio::task::spawn_blocking(move || lock(&assembler).save_and_reset()).await {
            Ok(Ok(Some(path))) => info!("World saved to {}", path.display()),
            Ok(Ok(None)) => info!("Nothing captured, no world saved"),
            Ok(Err(e)) => error!("Failed to save world at session end: {e}"),
            Err(e) => error!("World save task failed: {e}"),
        }
    }
}
