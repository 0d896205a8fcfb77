//! Bedrock relay: sits between a game client and a server, rebuilds
//! blob-cached terrain and captures the streamed world.

pub mod error;
pub mod handler;
pub mod handlers;
pub mod listener;
pub mod session;

pub use error::ProxyError;
pub use handler::{Origin, PacketHandler, SessionContext, run_chain};
pub use handlers::{BlobCacheHandler, ResolvedConsumer, WorldHandler};
pub use listener::ProxyListener;
pub use session::{DirectionEnd, ProxySession, SessionEnd};
