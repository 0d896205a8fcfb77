//! Handlers installed on every session.

pub mod blobcache;
pub mod world;

pub use blobcache::{BlobCacheHandler, ResolvedConsumer};
pub use world::WorldHandler;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bedrock_net::{ConnError, Packet, PacketSink};

    use crate::handler::SessionContext;

    /// Sink that keeps everything written to it.
    #[derive(Default)]
    pub struct RecordingSink {
        pub packets: Mutex<Vec<Packet>>,
    }

    impl RecordingSink {
        pub fn take(&self) -> Vec<Packet> {
            std::mem::take(&mut *self.packets.lock().unwrap())
        }
    }

    #[async_trait]
    impl PacketSink for RecordingSink {
        async fn write_packet(&self, packet: &Packet) -> Result<(), ConnError> {
            self.packets.lock().unwrap().push(packet.clone());
            Ok(())
        }

        async fn close(&self) -> Result<(), ConnError> {
            Ok(())
        }
    }

    /// A context whose upstream and downstream writers record.
    pub fn recording_context() -> (SessionContext, Arc<RecordingSink>, Arc<RecordingSink>) {
        let upstream = Arc::new(RecordingSink::default());
        let downstream = Arc::new(RecordingSink::default());
        let ctx = SessionContext::new(upstream.clone(), downstream.clone());
        (ctx, upstream, downstream)
    }
}
