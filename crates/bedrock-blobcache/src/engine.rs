//! Blob cache synchronization engine.
//!
//! Tracks which blobs each chunk and sub-chunk packet still needs, asks the
//! server for them, and rebuilds the packets once every blob is known. Sub-chunk
//! packets for a column whose chunk packet is still waiting are held back until
//! that chunk resolves.
//!
//! All bookkeeping lives behind one mutex. The engine never touches the
//! network: every operation returns a [`CacheOutcome`] listing what the caller
//! should write and where, so the lock is never held across I/O.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bedrock_config::BlobCacheConfig;
use bedrock_net::{
    BlobHash, CacheBlob, ChunkPos, ClientCacheBlobStatus, ClientCacheMissResponse, LevelChunk,
    Packet, SubChunk,
};
use tracing::{debug, trace, warn};

use crate::carrier::{BlobCarrier, Skeleton};
use crate::error::BlobCacheError;
use crate::store::BlobStore;

/// Identifies a waiter in the engine's arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaitId(u64);

/// Result of one engine operation.
#[derive(Debug, Default)]
pub struct CacheOutcome {
    /// Packet to pass on to the rest of the handler chain, if any.
    pub forward: Option<Packet>,
    /// Packets to write to the server.
    pub to_upstream: Vec<Packet>,
    /// Packets to write to the client.
    pub to_downstream: Vec<Packet>,
    /// Packets whose blobs are all known, already filled, in resolution order.
    pub resolved: Vec<Packet>,
    /// Whether `resolved` should also be written to the client. Set when the
    /// client keeps no blob cache of its own.
    pub deliver_resolved: bool,
    /// Blobs that were already cached, for out-of-band capture.
    pub hit_blobs: Vec<CacheBlob>,
}

/// Counters describing outstanding work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Packets waiting for blobs or for their column.
    pub pending_fills: usize,
    /// Client miss reports waiting for blobs.
    pub pending_delivers: usize,
    /// Distinct hashes some fill is waiting on.
    pub waited_hashes: usize,
    /// Hashes requested from the server and not yet delivered.
    pub in_flight: usize,
    /// Hashes held back by the in-flight cap.
    pub queued: usize,
    /// Columns whose chunk packet is still waiting.
    pub pending_columns: usize,
}

/// Server-side wait: a packet and how many blobs or columns it still needs.
struct PendingFill {
    skeleton: Skeleton,
    remaining: usize,
}

/// Client-side wait: hashes a client asked for that were not yet known.
struct PendingDeliver {
    hashes: Vec<BlobHash>,
    remaining: usize,
}

#[derive(Default)]
struct CacheState {
    next_id: u64,
    fills: HashMap<WaitId, PendingFill>,
    fill_waiters: HashMap<BlobHash, Vec<WaitId>>,
    delivers: HashMap<WaitId, PendingDeliver>,
    deliver_waiters: HashMap<BlobHash, Vec<WaitId>>,
    pending_columns: HashMap<ChunkPos, WaitId>,
    dependents: HashMap<ChunkPos, Vec<WaitId>>,
    in_flight: HashSet<BlobHash>,
    queued: VecDeque<BlobHash>,
}

/// The blob cache engine. Shared by both relay directions.
pub struct BlobCache {
    store: BlobStore,
    config: BlobCacheConfig,
    state: Mutex<CacheState>,
}

impl BlobCache {
    /// Creates an engine over an opened store.
    pub fn new(store: BlobStore, config: BlobCacheConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cap(&self) -> Option<usize> {
        self.config
            .enforce_inflight_cap
            .then_some(self.config.max_inflight.max(1))
    }

    /// Snapshot of outstanding work.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            pending_fills: state.fills.len(),
            pending_delivers: state.delivers.len(),
            waited_hashes: state.fill_waiters.len(),
            in_flight: state.in_flight.len(),
            queued: state.queued.len(),
            pending_columns: state.pending_columns.len(),
        }
    }

    /// Number of fills registered against `hash`.
    pub fn waiters_on(&self, hash: BlobHash) -> usize {
        self.lock().fill_waiters.get(&hash).map_or(0, Vec::len)
    }

    // -----------------------------------------------------------------------
    // Server → client
    // -----------------------------------------------------------------------

    /// A chunk column arrived from the server.
    pub fn handle_chunk(
        &self,
        chunk: LevelChunk,
        client_cache: bool,
    ) -> Result<CacheOutcome, BlobCacheError> {
        let forward = client_cache.then(|| Packet::LevelChunk(chunk.clone()));
        let position = chunk.position;
        let mut outcome = self.register(Skeleton::Chunk(chunk), client_cache, |state, id| {
            state.pending_columns.insert(position, id);
        })?;
        outcome.forward = forward;
        Ok(outcome)
    }

    /// Vertical slices arrived from the server.
    pub fn handle_sub_chunk(
        &self,
        sub_chunk: SubChunk,
        client_cache: bool,
    ) -> Result<CacheOutcome, BlobCacheError> {
        let forward = client_cache.then(|| Packet::SubChunk(sub_chunk.clone()));
        let mut outcome = self.register(Skeleton::SubChunk(sub_chunk), client_cache, |_, _| {})?;
        outcome.forward = forward;
        Ok(outcome)
    }

    /// Shared registration path for both carrier kinds.
    ///
    /// `on_miss` runs under the lock when at least one blob is missing.
    fn register(
        &self,
        skeleton: Skeleton,
        client_cache: bool,
        on_miss: impl FnOnce(&mut CacheState, WaitId),
    ) -> Result<CacheOutcome, BlobCacheError> {
        let mut outcome = CacheOutcome {
            deliver_resolved: !client_cache,
            ..Default::default()
        };
        let cap = self.cap();
        let mut state = self.lock();
        let id = state.allocate_id();

        let carrier = skeleton.carrier();
        let mut status = ClientCacheBlobStatus::default();
        let mut new_misses = Vec::new();
        let mut remaining = 0;
        for hash in carrier.blob_hashes() {
            if let Some(payload) = self.store.get(hash)? {
                status.hit_hashes.push(hash);
                outcome.hit_blobs.push(CacheBlob { hash, payload });
                continue;
            }
            remaining += 1;
            let waiters = state.fill_waiters.entry(hash).or_default();
            if waiters.is_empty() {
                new_misses.push(hash);
            }
            waiters.push(id);
        }
        if remaining > 0 {
            on_miss(&mut *state, id);
        }

        if matches!(skeleton, Skeleton::SubChunk(_)) {
            for column in carrier.columns() {
                if state.pending_columns.contains_key(&column) {
                    state.dependents.entry(column).or_default().push(id);
                    remaining += 1;
                }
            }
        }

        status.miss_hashes = state.admit(new_misses, cap);
        if !status.is_empty() {
            outcome
                .to_upstream
                .push(Packet::ClientCacheBlobStatus(status));
        }

        trace!(?id, remaining, hits = outcome.hit_blobs.len(), "Registered fill");
        state.fills.insert(
            id,
            PendingFill {
                skeleton,
                remaining,
            },
        );
        if remaining == 0 {
            state.resolve_fill(id, &self.store, &mut outcome)?;
        }
        Ok(outcome)
    }

    /// The server delivered blobs.
    pub fn handle_miss_response(
        &self,
        response: ClientCacheMissResponse,
        client_cache: bool,
    ) -> Result<CacheOutcome, BlobCacheError> {
        let mut outcome = CacheOutcome {
            deliver_resolved: !client_cache,
            ..Default::default()
        };
        let cap = self.cap();
        let mut state = self.lock();

        for blob in response.blobs {
            let hash = blob.hash;
            self.store.put(hash, &blob.payload)?;
            state.in_flight.remove(&hash);

            let fills = state.fill_waiters.remove(&hash);
            let delivers = state.deliver_waiters.remove(&hash);
            if fills.is_none() && delivers.is_none() {
                if self.config.replay {
                    debug!("Blob {hash:#018x} delivered with no waiter");
                } else {
                    warn!("Unexpected blob {hash:#018x} in miss response");
                }
                continue;
            }

            for id in fills.unwrap_or_default() {
                if state.decrement_fill(id) {
                    state.resolve_fill(id, &self.store, &mut outcome)?;
                }
            }
            for id in delivers.unwrap_or_default() {
                if let Some(response) = state.decrement_deliver(id, &self.store)? {
                    outcome
                        .to_downstream
                        .push(Packet::ClientCacheMissResponse(response));
                }
            }
        }

        let drained = state.drain_queue(cap);
        if !drained.is_empty() {
            debug!(count = drained.len(), "Requesting queued blobs");
            outcome
                .to_upstream
                .push(Packet::ClientCacheBlobStatus(ClientCacheBlobStatus {
                    miss_hashes: drained,
                    hit_hashes: Vec::new(),
                }));
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Client → server
    // -----------------------------------------------------------------------

    /// The client reported blobs missing from its own cache. Answered from the
    /// store; never forwarded to the server.
    pub fn handle_downstream_status(
        &self,
        status: ClientCacheBlobStatus,
    ) -> Result<CacheOutcome, BlobCacheError> {
        let mut outcome = CacheOutcome::default();
        let mut found = Vec::new();
        let mut unknown = Vec::new();
        for hash in status.miss_hashes {
            match self.store.get(hash)? {
                Some(payload) => found.push(CacheBlob { hash, payload }),
                None => unknown.push(hash),
            }
        }

        if !found.is_empty() {
            outcome
                .to_downstream
                .push(Packet::ClientCacheMissResponse(ClientCacheMissResponse {
                    blobs: found,
                }));
        }

        if !unknown.is_empty() {
            debug!(count = unknown.len(), "Client asked for blobs not yet received");
            let mut state = self.lock();
            let id = state.allocate_id();
            for &hash in &unknown {
                state.deliver_waiters.entry(hash).or_default().push(id);
            }
            state.delivers.insert(
                id,
                PendingDeliver {
                    remaining: unknown.len(),
                    hashes: unknown,
                },
            );
        }
        Ok(outcome)
    }
}

impl CacheState {
    fn allocate_id(&mut self) -> WaitId {
        self.next_id += 1;
        WaitId(self.next_id)
    }

    /// Split freshly missed hashes into those requested now and those queued.
    fn admit(&mut self, misses: Vec<BlobHash>, cap: Option<usize>) -> Vec<BlobHash> {
        let mut request = Vec::with_capacity(misses.len());
        for hash in misses {
            if cap.is_none_or(|cap| self.in_flight.len() < cap) {
                self.in_flight.insert(hash);
                request.push(hash);
            } else {
                self.queued.push_back(hash);
            }
        }
        request
    }

    /// Promote queued hashes while capacity allows.
    fn drain_queue(&mut self, cap: Option<usize>) -> Vec<BlobHash> {
        let mut request = Vec::new();
        while cap.is_none_or(|cap| self.in_flight.len() < cap)
            && let Some(hash) = self.queued.pop_front()
        {
            // Delivered while queued.
            if !self.fill_waiters.contains_key(&hash) {
                continue;
            }
            if self.in_flight.insert(hash) {
                request.push(hash);
            }
        }
        request
    }

    /// Returns `true` when the fill reached zero.
    fn decrement_fill(&mut self, id: WaitId) -> bool {
        match self.fills.get_mut(&id) {
            Some(fill) => {
                fill.remaining = fill.remaining.saturating_sub(1);
                fill.remaining == 0
            }
            None => false,
        }
    }

    /// Returns the response to send when the deliver reached zero.
    fn decrement_deliver(
        &mut self,
        id: WaitId,
        store: &BlobStore,
    ) -> Result<Option<ClientCacheMissResponse>, BlobCacheError> {
        let Some(deliver) = self.delivers.get_mut(&id) else {
            return Ok(None);
        };
        deliver.remaining = deliver.remaining.saturating_sub(1);
        if deliver.remaining > 0 {
            return Ok(None);
        }
        let Some(deliver) = self.delivers.remove(&id) else {
            return Ok(None);
        };
        let mut blobs = Vec::with_capacity(deliver.hashes.len());
        for hash in deliver.hashes {
            if let Some(payload) = store.get(hash)? {
                blobs.push(CacheBlob { hash, payload });
            }
        }
        Ok(Some(ClientCacheMissResponse { blobs }))
    }

    /// Fill and emit a packet whose countdown reached zero, then release any
    /// sub-chunks that were waiting on its column.
    fn resolve_fill(
        &mut self,
        id: WaitId,
        store: &BlobStore,
        outcome: &mut CacheOutcome,
    ) -> Result<(), BlobCacheError> {
        let Some(fill) = self.fills.remove(&id) else {
            return Ok(());
        };

        let column = match &fill.skeleton {
            Skeleton::Chunk(chunk) => Some(chunk.position),
            Skeleton::SubChunk(_) => None,
        };
        if let Some(column) = column
            && self.pending_columns.get(&column) == Some(&id)
        {
            self.pending_columns.remove(&column);
        }

        outcome.resolved.push(fill.skeleton.into_filled(store)?);
        trace!(?id, "Resolved fill");

        if let Some(column) = column
            && !self.pending_columns.contains_key(&column)
            && let Some(dependents) = self.dependents.remove(&column)
        {
            for dependent in dependents {
                if self.decrement_fill(dependent) {
                    self.resolve_fill(dependent, store, outcome)?;
                }
            }
        }
        Ok(())
    }
}
