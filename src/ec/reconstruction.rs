//! Reconstruction Coordinator
//!
//! One [`StripeReconstructor`] owns the recovery of a single stripe: it
//! issues a read for every chunk position, folds the answers into the chunk
//! table, declares the stripe recoverable once k chunks arrived (or
//! unrecoverable once more than m failed) and finally decodes the missing
//! chunks in place.
//!
//! # Terminal States
//!
//! ```text
//! Pending ──► Completed ──► Decoding ──► Decoded
//!    │            │             │
//!    └────────────┴─────────────┴──► Aborted
//! ```
//!
//! The state, the chunk table and both counters live behind one session
//! lock, so each terminal transition happens exactly once. Callbacks run on
//! the transition edge after the lock is released.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::aggregator::ResponseAggregator;
use super::buffer::{BufferPool, BufferPoolConfig, PooledBuffer};
use super::chunk::{ChunkState, ChunkTable};
use super::policy::{CommittedExtents, StripingPolicy};
use crate::domain::ports::{
    ChunkReadRequest, EcCodec, FileId, LocalReadExecutor, PeerClient, PeerTable, ReadFuture,
    ReconstructionCallback,
};
use crate::error::{Error, Result};
use crate::telemetry::LogConfig;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for reconstruction sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Per-read timeout in milliseconds; a read that does not answer in
    /// time counts as failed. `None` waits for the transport.
    pub read_timeout_ms: Option<u64>,

    /// Buffer pool settings
    pub pool: BufferPoolConfig,

    /// Logging settings
    pub log: LogConfig,
}

impl ReconstructionConfig {
    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_ms == Some(0) {
            return Err(Error::Config(
                "read_timeout_ms must be greater than 0".to_string(),
            ));
        }
        self.pool.validate()
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

// =============================================================================
// Session Inputs
// =============================================================================

/// The stripe a session rebuilds.
#[derive(Debug, Clone)]
pub struct StripeTarget {
    pub file_id: FileId,
    pub stripe: u64,
    /// Policy as seen from this node
    pub policy: StripingPolicy,
    /// Committed extents sent along with every read
    pub committed: CommittedExtents,
    /// Storage node per position
    pub peers: PeerTable,
}

/// Shared collaborators, reusable across sessions.
#[derive(Clone)]
pub struct Collaborators {
    pub local: Arc<dyn LocalReadExecutor>,
    pub remote: Arc<dyn PeerClient>,
    pub codec: Arc<dyn EcCodec>,
    pub pool: Arc<BufferPool>,
}

impl Collaborators {
    /// Collaborators drawing buffers from the process-wide pool
    pub fn new(
        local: Arc<dyn LocalReadExecutor>,
        remote: Arc<dyn PeerClient>,
        codec: Arc<dyn EcCodec>,
    ) -> Self {
        Self {
            local,
            remote,
            codec,
            pool: BufferPool::global(),
        }
    }

    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("data_shards", &self.codec.data_shards())
            .field("parity_shards", &self.codec.parity_shards())
            .field("pool", &self.pool)
            .finish()
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Terminal state of a reconstruction session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Reads outstanding, outcome undecided
    Pending,
    /// At least k chunks arrived
    Completed,
    /// Decode in progress
    Decoding,
    /// Every chunk is available
    Decoded,
    /// More than m chunks failed, or the owner aborted
    Aborted,
}

/// What a single result did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Counted; the session is still undecided
    Pending,
    /// This result completed the session
    Completed,
    /// The session is aborted; remaining work should stop
    Aborted,
    /// The session had already moved on; the result was dropped
    Ignored,
}

impl Outcome {
    pub fn should_stop(self) -> bool {
        self == Outcome::Aborted
    }
}

struct Session {
    state: SessionState,
    chunks: ChunkTable,
    successes: usize,
    failures: usize,
    decoded: Option<Arc<DecodedStripe>>,
}

impl Session {
    fn release(&mut self) -> usize {
        let decoded = self.decoded.take().map_or(0, |d| d.buffers.len());
        self.chunks.free_buffers() + decoded
    }
}

struct DecodedStripe {
    buffers: Vec<PooledBuffer>,
    /// Positions holding real chunk content after decode
    filled: Vec<bool>,
}

/// Read-only view of one decoded chunk.
///
/// The view keeps the decoded stripe alive; its buffers go back to the
/// pool once the session released them and the last view is dropped.
pub struct ChunkView {
    stripe: Arc<DecodedStripe>,
    position: usize,
}

impl ChunkView {
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Deref for ChunkView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.stripe.buffers[self.position]
    }
}

impl AsRef<[u8]> for ChunkView {
    fn as_ref(&self) -> &[u8] {
        &**self
    }
}

impl fmt::Debug for ChunkView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkView")
            .field("position", &self.position)
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// Stripe Reconstructor
// =============================================================================

/// Coordinates the recovery of one erasure-coded stripe.
pub struct StripeReconstructor {
    id: Uuid,
    file_id: FileId,
    stripe: u64,
    policy: StripingPolicy,
    committed: Arc<CommittedExtents>,
    peers: PeerTable,
    local: Arc<dyn LocalReadExecutor>,
    remote: Arc<dyn PeerClient>,
    codec: Arc<dyn EcCodec>,
    pool: Arc<BufferPool>,
    callback: Arc<dyn ReconstructionCallback>,
    read_timeout: Option<Duration>,
    session: Mutex<Session>,
}

impl StripeReconstructor {
    /// Create a session with every chunk in `None`.
    pub fn new(
        target: StripeTarget,
        collaborators: &Collaborators,
        callback: Arc<dyn ReconstructionCallback>,
        config: &ReconstructionConfig,
    ) -> Result<Arc<Self>> {
        let policy = target.policy;
        let codec = &collaborators.codec;
        if codec.data_shards() != policy.data_width()
            || codec.parity_shards() != policy.parity_width()
        {
            return Err(Error::InvalidEcConfig(format!(
                "codec is {}+{} but stripe policy is {}+{}",
                codec.data_shards(),
                codec.parity_shards(),
                policy.data_width(),
                policy.parity_width()
            )));
        }
        config.validate()?;

        let chunks = ChunkTable::new(&policy, target.stripe);
        Ok(Arc::new(Self {
            id: Uuid::new_v4(),
            file_id: target.file_id,
            stripe: target.stripe,
            policy,
            committed: Arc::new(target.committed),
            peers: target.peers,
            local: Arc::clone(&collaborators.local),
            remote: Arc::clone(&collaborators.remote),
            codec: Arc::clone(&collaborators.codec),
            pool: Arc::clone(&collaborators.pool),
            callback,
            read_timeout: config.read_timeout(),
            session: Mutex::new(Session {
                state: SessionState::Pending,
                chunks,
                successes: 0,
                failures: 0,
                decoded: None,
            }),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    pub fn stripe(&self) -> u64 {
        self.stripe
    }

    pub fn policy(&self) -> &StripingPolicy {
        &self.policy
    }

    pub(crate) fn callback(&self) -> &dyn ReconstructionCallback {
        self.callback.as_ref()
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    fn request_for(&self, position: usize) -> Result<ChunkReadRequest> {
        Ok(ChunkReadRequest {
            file_id: self.file_id.clone(),
            policy: self.policy.at_position(position)?,
            object_number: self.policy.object_number(self.stripe, position),
            offset: 0,
            length: self.policy.chunk_size(),
            committed: Arc::clone(&self.committed),
        })
    }

    fn dispatch(&self, position: usize) -> Result<ReadFuture> {
        let request = self.request_for(position)?;
        if position == self.policy.local_position() {
            let local = Arc::clone(&self.local);
            return Ok(Box::pin(async move { local.read_local(request).await }));
        }

        match self.peers.get(position) {
            Some(peer) => self.remote.ec_read(peer, request),
            None => Err(Error::Dispatch {
                position,
                reason: "no storage node known for position".to_string(),
            }),
        }
    }

    /// Issue a read for every chunk still in `None`.
    ///
    /// The own position goes to the local executor, every other position to
    /// its peer. A read that cannot be dispatched counts as failed at once;
    /// if that aborts the session the remaining positions are not read.
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self), fields(session = %self.id, file_id = %self.file_id, stripe = self.stripe))]
    pub fn start(self: &Arc<Self>) -> Result<Arc<ResponseAggregator>> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Internal(format!("start requires a Tokio runtime: {}", e)))?;

        let positions = {
            let mut session = self.session.lock();
            if session.state != SessionState::Pending {
                debug!(state = ?session.state, "Session already decided, nothing to dispatch");
                Vec::new()
            } else {
                let positions = session.chunks.positions_in(ChunkState::None);
                for &position in &positions {
                    session.chunks.transition(position, ChunkState::Requested)?;
                }
                positions
            }
        };

        debug!(reads = positions.len(), "Dispatching chunk reads");
        let aggregator = ResponseAggregator::new(Arc::clone(self), positions.len());

        for (i, &position) in positions.iter().enumerate() {
            match self.dispatch(position) {
                Ok(read) => aggregator.track(&runtime, position, read, self.read_timeout),
                Err(err) => {
                    if aggregator.dispatch_failed(position, err).should_stop() {
                        aggregator.abandon(positions.len() - i - 1);
                        break;
                    }
                }
            }
        }

        Ok(aggregator)
    }

    // -------------------------------------------------------------------------
    // Result Handling
    // -------------------------------------------------------------------------

    /// Record a failed or stale chunk.
    ///
    /// Aborts the session once more than m chunks failed and reports it to
    /// the callback. Returns [`Outcome::Aborted`] whenever the session is
    /// aborted, including when it already was.
    pub fn mark_failed(&self, position: usize) -> Outcome {
        let mut session = self.session.lock();
        match session.state {
            SessionState::Aborted => return Outcome::Aborted,
            SessionState::Completed | SessionState::Decoding | SessionState::Decoded => {
                return Outcome::Ignored
            }
            SessionState::Pending => {}
        }

        if let Err(e) = session.chunks.transition(position, ChunkState::Failed) {
            debug!(position, error = %e, "Ignored failure report");
            return Outcome::Ignored;
        }
        session.failures += 1;
        debug!(
            position,
            failures = session.failures,
            successes = session.successes,
            "Chunk failed"
        );

        if session.failures <= self.policy.parity_width() {
            return Outcome::Pending;
        }

        session.state = SessionState::Aborted;
        let released = session.release();
        let failures = session.failures;
        drop(session);

        info!(
            stripe = self.stripe,
            failures,
            released,
            "Stripe cannot be reconstructed, too many failed chunks"
        );
        self.callback.failed(self.stripe);
        Outcome::Aborted
    }

    /// Attach a received chunk.
    ///
    /// Completes the session once k chunks arrived and reports it to the
    /// callback. If the session is no longer pending the buffer is released
    /// immediately.
    pub fn add_result(&self, position: usize, buffer: PooledBuffer) -> Outcome {
        let mut session = self.session.lock();
        if session.state != SessionState::Pending {
            debug!(position, state = ?session.state, "Ignored result");
            return Outcome::Ignored;
        }

        if let Err(e) = session.chunks.complete(position, buffer) {
            warn!(position, error = %e, "Rejected chunk result");
            return Outcome::Ignored;
        }
        session.successes += 1;
        debug!(
            position,
            successes = session.successes,
            failures = session.failures,
            "Chunk received"
        );

        if session.successes < self.policy.data_width() {
            return Outcome::Pending;
        }

        session.state = SessionState::Completed;
        drop(session);

        debug!(stripe = self.stripe, "Stripe is recoverable");
        self.callback.success(self.stripe);
        Outcome::Completed
    }

    /// Record that another operation already fetches `position`.
    ///
    /// A session that already decided ignores the request.
    pub fn mark_external_request(&self, position: usize) -> Result<()> {
        let mut session = self.session.lock();
        let width = session.chunks.width();
        if position >= width {
            return Err(Error::InvalidPosition { position, width });
        }
        if session.state != SessionState::Pending {
            debug!(position, state = ?session.state, "Ignoring external request on decided session");
            return Ok(());
        }
        session.chunks.transition(position, ChunkState::External)?;
        Ok(())
    }

    /// Abort the session and release every buffer. No callback fires.
    pub fn abort(&self) {
        let mut session = self.session.lock();
        let previous = session.state;
        session.state = SessionState::Aborted;
        let released = session.release();
        drop(session);

        if previous != SessionState::Aborted {
            info!(stripe = self.stripe, ?previous, released, "Reconstruction aborted");
        }
    }

    /// Release every buffer the session owns. Safe to call repeatedly.
    pub fn free_buffers(&self) -> usize {
        self.session.lock().release()
    }

    // -------------------------------------------------------------------------
    // Decode
    // -------------------------------------------------------------------------

    /// Regenerate the missing chunks of a completed stripe.
    ///
    /// Received chunks shorter than the chunk size are zero-padded first.
    /// Missing data chunks are always regenerated; missing parity chunks
    /// only when `recreate_parity` is set or no data chunk was missing.
    /// Returns `Ok(false)` without waiting if another caller already
    /// started the decode.
    #[instrument(skip(self), fields(session = %self.id, stripe = self.stripe))]
    pub fn decode(&self, recreate_parity: bool) -> Result<bool> {
        let taken = {
            let mut session = self.session.lock();
            match session.state {
                SessionState::Completed => {}
                SessionState::Decoding | SessionState::Decoded => return Ok(false),
                SessionState::Aborted => {
                    return Err(Error::SessionAborted {
                        stripe_id: self.stripe,
                    })
                }
                SessionState::Pending => {
                    return Err(Error::InsufficientShards {
                        available: session.successes,
                        required: self.policy.data_width(),
                    })
                }
            }
            session.state = SessionState::Decoding;
            session.chunks.take_for_decode()
        };

        let chunk_size = self.policy.chunk_size();
        let present: Vec<bool> = taken.iter().map(Option::is_some).collect();
        debug!(present = ?present, recreate_parity, "Decoding stripe");

        let mut buffers: Vec<PooledBuffer> = taken
            .into_iter()
            .map(|slot| match slot {
                Some(mut buffer) => {
                    buffer.truncate(chunk_size);
                    buffer.zero_pad(chunk_size)
                }
                None => self.pool.allocate(chunk_size),
            })
            .collect();

        let mut shards: Vec<Vec<u8>> = buffers
            .iter_mut()
            .map(|b| std::mem::take(b.vec_mut()))
            .collect();
        let result =
            self.codec
                .decode_missing(&mut shards, &present, 0, chunk_size, recreate_parity);
        for (buffer, shard) in buffers.iter_mut().zip(shards) {
            *buffer.vec_mut() = shard;
        }

        let mut session = self.session.lock();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                session.state = SessionState::Aborted;
                drop(session);
                warn!(stripe = self.stripe, error = %e, "Decode failed");
                return Err(match e {
                    Error::EcReconstructionFailed { reason, .. } => {
                        Error::EcReconstructionFailed {
                            stripe_id: self.stripe,
                            reason,
                        }
                    }
                    other => other,
                });
            }
        };

        if session.state == SessionState::Aborted {
            debug!("Session aborted during decode, discarding output");
            return Err(Error::SessionAborted {
                stripe_id: self.stripe,
            });
        }

        // The decoder regenerates either every absent parity chunk or none
        let k = self.policy.data_width();
        let filled = present
            .iter()
            .enumerate()
            .map(|(i, &p)| p || i < k || outcome.parity_regenerated > 0)
            .collect();
        session.decoded = Some(Arc::new(DecodedStripe { buffers, filled }));
        session.state = SessionState::Decoded;
        debug!(
            data = outcome.data_regenerated,
            parity = outcome.parity_regenerated,
            "Stripe decoded"
        );
        Ok(true)
    }

    /// Read-only view of a chunk after decode.
    ///
    /// A parity chunk lost together with data is left zero-filled by
    /// `decode(false)` and reported as [`Error::ParityNotRegenerated`].
    pub fn get_object(&self, position: usize) -> Result<ChunkView> {
        let session = self.session.lock();
        let width = session.chunks.width();
        if position >= width {
            return Err(Error::InvalidPosition { position, width });
        }

        match session.state {
            SessionState::Decoded => {}
            SessionState::Aborted => {
                return Err(Error::SessionAborted {
                    stripe_id: self.stripe,
                })
            }
            _ => return Err(Error::NotDecoded { position }),
        }

        let stripe = session
            .decoded
            .as_ref()
            .map(Arc::clone)
            .ok_or(Error::BufferReleased { position })?;
        if !stripe.filled[position] {
            return Err(Error::ParityNotRegenerated { position });
        }
        Ok(ChunkView { stripe, position })
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    /// Whether the outcome is decided (recoverable or aborted)
    pub fn has_finished(&self) -> bool {
        self.state() != SessionState::Pending
    }

    /// Whether at least k chunks arrived
    pub fn is_complete(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Completed | SessionState::Decoding | SessionState::Decoded
        )
    }

    pub fn is_decoded(&self) -> bool {
        self.state() == SessionState::Decoded
    }

    pub fn has_failed(&self) -> bool {
        self.state() == SessionState::Aborted
    }

    pub fn successes(&self) -> usize {
        self.session.lock().successes
    }

    pub fn failures(&self) -> usize {
        self.session.lock().failures
    }

    pub fn chunk_state(&self, position: usize) -> Result<ChunkState> {
        self.session.lock().chunks.state(position)
    }

    /// Number of chunks currently holding a received payload
    pub fn buffered(&self) -> usize {
        self.session.lock().chunks.buffered()
    }
}

impl fmt::Display for StripeReconstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session.lock();
        write!(
            f,
            "StripeReconstructor [file={}, stripe={}, state={:?}, successes={}, failures={}, chunks=[",
            self.file_id, self.stripe, session.state, session.successes, session.failures
        )?;
        for (i, chunk) in session.chunks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", chunk.state())?;
        }
        write!(f, "]]")
    }
}

impl fmt::Debug for StripeReconstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeReconstructor")
            .field("id", &self.id)
            .field("file_id", &self.file_id)
            .field("stripe", &self.stripe)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
