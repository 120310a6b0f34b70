//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! Abstractions the reconstruction core depends on. Storage, transport and
//! coding are collaborators reached through these traits; adapters and test
//! doubles implement them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Reconstruction Core                         │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  LocalReadExecutor │ PeerClient │ EcCodec           │    │
//! │  │  ReconstructionCallback                              │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  OSD storage layout │ RPC client │ ReedSolomonCodecAdapter   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::ec::buffer::PooledBuffer;
use crate::ec::encoder::DecodeOutcome;
use crate::ec::policy::{CommittedExtents, StripingPolicy};
use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// File identifier (value object).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Network address of a storage node (value object).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress(pub String);

impl PeerAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stripe position → storage node address for one replica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTable(Vec<Option<PeerAddress>>);

impl PeerTable {
    /// Table with an address for every position in order.
    pub fn new(addresses: Vec<PeerAddress>) -> Self {
        Self(addresses.into_iter().map(Some).collect())
    }

    /// Table with gaps (positions whose node is unknown).
    pub fn with_gaps(addresses: Vec<Option<PeerAddress>>) -> Self {
        Self(addresses)
    }

    pub fn get(&self, position: usize) -> Option<&PeerAddress> {
        self.0.get(position).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read of one chunk object, sent to the local executor or a peer.
#[derive(Debug, Clone)]
pub struct ChunkReadRequest {
    pub file_id: FileId,
    /// Policy as seen from the node serving the read
    pub policy: StripingPolicy,
    pub object_number: u64,
    pub offset: usize,
    pub length: usize,
    pub committed: Arc<CommittedExtents>,
}

/// Successful answer to a chunk read.
#[derive(Debug)]
pub struct ChunkReadResponse {
    /// Object payload; may be shorter than the requested length
    pub data: PooledBuffer,
    /// The serving node holds a stale copy that must be repaired
    pub needs_reconstruction: bool,
}

impl ChunkReadResponse {
    pub fn ok(data: PooledBuffer) -> Self {
        Self {
            data,
            needs_reconstruction: false,
        }
    }

    pub fn stale(data: PooledBuffer) -> Self {
        Self {
            data,
            needs_reconstruction: true,
        }
    }
}

/// Asynchronous chunk read in flight.
pub type ReadFuture = BoxFuture<'static, Result<ChunkReadResponse>>;

// =============================================================================
// Read Ports
// =============================================================================

/// Port for reading a chunk object stored on this node.
#[async_trait]
pub trait LocalReadExecutor: Send + Sync {
    /// Read the requested object range from local storage.
    async fn read_local(&self, request: ChunkReadRequest) -> Result<ChunkReadResponse>;
}

/// Port for reading a chunk object from a remote storage node.
pub trait PeerClient: Send + Sync {
    /// Start a remote read.
    ///
    /// An `Err` here means the read could not even be dispatched; an error
    /// resolved by the returned future is a failure reported by the peer or
    /// the transport after dispatch.
    fn ec_read(&self, peer: &PeerAddress, request: ChunkReadRequest) -> Result<ReadFuture>;
}

// =============================================================================
// Callback Port
// =============================================================================

/// Terminal notifications of a reconstruction session.
///
/// `success` and `failed` fire at most once per session and never both.
/// Callbacks are invoked after the session lock is released, so they may
/// call back into the session (for example to decode).
pub trait ReconstructionCallback: Send + Sync {
    /// Enough chunks arrived to decode the stripe.
    fn success(&self, stripe: u64);

    /// Too many chunks failed; the stripe cannot be reconstructed.
    fn failed(&self, stripe: u64);

    /// The node at `position` answered with a stale copy.
    fn mark_for_reconstruction(&self, position: usize);
}

// =============================================================================
// Erasure Coding Port
// =============================================================================

/// Port for systematic MDS erasure decoding.
pub trait EcCodec: Send + Sync {
    /// Get the number of data shards (k).
    fn data_shards(&self) -> usize;

    /// Get the number of parity shards (m).
    fn parity_shards(&self) -> usize;

    /// Regenerate absent shards in place over `[offset, offset + length)`.
    fn decode_missing(
        &self,
        shards: &mut [Vec<u8>],
        present: &[bool],
        offset: usize,
        length: usize,
        recreate_parity: bool,
    ) -> Result<DecodeOutcome>;
}

// =============================================================================
// Tests
// =============================================================================
