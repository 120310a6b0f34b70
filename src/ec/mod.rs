//! Erasure Coding Module
//!
//! Reconstruction of a single k+m stripe whose chunks live on n = k+m
//! storage nodes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Erasure Coding Module                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  ┌──────────────┐    ┌──────────────┐    ┌───────────────────────────┐  │
//! │  │   Striping   │    │  Chunk Table │    │   Buffer Pool             │  │
//! │  │   Policy     │    │              │    │   (PooledBuffer)          │  │
//! │  └──────────────┘    └──────────────┘    └───────────────────────────┘  │
//! │         │                   │                         │                  │
//! │         └───────────────────┼─────────────────────────┘                  │
//! │                             │                                            │
//! │                   ┌─────────┴─────────┐      ┌────────────────────┐     │
//! │                   │  Reconstructor    │◄─────│ ResponseAggregator │     │
//! │                   └─────────┬─────────┘      └────────────────────┘     │
//! │                             │                                            │
//! │                   ┌─────────┴─────────┐                                  │
//! │                   │  Encoder/Decoder  │                                  │
//! │                   └───────────────────┘                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **Striping Policy** (`policy.rs`): k, m, chunk size and this node's
//!   position; object numbering and byte-range translation; committed
//!   extents.
//!
//! - **Chunk Table** (`chunk.rs`): per-position chunk state with the
//!   declared transition table.
//!
//! - **Buffer Pool** (`buffer.rs`): size-classed pool whose buffers return
//!   on drop.
//!
//! - **Reconstructor** (`reconstruction.rs`): dispatches reads, tracks the
//!   success/failure thresholds, decodes, serves decoded chunks.
//!
//! - **Response Aggregator** (`aggregator.rs`): feeds read outcomes back
//!   into the session.
//!
//! - **Encoder/Decoder** (`encoder.rs`): Reed-Solomon over GF(2^8) using the
//!   `reed-solomon-erasure` crate.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stripe_rebuild::ec::{Collaborators, ReconstructionConfig, StripeReconstructor, StripeTarget};
//!
//! let session = StripeReconstructor::new(target, &collaborators, callback, &config)?;
//! let reads = session.start()?;
//!
//! // later, from the success callback
//! session.decode(false)?;
//! let chunk = session.get_object(2)?;
//! ```

pub mod aggregator;
pub mod buffer;
pub mod chunk;
pub mod encoder;
pub mod policy;
pub mod reconstruction;

#[cfg(test)]
mod proptest;

pub use aggregator::ResponseAggregator;
pub use buffer::{BufferPool, BufferPoolConfig, PoolStats, PooledBuffer};
pub use chunk::{Chunk, ChunkState, ChunkTable};
pub use encoder::{DecodeOutcome, EcDecoder, EcEncoder};
pub use policy::{CommittedExtents, Extent, ObjectRead, StripingPolicy};
pub use reconstruction::{
    ChunkView, Collaborators, Outcome, ReconstructionConfig, SessionState, StripeReconstructor,
    StripeTarget,
};
