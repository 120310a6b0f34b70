//! Stripe Rebuild - Erasure-Coded Stripe Reconstruction
//!
//! Recovers a stripe of a k+m Reed-Solomon coded file when some of its
//! chunks are unreadable. A session reads every chunk of the stripe from
//! the storage nodes holding it, declares the stripe recoverable as soon as
//! any k chunks arrived (or unrecoverable once more than m failed) and
//! regenerates the missing chunks on demand.
//!
//! # Architecture
//!
//! ```text
//! StripeReconstructor ──► LocalReadExecutor / PeerClient   (dispatch)
//!         ▲                          │
//!         └──── ResponseAggregator ◄─┘                     (results)
//!         │
//!         └──► EcCodec (decode) ──► ChunkView              (serve)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Codec and callback implementations of the domain ports
//! - [`domain`] - Ports and events (DDD)
//! - [`ec`] - Striping policy, chunk table, buffers, coordinator and decoder
//! - [`error`] - Error types
//! - [`telemetry`] - Tracing subscriber setup

pub mod adapters;
pub mod domain;
pub mod ec;
pub mod error;
pub mod telemetry;

// Re-export commonly used types
pub use domain::{FileId, PeerAddress, PeerTable, ReconstructionCallback};
pub use ec::{
    BufferPool, ChunkState, ChunkView, Collaborators, ReconstructionConfig, ResponseAggregator,
    SessionState, StripeReconstructor, StripeTarget, StripingPolicy,
};
pub use error::{Error, Result};
