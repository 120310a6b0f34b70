//! Domain Layer
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for storage, transport,
//!   coding and session callbacks
//! - **Events** (`events.rs`) - Reconstruction outcome events
//!
//! # Usage
//!
//! ```ignore
//! use stripe_rebuild::domain::ports::{PeerClient, ReconstructionCallback};
//!
//! struct Scheduler;
//!
//! impl ReconstructionCallback for Scheduler {
//!     fn success(&self, stripe: u64) { /* decode and serve */ }
//!     fn failed(&self, stripe: u64) { /* report read error */ }
//!     fn mark_for_reconstruction(&self, position: usize) { /* queue repair */ }
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::ReconstructionEvent;
pub use ports::{
    // Port traits
    EcCodec,
    LocalReadExecutor,
    PeerClient,
    ReconstructionCallback,
    // Value objects
    ChunkReadRequest,
    ChunkReadResponse,
    FileId,
    PeerAddress,
    PeerTable,
    ReadFuture,
};
