//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │        EcCodec │ ReconstructionCallback                    │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ ReedSolomonCodecAdapter │ LoggingCallback │ ChannelCallback │ │
//! │  │ InMemoryEventCollector  │ CompositeCallback                │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport adapters (`LocalReadExecutor`, `PeerClient`) belong to the
//! embedding storage node and are not provided here.

pub mod callbacks;
pub mod reed_solomon;

pub use callbacks::{ChannelCallback, CompositeCallback, InMemoryEventCollector, LoggingCallback};
pub use reed_solomon::ReedSolomonCodecAdapter;
