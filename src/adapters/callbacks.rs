//! Reconstruction Callback Adapters
//!
//! Implementations of the `ReconstructionCallback` port: structured logging,
//! a Tokio channel for callers that await the outcome, an in-memory
//! collector for tests, and a composite fanning out to several of them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::events::ReconstructionEvent;
use crate::domain::ports::ReconstructionCallback;

/// Logging-based callback.
///
/// Writes every reconstruction event to the tracing system.
#[derive(Debug, Clone, Default)]
pub struct LoggingCallback {
    /// Whether to log events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a callback that logs at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create a callback that logs at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }

    fn log(&self, event: ReconstructionEvent) {
        let event_type = event.event_type();
        let json = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));

        if self.info_level {
            info!(event_type = %event_type, event = %json, "Reconstruction event");
        } else {
            debug!(event_type = %event_type, event = %json, "Reconstruction event");
        }
    }
}

impl ReconstructionCallback for LoggingCallback {
    fn success(&self, stripe: u64) {
        self.log(ReconstructionEvent::recoverable(stripe));
    }

    fn failed(&self, stripe: u64) {
        self.log(ReconstructionEvent::failed(stripe));
    }

    fn mark_for_reconstruction(&self, position: usize) {
        self.log(ReconstructionEvent::needs_repair(position));
    }
}

/// Forwards events into an unbounded Tokio channel.
///
/// Callbacks run on transport threads and must not block, hence unbounded.
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<ReconstructionEvent>,
}

impl ChannelCallback {
    /// Create a callback and the receiver its events arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ReconstructionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ReconstructionEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(event_type = e.0.event_type(), "Receiver gone, event dropped");
        }
    }
}

impl ReconstructionCallback for ChannelCallback {
    fn success(&self, stripe: u64) {
        self.send(ReconstructionEvent::recoverable(stripe));
    }

    fn failed(&self, stripe: u64) {
        self.send(ReconstructionEvent::failed(stripe));
    }

    fn mark_for_reconstruction(&self, position: usize) {
        self.send(ReconstructionEvent::needs_repair(position));
    }
}

/// In-memory event collector for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<ReconstructionEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<ReconstructionEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<ReconstructionEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Stripes reported recoverable, in order
    pub fn successes(&self) -> Vec<u64> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                ReconstructionEvent::StripeRecoverable { stripe, .. } => Some(*stripe),
                _ => None,
            })
            .collect()
    }

    /// Stripes reported unrecoverable, in order
    pub fn failures(&self) -> Vec<u64> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                ReconstructionEvent::StripeFailed { stripe, .. } => Some(*stripe),
                _ => None,
            })
            .collect()
    }

    /// Positions reported stale, in order
    pub fn repairs(&self) -> Vec<usize> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                ReconstructionEvent::ChunkNeedsRepair { position, .. } => Some(*position),
                _ => None,
            })
            .collect()
    }
}

impl ReconstructionCallback for InMemoryEventCollector {
    fn success(&self, stripe: u64) {
        self.events.write().push(ReconstructionEvent::recoverable(stripe));
    }

    fn failed(&self, stripe: u64) {
        self.events.write().push(ReconstructionEvent::failed(stripe));
    }

    fn mark_for_reconstruction(&self, position: usize) {
        self.events
            .write()
            .push(ReconstructionEvent::needs_repair(position));
    }
}

/// Composite callback that notifies several callbacks in order.
#[derive(Default)]
pub struct CompositeCallback {
    callbacks: Vec<Arc<dyn ReconstructionCallback>>,
}

impl CompositeCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback to the composite.
    pub fn with_callback(mut self, callback: Arc<dyn ReconstructionCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }
}

impl std::fmt::Debug for CompositeCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeCallback")
            .field("callback_count", &self.callbacks.len())
            .finish()
    }
}

impl ReconstructionCallback for CompositeCallback {
    fn success(&self, stripe: u64) {
        self.callbacks.iter().for_each(|c| c.success(stripe));
    }

    fn failed(&self, stripe: u64) {
        self.callbacks.iter().for_each(|c| c.failed(stripe));
    }

    fn mark_for_reconstruction(&self, position: usize) {
        self.callbacks
            .iter()
            .for_each(|c| c.mark_for_reconstruction(position));
    }
}
