//! Response Aggregation
//!
//! Routes the outcome of every dispatched chunk read back into its
//! reconstruction session. Reads complete on arbitrary runtime threads and
//! in any order; all ordering guarantees come from the session lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::reconstruction::{Outcome, SessionState, StripeReconstructor};
use crate::domain::ports::{ChunkReadResponse, ReadFuture};
use crate::error::{Error, Result};

/// Collects read results for one session.
pub struct ResponseAggregator {
    session: Arc<StripeReconstructor>,
    expected: AtomicUsize,
    responses: AtomicUsize,
    errors: AtomicUsize,
    quick_fails: AtomicUsize,
    remaining_tx: watch::Sender<usize>,
    remaining_rx: watch::Receiver<usize>,
}

impl ResponseAggregator {
    pub(crate) fn new(session: Arc<StripeReconstructor>, expected: usize) -> Arc<Self> {
        let (remaining_tx, remaining_rx) = watch::channel(expected);
        Arc::new(Self {
            session,
            expected: AtomicUsize::new(expected),
            responses: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            quick_fails: AtomicUsize::new(0),
            remaining_tx,
            remaining_rx,
        })
    }

    /// Await `read` on the runtime and feed its result to the session.
    pub(crate) fn track(
        self: &Arc<Self>,
        runtime: &Handle,
        position: usize,
        read: ReadFuture,
        timeout: Option<Duration>,
    ) {
        let aggregator = Arc::clone(self);
        runtime.spawn(async move {
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .unwrap_or(Err(Error::ReadTimeout {
                        position,
                        timeout: limit,
                    })),
                None => read.await,
            };
            aggregator.handle(position, result);
        });
    }

    /// Feed a read that could not be dispatched at all.
    pub(crate) fn dispatch_failed(&self, position: usize, error: Error) -> Outcome {
        self.quick_fails.fetch_add(1, Ordering::Relaxed);
        self.handle(position, Err(error))
    }

    /// Reads that will never be dispatched because the session aborted.
    pub(crate) fn abandon(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.expected.fetch_sub(count, Ordering::Relaxed);
        self.remaining_tx
            .send_modify(|remaining| *remaining = remaining.saturating_sub(count));
    }

    /// Route one read result into the session.
    ///
    /// A stale chunk is reported for repair and then counted as failed.
    /// Repair notices stop once the session is decoding or aborted.
    /// Payloads arriving after the session was decided are released.
    pub fn handle(&self, position: usize, result: Result<ChunkReadResponse>) -> Outcome {
        let outcome = match result {
            Ok(response) if response.needs_reconstruction => {
                debug!(position, "Chunk is stale and needs repair");
                drop(response);
                if matches!(
                    self.session.state(),
                    SessionState::Pending | SessionState::Completed
                ) {
                    self.session.callback().mark_for_reconstruction(position);
                }
                self.session.mark_failed(position)
            }
            Ok(response) => self.session.add_result(position, response.data),
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    file_id = %self.session.file_id(),
                    stripe = self.session.stripe(),
                    position,
                    error = %e,
                    "Chunk read failed"
                );
                self.session.mark_failed(position)
            }
        };

        self.responses.fetch_add(1, Ordering::Relaxed);
        self.remaining_tx
            .send_modify(|remaining| *remaining = remaining.saturating_sub(1));
        outcome
    }

    pub fn session(&self) -> &Arc<StripeReconstructor> {
        &self.session
    }

    /// Reads this aggregator waits for
    pub fn expected(&self) -> usize {
        self.expected.load(Ordering::Relaxed)
    }

    /// Results handled so far, including dispatch failures
    pub fn responses(&self) -> usize {
        self.responses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Reads that failed before reaching the transport
    pub fn quick_fails(&self) -> usize {
        self.quick_fails.load(Ordering::Relaxed)
    }

    pub fn outstanding(&self) -> usize {
        *self.remaining_rx.borrow()
    }

    /// Resolve once every dispatched read reported back.
    ///
    /// Reads that never answer keep this pending; configure a read timeout
    /// when callers depend on it.
    pub async fn wait_drained(&self) {
        let mut remaining = self.remaining_rx.clone();
        // The sender lives as long as `self`, so this cannot fail
        let _ = remaining.wait_for(|r| *r == 0).await;
    }
}

impl std::fmt::Debug for ResponseAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseAggregator")
            .field("stripe", &self.session.stripe())
            .field("expected", &self.expected())
            .field("responses", &self.responses())
            .field("errors", &self.errors())
            .field("quick_fails", &self.quick_fails())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
