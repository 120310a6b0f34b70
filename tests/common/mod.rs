//! In-memory storage nodes for session tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};

use stripe_rebuild::adapters::{ChannelCallback, CompositeCallback, InMemoryEventCollector, ReedSolomonCodecAdapter};
use stripe_rebuild::domain::events::ReconstructionEvent;
use stripe_rebuild::domain::ports::{
    ChunkReadRequest, ChunkReadResponse, LocalReadExecutor, PeerAddress, PeerClient, PeerTable,
    ReadFuture,
};
use stripe_rebuild::ec::encoder::EcEncoder;
use stripe_rebuild::ec::policy::CommittedExtents;
use stripe_rebuild::{
    BufferPool, Collaborators, Error, FileId, ReconstructionConfig, Result, StripeReconstructor,
    StripeTarget, StripingPolicy,
};

pub const STRIPE: u64 = 7;
pub const CHUNK_KIB: usize = 1;
pub const CHUNK_SIZE: usize = CHUNK_KIB * 1024;

/// How the node at one position answers.
#[derive(Clone)]
pub enum Behavior {
    /// Answer with these bytes
    Respond(Vec<u8>),
    /// Answer with these bytes, flagged as a stale copy
    Stale(Vec<u8>),
    /// Answer with an error
    Fail,
    /// Never answer
    Never,
    /// Refuse the read at dispatch time
    Unreachable,
    /// Answer once a permit is available on the gate
    Gated(Vec<u8>, Arc<Semaphore>),
}

/// Every storage node of one stripe, keyed by position.
pub struct FakeCluster {
    behaviors: Vec<Behavior>,
    pool: Arc<BufferPool>,
    requests: Mutex<Vec<ChunkReadRequest>>,
}

impl FakeCluster {
    pub fn new(behaviors: Vec<Behavior>, pool: Arc<BufferPool>) -> Arc<Self> {
        Arc::new(Self {
            behaviors,
            pool,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Positions that received a read, in dispatch order
    pub fn requested_positions(&self) -> Vec<usize> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.policy.local_position())
            .collect()
    }

    pub fn requests(&self) -> Vec<ChunkReadRequest> {
        self.requests.lock().clone()
    }

    fn serve(&self, request: ChunkReadRequest) -> Result<ReadFuture> {
        // The request carries the policy as seen from the serving node
        let position = request.policy.local_position();
        self.requests.lock().push(request);

        let pool = Arc::clone(&self.pool);
        match self.behaviors[position].clone() {
            Behavior::Unreachable => Err(Error::Dispatch {
                position,
                reason: "connection refused".to_string(),
            }),
            Behavior::Respond(data) => Ok(Box::pin(async move {
                tokio::task::yield_now().await;
                Ok(ChunkReadResponse::ok(pool.adopt(data)))
            })),
            Behavior::Stale(data) => Ok(Box::pin(async move {
                Ok(ChunkReadResponse::stale(pool.adopt(data)))
            })),
            Behavior::Fail => Ok(Box::pin(async move {
                Err(Error::RemoteFailure {
                    position,
                    reason: "object unreadable".to_string(),
                })
            })),
            Behavior::Never => Ok(Box::pin(futures::future::pending())),
            Behavior::Gated(data, gate) => Ok(Box::pin(async move {
                let permit = gate.acquire().await.map_err(|e| Error::Internal(e.to_string()))?;
                permit.forget();
                Ok(ChunkReadResponse::ok(pool.adopt(data)))
            })),
        }
    }
}

#[async_trait]
impl LocalReadExecutor for FakeCluster {
    async fn read_local(&self, request: ChunkReadRequest) -> Result<ChunkReadResponse> {
        self.serve(request)?.await
    }
}

impl PeerClient for FakeCluster {
    fn ec_read(&self, _peer: &PeerAddress, request: ChunkReadRequest) -> Result<ReadFuture> {
        self.serve(request)
    }
}

/// k data chunks with distinct content, followed by their parity.
///
/// Data chunk `i` carries `CHUNK_SIZE - 100 * i` meaningful bytes and is
/// zero beyond that, so nodes may store it truncated.
pub fn encoded_stripe(k: usize, m: usize) -> Vec<Vec<u8>> {
    let data = (0..k)
        .map(|i| {
            let used = CHUNK_SIZE - 100 * i;
            let mut chunk: Vec<u8> = (0..used).map(|j| ((i * 37 + j * 11) % 251 + 1) as u8).collect();
            chunk.resize(CHUNK_SIZE, 0);
            chunk
        })
        .collect();
    EcEncoder::new(k, m)
        .expect("codec")
        .encode_stripe(data)
        .expect("encode")
}

/// Chunk `position` as a node stores it, without trailing zeros.
pub fn stored(stripe: &[Vec<u8>], k: usize, position: usize) -> Vec<u8> {
    if position < k {
        stripe[position][..CHUNK_SIZE - 100 * position].to_vec()
    } else {
        stripe[position].clone()
    }
}

pub struct Fixture {
    pub session: Arc<StripeReconstructor>,
    pub cluster: Arc<FakeCluster>,
    pub events: Arc<InMemoryEventCollector>,
    pub rx: mpsc::UnboundedReceiver<ReconstructionEvent>,
    pub pool: Arc<BufferPool>,
    pub stripe: Vec<Vec<u8>>,
}

pub struct FixtureBuilder {
    k: usize,
    m: usize,
    local_position: usize,
    peers: Option<PeerTable>,
    config: ReconstructionConfig,
}

impl FixtureBuilder {
    pub fn new(k: usize, m: usize) -> Self {
        Self {
            k,
            m,
            local_position: 0,
            peers: None,
            config: ReconstructionConfig::default(),
        }
    }

    pub fn local_position(mut self, position: usize) -> Self {
        self.local_position = position;
        self
    }

    pub fn peers(mut self, peers: PeerTable) -> Self {
        self.peers = Some(peers);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Build with one behavior per position, chosen from the encoded stripe.
    pub fn build(self, behavior: impl Fn(usize, &[Vec<u8>]) -> Behavior) -> Fixture {
        let (k, m) = (self.k, self.m);
        let stripe = encoded_stripe(k, m);
        let pool = BufferPool::new(self.config.pool.clone());
        let behaviors = (0..k + m).map(|p| behavior(p, &stripe)).collect();
        let cluster = FakeCluster::new(behaviors, Arc::clone(&pool));

        let collaborators = Collaborators::new(
            cluster.clone(),
            cluster.clone(),
            Arc::new(ReedSolomonCodecAdapter::new(k, m).expect("codec")),
        )
        .with_pool(Arc::clone(&pool));

        let peers = self.peers.unwrap_or_else(|| {
            PeerTable::new(
                (0..k + m)
                    .map(|p| PeerAddress::new(format!("osd-{}:32640", p)))
                    .collect(),
            )
        });
        let target = StripeTarget {
            file_id: FileId::from("volume-1:file-9"),
            stripe: STRIPE,
            policy: StripingPolicy::new(k, m, CHUNK_KIB, self.local_position).expect("policy"),
            committed: CommittedExtents::empty(),
            peers,
        };

        let events = Arc::new(InMemoryEventCollector::new());
        let (channel, rx) = ChannelCallback::channel();
        let callback = CompositeCallback::new()
            .with_callback(events.clone())
            .with_callback(Arc::new(channel));

        let session = StripeReconstructor::new(target, &collaborators, Arc::new(callback), &self.config)
            .expect("session");

        Fixture {
            session,
            cluster,
            events,
            rx,
            pool,
            stripe,
        }
    }
}

impl Fixture {
    /// Next terminal event (success or failure), skipping repair notices.
    pub async fn terminal_event(&mut self) -> ReconstructionEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .expect("no terminal event within 5s")
                .expect("callback channel closed");
            if event.is_terminal() {
                return event;
            }
        }
    }
}
