//! Chunk Buffer Pool
//!
//! Size-classed pool of byte buffers shared by every reconstruction session
//! in the process. Buffers are handed out as [`PooledBuffer`], which returns
//! its storage to the pool when dropped, so every buffer is released exactly
//! once no matter which path (abort, straggler, decode, caller) drops it.
//!
//! # Size Classes
//!
//! Requests are rounded up to the next power of two, starting at
//! `min_class_size`. Requests larger than `max_class_size` are served by a
//! plain allocation that is freed instead of pooled.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};

static GLOBAL_POOL: Lazy<Arc<BufferPool>> =
    Lazy::new(|| BufferPool::new(BufferPoolConfig::default()));

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a [`BufferPool`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Smallest size class in bytes (power of two)
    pub min_class_size: usize,

    /// Largest pooled size class in bytes (power of two)
    pub max_class_size: usize,

    /// Maximum idle buffers kept per size class
    pub max_pooled_per_class: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            min_class_size: 8 * 1024,
            max_class_size: 4 * 1024 * 1024,
            max_pooled_per_class: 64,
        }
    }
}

impl BufferPoolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.min_class_size.is_power_of_two() || !self.max_class_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "pool size classes must be powers of two (min {}, max {})",
                self.min_class_size, self.max_class_size
            )));
        }
        if self.min_class_size > self.max_class_size {
            return Err(Error::Config(format!(
                "min_class_size {} exceeds max_class_size {}",
                self.min_class_size, self.max_class_size
            )));
        }
        if self.max_pooled_per_class == 0 {
            return Err(Error::Config(
                "max_pooled_per_class must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Pool Statistics
// =============================================================================

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Buffers handed out (fresh or reused)
    pub allocated: u64,
    /// Buffers returned
    pub released: u64,
    /// Allocations served from an idle buffer
    pub hits: u64,
    /// Allocations that needed fresh memory
    pub misses: u64,
}

impl PoolStats {
    /// Buffers currently owned by someone other than the pool
    pub fn outstanding(&self) -> u64 {
        self.allocated.saturating_sub(self.released)
    }
}

// =============================================================================
// Buffer Pool
// =============================================================================

/// Process-wide pool of reusable byte buffers.
pub struct BufferPool {
    config: BufferPoolConfig,
    /// Idle buffers keyed by size class
    classes: DashMap<usize, ArrayQueue<Vec<u8>>>,
    allocated: AtomicU64,
    released: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl BufferPool {
    /// Create a new pool
    pub fn new(config: BufferPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            classes: DashMap::new(),
            allocated: AtomicU64::new(0),
            released: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// The shared pool used when no dedicated pool is configured
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_POOL)
    }

    /// Size class serving a request of `size` bytes, or `None` if unpooled
    fn class_for(&self, size: usize) -> Option<usize> {
        let class = size.max(self.config.min_class_size).next_power_of_two();
        (class <= self.config.max_class_size).then_some(class)
    }

    /// Allocate a zero-filled buffer of exactly `size` bytes.
    pub fn allocate(self: &Arc<Self>, size: usize) -> PooledBuffer {
        self.allocated.fetch_add(1, Ordering::Relaxed);

        let class = self.class_for(size);
        let recycled = class.and_then(|c| self.classes.get(&c).and_then(|q| q.pop()));

        let data = match recycled {
            Some(mut data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                data.clear();
                data.resize(size, 0);
                data
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let mut data = Vec::with_capacity(class.unwrap_or(size));
                data.resize(size, 0);
                data
            }
        };

        PooledBuffer {
            data,
            pool: Some(Arc::clone(self)),
        }
    }

    /// Take ownership of bytes produced elsewhere (e.g. a transport payload).
    ///
    /// The buffer is accounted like any allocation and its storage joins the
    /// pool on release if it fits a size class.
    pub fn adopt(self: &Arc<Self>, data: Vec<u8>) -> PooledBuffer {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        PooledBuffer {
            data,
            pool: Some(Arc::clone(self)),
        }
    }

    fn release(&self, data: Vec<u8>) {
        self.released.fetch_add(1, Ordering::Relaxed);

        let capacity = data.capacity();
        if !capacity.is_power_of_two() || self.class_for(capacity) != Some(capacity) {
            trace!(capacity, "Dropping unpooled buffer");
            return;
        }

        let queue = self
            .classes
            .entry(capacity)
            .or_insert_with(|| ArrayQueue::new(self.config.max_pooled_per_class));
        // Full class: the buffer is simply freed
        let _ = queue.push(data);
    }

    /// Number of idle buffers across all classes
    pub fn idle(&self) -> usize {
        self.classes.iter().map(|q| q.len()).sum()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }
}

// =============================================================================
// Pooled Buffer
// =============================================================================

/// Exclusively owned buffer that returns to its pool on drop.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Option<Arc<BufferPool>>,
}

impl PooledBuffer {
    /// Buffer not tied to any pool
    pub fn unpooled(data: Vec<u8>) -> Self {
        Self { data, pool: None }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Extend the buffer with zeros up to `size` bytes.
    ///
    /// Buffers already at least `size` long are returned unchanged. When the
    /// current storage is too small a larger buffer is taken from the same
    /// pool and this one is released.
    pub fn zero_pad(mut self, size: usize) -> PooledBuffer {
        if self.data.len() >= size {
            return self;
        }
        if self.data.capacity() >= size {
            self.data.resize(size, 0);
            return self;
        }

        let mut padded = match &self.pool {
            Some(pool) => pool.allocate(size),
            None => PooledBuffer::unpooled(vec![0u8; size]),
        };
        padded.data[..self.data.len()].copy_from_slice(&self.data);
        padded
    }

    /// Shorten the buffer to `len` bytes; longer requests are ignored.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Detach the bytes from the pool; counts as a release.
    pub fn into_vec(mut self) -> Vec<u8> {
        let data = std::mem::take(&mut self.data);
        if let Some(pool) = self.pool.take() {
            pool.released.fetch_add(1, Ordering::Relaxed);
        }
        data
    }

    /// Backing storage, for codecs that work on `Vec<u8>` shards.
    pub(crate) fn vec_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .field("capacity", &self.data.capacity())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
