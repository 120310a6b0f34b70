//! Chunk Table
//!
//! Fixed arena of the n chunk slots of one stripe, addressed by position.
//! The table is owned by a reconstruction session and only mutated under
//! that session's lock. State changes go through [`ChunkTable::transition`],
//! which enforces the declared transition table:
//!
//! ```text
//! None ──► Requested ──► Complete | Failed
//!   │                         ▲
//!   └────► External ──────────┘
//!
//! None | Requested | Failed | External ──► Reconstructed   (decode only)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::buffer::PooledBuffer;
use super::policy::StripingPolicy;
use crate::error::{Error, Result};

/// State of a single chunk within a reconstruction session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkState {
    /// Not requested yet
    None,
    /// Read dispatched, awaiting response
    Requested,
    /// Payload received and attached
    Complete,
    /// Read failed or chunk flagged stale
    Failed,
    /// Fetch owned by another in-flight operation
    External,
    /// Regenerated by the decoder
    Reconstructed,
}

impl ChunkState {
    /// Whether a transition to `to` is allowed outside of decode.
    pub fn can_transition(self, to: ChunkState) -> bool {
        use ChunkState::*;
        matches!(
            (self, to),
            (None, Requested)
                | (None, External)
                | (None, Complete)
                | (None, Failed)
                | (Requested, Complete)
                | (Requested, Failed)
                | (External, Complete)
                | (External, Failed)
        )
    }

    /// Whether decode may regenerate a chunk in this state.
    pub fn can_reconstruct(self) -> bool {
        !matches!(self, ChunkState::Complete | ChunkState::Reconstructed)
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChunkState::None => "none",
            ChunkState::Requested => "requested",
            ChunkState::Complete => "complete",
            ChunkState::Failed => "failed",
            ChunkState::External => "external",
            ChunkState::Reconstructed => "reconstructed",
        };
        write!(f, "{}", s)
    }
}

/// One chunk slot of a stripe
#[derive(Debug)]
pub struct Chunk {
    /// Position within the stripe (0..n)
    pub position: usize,
    /// Object number stored at this position
    pub object_number: u64,
    state: ChunkState,
    /// Present only while the chunk is Complete or Reconstructed
    buffer: Option<PooledBuffer>,
}

impl Chunk {
    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn buffer(&self) -> Option<&PooledBuffer> {
        self.buffer.as_ref()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunk [position={}, object={}, state={}]",
            self.position, self.object_number, self.state
        )
    }
}

/// Per-stripe array of chunk slots
#[derive(Debug)]
pub struct ChunkTable {
    chunks: Vec<Chunk>,
}

impl ChunkTable {
    /// Build the table for `stripe`, every chunk starting in `None`.
    pub fn new(policy: &StripingPolicy, stripe: u64) -> Self {
        let chunks = (0..policy.stripe_width())
            .map(|position| Chunk {
                position,
                object_number: policy.object_number(stripe, position),
                state: ChunkState::None,
                buffer: None,
            })
            .collect();

        Self { chunks }
    }

    pub fn width(&self) -> usize {
        self.chunks.len()
    }

    pub fn get(&self, position: usize) -> Result<&Chunk> {
        self.chunks.get(position).ok_or(Error::InvalidPosition {
            position,
            width: self.chunks.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn state(&self, position: usize) -> Result<ChunkState> {
        self.get(position).map(Chunk::state)
    }

    /// Apply a transition from the declared table.
    pub fn transition(&mut self, position: usize, to: ChunkState) -> Result<ChunkState> {
        let width = self.chunks.len();
        let chunk = self
            .chunks
            .get_mut(position)
            .ok_or(Error::InvalidPosition { position, width })?;

        let from = chunk.state;
        if !from.can_transition(to) {
            return Err(Error::Internal(format!(
                "illegal chunk transition {} -> {} at position {}",
                from, to, position
            )));
        }
        chunk.state = to;
        Ok(from)
    }

    /// Mark Complete and take ownership of the payload.
    pub fn complete(&mut self, position: usize, buffer: PooledBuffer) -> Result<()> {
        self.transition(position, ChunkState::Complete)?;
        self.chunks[position].buffer = Some(buffer);
        Ok(())
    }

    /// Positions currently in `state`
    pub fn positions_in(&self, state: ChunkState) -> Vec<usize> {
        self.chunks
            .iter()
            .filter(|c| c.state == state)
            .map(|c| c.position)
            .collect()
    }

    pub fn count_in(&self, state: ChunkState) -> usize {
        self.chunks.iter().filter(|c| c.state == state).count()
    }

    /// Move every buffer out of the table for decoding.
    ///
    /// Returns one entry per position: the payload for Complete chunks,
    /// `None` for everything that must be regenerated. Regenerated chunks
    /// are moved to Reconstructed here.
    pub(crate) fn take_for_decode(&mut self) -> Vec<Option<PooledBuffer>> {
        self.chunks
            .iter_mut()
            .map(|chunk| {
                if chunk.state == ChunkState::Complete {
                    chunk.buffer.take()
                } else {
                    if chunk.state.can_reconstruct() {
                        chunk.state = ChunkState::Reconstructed;
                    }
                    chunk.buffer = None;
                    None
                }
            })
            .collect()
    }

    /// Release every owned buffer. Safe to call repeatedly.
    pub fn free_buffers(&mut self) -> usize {
        self.chunks
            .iter_mut()
            .filter_map(|chunk| chunk.buffer.take())
            .count()
    }

    /// Number of chunks currently owning a buffer
    pub fn buffered(&self) -> usize {
        self.chunks.iter().filter(|c| c.buffer.is_some()).count()
    }
}

// =============================================================================
// Tests
// =============================================================================
