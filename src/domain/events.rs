//! Domain Events
//!
//! Immutable records of reconstruction outcomes, emitted on the same edges
//! as the session callbacks. Adapters forward them to logs or channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event raised by a reconstruction session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReconstructionEvent {
    /// Enough chunks arrived; the stripe is ready to decode.
    StripeRecoverable {
        stripe: u64,
        timestamp: DateTime<Utc>,
    },

    /// The failure budget was exceeded.
    StripeFailed {
        stripe: u64,
        timestamp: DateTime<Utc>,
    },

    /// A node returned a stale chunk and needs repair.
    ChunkNeedsRepair {
        position: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ReconstructionEvent {
    pub fn recoverable(stripe: u64) -> Self {
        Self::StripeRecoverable {
            stripe,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(stripe: u64) -> Self {
        Self::StripeFailed {
            stripe,
            timestamp: Utc::now(),
        }
    }

    pub fn needs_repair(position: usize) -> Self {
        Self::ChunkNeedsRepair {
            position,
            timestamp: Utc::now(),
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StripeRecoverable { .. } => "StripeRecoverable",
            Self::StripeFailed { .. } => "StripeFailed",
            Self::ChunkNeedsRepair { .. } => "ChunkNeedsRepair",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StripeRecoverable { timestamp, .. }
            | Self::StripeFailed { timestamp, .. }
            | Self::ChunkNeedsRepair { timestamp, .. } => *timestamp,
        }
    }

    /// Stripe the event refers to, if any
    pub fn stripe(&self) -> Option<u64> {
        match self {
            Self::StripeRecoverable { stripe, .. } | Self::StripeFailed { stripe, .. } => {
                Some(*stripe)
            }
            Self::ChunkNeedsRepair { .. } => None,
        }
    }

    /// Whether the event ends the session
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ChunkNeedsRepair { .. })
    }
}
