//! Error types for stripe reconstruction

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconstructing an erasure-coded stripe
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The read could not be dispatched (peer unknown or unreachable)
    #[error("Dispatch to chunk position {position} failed: {reason}")]
    Dispatch { position: usize, reason: String },

    /// The peer answered with an explicit failure
    #[error("Remote read of chunk position {position} failed: {reason}")]
    RemoteFailure { position: usize, reason: String },

    /// The read did not answer within the configured timeout
    #[error("Read of chunk position {position} timed out after {timeout:?}")]
    ReadTimeout { position: usize, timeout: Duration },

    // =========================================================================
    // Usage Errors
    // =========================================================================
    /// A chunk buffer was requested before the stripe was decoded
    #[error("Chunk position {position} requested before decode completed")]
    NotDecoded { position: usize },

    /// The session was aborted and no longer owns any buffers
    #[error("Reconstruction session for stripe {stripe_id} was aborted")]
    SessionAborted { stripe_id: u64 },

    /// The decoded buffers were already released
    #[error("Buffer of chunk position {position} was already released")]
    BufferReleased { position: usize },

    /// Parity lost together with data and not regenerated by the decode
    #[error("Parity chunk position {position} was not regenerated")]
    ParityNotRegenerated { position: usize },

    /// Position outside the stripe width
    #[error("Chunk position {position} out of range for stripe width {width}")]
    InvalidPosition { position: usize, width: usize },

    // =========================================================================
    // Erasure Coding Errors
    // =========================================================================
    /// Insufficient shards for reconstruction
    #[error("Insufficient shards for reconstruction: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    /// EC reconstruction failed
    #[error("EC reconstruction failed for stripe {stripe_id}: {reason}")]
    EcReconstructionFailed { stripe_id: u64, reason: String },

    /// EC encoding failed
    #[error("EC encoding failed: {0}")]
    EcEncodingFailed(String),

    /// Invalid EC configuration
    #[error("Invalid EC configuration: {0}")]
    InvalidEcConfig(String),

    /// Committed extents that cannot be normalized
    #[error("Invalid committed extents: {0}")]
    InvalidExtents(String),
}

impl Error {
    /// Whether the error is a caller mistake rather than a storage failure.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::NotDecoded { .. }
                | Error::SessionAborted { .. }
                | Error::BufferReleased { .. }
                | Error::ParityNotRegenerated { .. }
                | Error::InvalidPosition { .. }
                | Error::InsufficientShards { .. }
        )
    }

    /// Whether the error came from reading a chunk (counted against the failure budget).
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Error::Dispatch { .. } | Error::RemoteFailure { .. } | Error::ReadTimeout { .. }
        )
    }
}
