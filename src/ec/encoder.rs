//! Erasure Coding Encoder/Decoder
//!
//! Implements systematic Reed-Solomon coding over GF(2^8) using the
//! `reed-solomon-erasure` crate. The decoder works on a full stripe of
//! equally sized shards plus a present bitmap, regenerating absent shards
//! in place.

use crate::error::{Error, Result};
use reed_solomon_erasure::galois_8::ReedSolomon;
use std::sync::Arc;
use tracing::{debug, instrument};

fn build_codec(data_shards: usize, parity_shards: usize) -> Result<Arc<ReedSolomon>> {
    if data_shards == 0 {
        return Err(Error::InvalidEcConfig(
            "data_shards must be greater than 0".to_string(),
        ));
    }
    if parity_shards == 0 {
        return Err(Error::InvalidEcConfig(
            "parity_shards must be greater than 0".to_string(),
        ));
    }

    let rs = ReedSolomon::new(data_shards, parity_shards).map_err(|e| {
        Error::InvalidEcConfig(format!("Failed to create Reed-Solomon codec: {}", e))
    })?;

    Ok(Arc::new(rs))
}

// =============================================================================
// EC Encoder
// =============================================================================

/// Erasure coding encoder computing parity chunks for a stripe
pub struct EcEncoder {
    rs: Arc<ReedSolomon>,
    data_shards: usize,
    parity_shards: usize,
}

impl EcEncoder {
    /// Create a new encoder with the specified k+m configuration
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        Ok(Self {
            rs: build_codec(data_shards, parity_shards)?,
            data_shards,
            parity_shards,
        })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Compute parity for equally sized data chunks.
    ///
    /// Returns the full stripe: the k data chunks followed by m parity chunks.
    #[instrument(skip(self, data_chunks), fields(chunks = data_chunks.len()))]
    pub fn encode_stripe(&self, data_chunks: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
        if data_chunks.len() != self.data_shards {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} data chunks, got {}",
                self.data_shards,
                data_chunks.len()
            )));
        }

        let chunk_size = data_chunks.first().map(Vec::len).unwrap_or(0);
        if data_chunks.iter().any(|c| c.len() != chunk_size) {
            return Err(Error::EcEncodingFailed(
                "data chunks must have equal length".to_string(),
            ));
        }

        let mut shards = data_chunks;
        shards.extend((0..self.parity_shards).map(|_| vec![0u8; chunk_size]));
        self.encode_shards(&mut shards)?;

        debug!(
            chunk_size,
            total = self.total_shards(),
            "Encoded stripe parity"
        );

        Ok(shards)
    }

    /// Compute parity in place for data shards followed by parity slots
    pub fn encode_shards(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        if shards.len() != self.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shards, got {}",
                self.total_shards(),
                shards.len()
            )));
        }

        self.rs
            .encode(shards)
            .map_err(|e| Error::EcEncodingFailed(format!("Reed-Solomon encoding failed: {}", e)))
    }

    /// Verify that the parity shards are consistent with data shards
    pub fn verify(&self, shards: &[Vec<u8>]) -> Result<bool> {
        if shards.len() != self.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shards, got {}",
                self.total_shards(),
                shards.len()
            )));
        }

        self.rs
            .verify(shards)
            .map_err(|e| Error::EcEncodingFailed(format!("Verification failed: {}", e)))
    }
}

// =============================================================================
// EC Decoder
// =============================================================================

/// Result of a [`EcDecoder::decode_missing`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Absent data shards regenerated
    pub data_regenerated: usize,
    /// Absent parity shards regenerated
    pub parity_regenerated: usize,
}

/// Erasure coding decoder for regenerating absent shards
pub struct EcDecoder {
    rs: Arc<ReedSolomon>,
    data_shards: usize,
    parity_shards: usize,
}

impl EcDecoder {
    /// Create a new decoder with the specified k+m configuration
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        Ok(Self {
            rs: build_codec(data_shards, parity_shards)?,
            data_shards,
            parity_shards,
        })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    fn check_shard_count(&self, count: usize) -> Result<()> {
        if count != self.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shards, got {}",
                self.total_shards(),
                count
            )));
        }
        Ok(())
    }

    /// Regenerate absent shards in place over the byte range
    /// `[offset, offset + length)`.
    ///
    /// `present[i]` tells whether `shards[i]` holds valid data. Absent data
    /// shards are always regenerated. Absent parity shards are regenerated
    /// when every data shard was present, or when `recreate_parity` is set;
    /// otherwise they are left untouched.
    #[instrument(skip(self, shards, present), fields(offset, length, recreate_parity))]
    pub fn decode_missing(
        &self,
        shards: &mut [Vec<u8>],
        present: &[bool],
        offset: usize,
        length: usize,
        recreate_parity: bool,
    ) -> Result<DecodeOutcome> {
        self.check_shard_count(shards.len())?;
        self.check_shard_count(present.len())?;

        let available = present.iter().filter(|&&p| p).count();
        if available < self.data_shards {
            return Err(Error::InsufficientShards {
                available,
                required: self.data_shards,
            });
        }

        let end = offset + length;
        if let Some(short) = shards.iter().position(|s| s.len() < end) {
            return Err(Error::InvalidEcConfig(format!(
                "shard {} has {} bytes, decode range ends at {}",
                short,
                shards[short].len(),
                end
            )));
        }

        let data_missing = present[..self.data_shards].iter().filter(|&&p| !p).count();
        let parity_missing = present[self.data_shards..].iter().filter(|&&p| !p).count();
        if (data_missing == 0 && parity_missing == 0) || length == 0 {
            return Ok(DecodeOutcome {
                data_regenerated: 0,
                parity_regenerated: 0,
            });
        }

        let regenerate_parity = recreate_parity || data_missing == 0;
        let whole = offset == 0 && shards.iter().all(|s| s.len() == length);

        // Present shards are moved when the range spans them entirely
        let mut work: Vec<Option<Vec<u8>>> = shards
            .iter_mut()
            .zip(present)
            .map(|(shard, &is_present)| match (is_present, whole) {
                (false, _) => None,
                (true, true) => Some(std::mem::take(shard)),
                (true, false) => Some(shard[offset..end].to_vec()),
            })
            .collect();

        let result = if regenerate_parity {
            self.rs.reconstruct(&mut work[..])
        } else {
            self.rs.reconstruct_data(&mut work[..])
        };

        let mut outcome = DecodeOutcome {
            data_regenerated: 0,
            parity_regenerated: 0,
        };

        for (i, (slot, shard)) in work.into_iter().zip(shards.iter_mut()).enumerate() {
            match (present[i], slot) {
                (true, Some(data)) if whole => *shard = data,
                (true, _) => {}
                (false, Some(data)) => {
                    shard[offset..end].copy_from_slice(&data);
                    if i < self.data_shards {
                        outcome.data_regenerated += 1;
                    } else {
                        outcome.parity_regenerated += 1;
                    }
                }
                (false, None) => {}
            }
        }

        result.map_err(|e| Error::EcReconstructionFailed {
            stripe_id: 0,
            reason: format!("Reed-Solomon decode failed: {}", e),
        })?;

        debug!(
            data = outcome.data_regenerated,
            parity = outcome.parity_regenerated,
            "Regenerated absent shards"
        );

        Ok(outcome)
    }
}

// =============================================================================
// Tests
// =============================================================================
