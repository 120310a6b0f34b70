//! Reed-Solomon Codec Adapter
//!
//! Implements the `EcCodec` port over the `reed-solomon-erasure` backed
//! [`EcDecoder`].

use crate::domain::ports::EcCodec;
use crate::ec::encoder::{DecodeOutcome, EcDecoder};
use crate::error::Result;

/// Reed-Solomon based erasure coding adapter.
pub struct ReedSolomonCodecAdapter {
    decoder: EcDecoder,
}

impl std::fmt::Debug for ReedSolomonCodecAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReedSolomonCodecAdapter")
            .field("data_shards", &self.decoder.data_shards())
            .field("parity_shards", &self.decoder.parity_shards())
            .finish()
    }
}

impl ReedSolomonCodecAdapter {
    /// Create a new Reed-Solomon codec adapter.
    ///
    /// # Arguments
    /// * `data_shards` - Number of data chunks per stripe (k)
    /// * `parity_shards` - Number of parity chunks per stripe (m)
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        Ok(Self {
            decoder: EcDecoder::new(data_shards, parity_shards)?,
        })
    }
}

impl EcCodec for ReedSolomonCodecAdapter {
    fn data_shards(&self) -> usize {
        self.decoder.data_shards()
    }

    fn parity_shards(&self) -> usize {
        self.decoder.parity_shards()
    }

    fn decode_missing(
        &self,
        shards: &mut [Vec<u8>],
        present: &[bool],
        offset: usize,
        length: usize,
        recreate_parity: bool,
    ) -> Result<DecodeOutcome> {
        self.decoder
            .decode_missing(shards, present, offset, length, recreate_parity)
    }
}
