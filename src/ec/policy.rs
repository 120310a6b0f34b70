//! Striping Policy and Committed Extents
//!
//! The striping policy fixes the stripe geometry (k data chunks, m parity
//! chunks, chunk size) and the position this node occupies in each stripe.
//! Object numbering follows the OSD layout:
//!
//! ```text
//! stripe s, position p < k   ->  data object   k * s + p
//! stripe s, position p >= k  ->  parity object s   (one per parity position)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest stripe width supported by the GF(2^8) Reed-Solomon codec.
pub const MAX_STRIPE_WIDTH: usize = 256;

// =============================================================================
// Striping Policy
// =============================================================================

/// Erasure coding striping policy for a file replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripingPolicy {
    /// Number of data chunks per stripe (k)
    data_width: usize,
    /// Number of parity chunks per stripe (m)
    parity_width: usize,
    /// Chunk size in KiB
    stripe_size_kib: usize,
    /// Position of this node within the stripe
    local_position: usize,
}

impl StripingPolicy {
    /// Create a validated policy.
    pub fn new(
        data_width: usize,
        parity_width: usize,
        stripe_size_kib: usize,
        local_position: usize,
    ) -> Result<Self> {
        if data_width == 0 {
            return Err(Error::InvalidEcConfig(
                "data_width must be greater than 0".to_string(),
            ));
        }
        if parity_width == 0 {
            return Err(Error::InvalidEcConfig(
                "parity_width must be greater than 0".to_string(),
            ));
        }
        if data_width + parity_width > MAX_STRIPE_WIDTH {
            return Err(Error::InvalidEcConfig(format!(
                "stripe width {} exceeds maximum of {}",
                data_width + parity_width,
                MAX_STRIPE_WIDTH
            )));
        }
        if stripe_size_kib == 0 {
            return Err(Error::InvalidEcConfig(
                "stripe_size_kib must be greater than 0".to_string(),
            ));
        }
        if local_position >= data_width + parity_width {
            return Err(Error::InvalidPosition {
                position: local_position,
                width: data_width + parity_width,
            });
        }

        Ok(Self {
            data_width,
            parity_width,
            stripe_size_kib,
            local_position,
        })
    }

    /// Number of data chunks (k)
    pub fn data_width(&self) -> usize {
        self.data_width
    }

    /// Number of parity chunks (m)
    pub fn parity_width(&self) -> usize {
        self.parity_width
    }

    /// Total chunks per stripe (n = k + m)
    pub fn stripe_width(&self) -> usize {
        self.data_width + self.parity_width
    }

    /// Chunk size in bytes
    pub fn chunk_size(&self) -> usize {
        self.stripe_size_kib * 1024
    }

    /// This node's position in the stripe
    pub fn local_position(&self) -> usize {
        self.local_position
    }

    /// The same policy seen from another position in the stripe.
    pub fn at_position(&self, position: usize) -> Result<Self> {
        Self::new(
            self.data_width,
            self.parity_width,
            self.stripe_size_kib,
            position,
        )
    }

    /// Whether the position holds a data chunk.
    pub fn is_data_position(&self, position: usize) -> bool {
        position < self.data_width
    }

    /// Object number stored at `position` for stripe `stripe`.
    pub fn object_number(&self, stripe: u64, position: usize) -> u64 {
        if position < self.data_width {
            self.data_width as u64 * stripe + position as u64
        } else {
            stripe
        }
    }

    /// Stripe containing data object `object_number`.
    pub fn stripe_of_object(&self, object_number: u64) -> u64 {
        object_number / self.data_width as u64
    }

    /// Position of data object `object_number` within its stripe.
    pub fn position_of_object(&self, object_number: u64) -> usize {
        (object_number % self.data_width as u64) as usize
    }

    /// Split a file byte range into per-object reads.
    pub fn translate_read(&self, offset: u64, length: usize) -> Vec<ObjectRead> {
        let chunk_size = self.chunk_size() as u64;
        let mut ops = Vec::new();
        let mut done = 0usize;

        while done < length {
            let absolute = offset + done as u64;
            let object_number = absolute / chunk_size;
            let object_offset = (absolute % chunk_size) as usize;
            let len = std::cmp::min(length - done, chunk_size as usize - object_offset);

            ops.push(ObjectRead {
                object_number,
                stripe: self.stripe_of_object(object_number),
                position: self.position_of_object(object_number),
                object_offset,
                length: len,
                buffer_offset: done,
            });

            done += len;
        }

        ops
    }
}

/// One object-level piece of a byte-range read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRead {
    pub object_number: u64,
    pub stripe: u64,
    pub position: usize,
    /// Offset inside the object
    pub object_offset: usize,
    pub length: usize,
    /// Offset inside the caller's buffer
    pub buffer_offset: usize,
}

// =============================================================================
// Committed Extents
// =============================================================================

/// A committed, durable byte range `[start, end)` with its write version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub start: u64,
    pub end: u64,
    pub version: u64,
}

impl Extent {
    pub fn new(start: u64, end: u64, version: u64) -> Self {
        Self {
            start,
            end,
            version,
        }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Canonical, normalized list of committed extents for a stripe.
///
/// Extents are sorted by start, never overlap, and touching extents of the
/// same version are merged. Construction is the only place normalization
/// happens; readers get the canonical form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommittedExtents(Vec<Extent>);

impl CommittedExtents {
    /// No committed extents.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalize raw extents into the canonical form.
    pub fn normalize(mut extents: Vec<Extent>) -> Result<Self> {
        if let Some(bad) = extents.iter().find(|e| e.start > e.end) {
            return Err(Error::InvalidExtents(format!(
                "extent start {} is past its end {}",
                bad.start, bad.end
            )));
        }

        extents.retain(|e| !e.is_empty());
        extents.sort_by_key(|e| (e.start, e.end));

        let mut normalized: Vec<Extent> = Vec::with_capacity(extents.len());
        for extent in extents {
            match normalized.last_mut() {
                Some(last) if last.overlaps(&extent) => {
                    if last.version != extent.version {
                        return Err(Error::InvalidExtents(format!(
                            "extents [{}, {}) v{} and [{}, {}) v{} overlap",
                            last.start,
                            last.end,
                            last.version,
                            extent.start,
                            extent.end,
                            extent.version
                        )));
                    }
                    last.end = last.end.max(extent.end);
                }
                Some(last) if last.end == extent.start && last.version == extent.version => {
                    last.end = extent.end;
                }
                _ => normalized.push(extent),
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_slice(&self) -> &[Extent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `[start, end)` is fully covered by committed extents.
    pub fn covers(&self, start: u64, end: u64) -> bool {
        let mut cursor = start;
        for extent in &self.0 {
            if extent.start > cursor {
                break;
            }
            if extent.end > cursor {
                cursor = extent.end;
            }
            if cursor >= end {
                return true;
            }
        }
        cursor >= end
    }
}

impl<'de> Deserialize<'de> for CommittedExtents {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Vec::<Extent>::deserialize(deserializer)?;
        Self::normalize(raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
