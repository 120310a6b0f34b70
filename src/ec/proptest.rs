//! Property-Based Tests for Stripe Reconstruction
//!
//! Uses proptest to verify decoder correctness and the striping arithmetic
//! across a wide range of inputs and configurations.
//!
//! # Test Properties
//!
//! 1. **MDS Recovery**: any k present chunks regenerate the missing data
//! 2. **Parity Policy**: parity is rebuilt only when asked or when no data was lost
//! 3. **Failure Mode**: more than m absent chunks is rejected
//! 4. **Read Translation**: per-object reads tile the requested byte range
//! 5. **Extent Normalisation**: output is sorted and non-overlapping

#![cfg(test)]

use proptest::prelude::*;

use super::encoder::{EcDecoder, EcEncoder};
use super::policy::{CommittedExtents, Extent, StripingPolicy};
use crate::error::Error;

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for generating small k+m configurations for faster tests.
/// k: 2-6 data chunks, m: 1-3 parity chunks
fn ec_config_strategy() -> impl Strategy<Value = (usize, usize)> {
    (2usize..=6, 1usize..=3)
}

/// Strategy for generating a stripe of k data chunks of equal length.
fn stripe_strategy() -> impl Strategy<Value = (usize, usize, Vec<Vec<u8>>)> {
    (ec_config_strategy(), 1usize..=512).prop_flat_map(|((k, m), len)| {
        prop::collection::vec(prop::collection::vec(any::<u8>(), len), k)
            .prop_map(move |data| (k, m, data))
    })
}

/// Strategy for a present bitmap with exactly `absent` false entries.
fn present_strategy(total: usize, absent: usize) -> impl Strategy<Value = Vec<bool>> {
    Just((0..total).collect::<Vec<usize>>())
        .prop_shuffle()
        .prop_map(move |order| {
            let mut present = vec![true; total];
            for &i in order.iter().take(absent) {
                present[i] = false;
            }
            present
        })
}

/// Encoded stripe plus an erasure pattern of at most m chunks.
fn erased_stripe_strategy() -> impl Strategy<Value = (usize, usize, Vec<Vec<u8>>, Vec<bool>)> {
    stripe_strategy().prop_flat_map(|(k, m, data)| {
        (0..=m).prop_flat_map(move |absent| {
            let data = data.clone();
            present_strategy(k + m, absent).prop_map(move |present| (k, m, data.clone(), present))
        })
    })
}

fn erase(shards: &[Vec<u8>], present: &[bool]) -> Vec<Vec<u8>> {
    shards
        .iter()
        .zip(present)
        .map(|(s, &p)| if p { s.clone() } else { vec![0u8; s.len()] })
        .collect()
}

// =============================================================================
// Recovery Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: Any pattern of up to m absent chunks regenerates all data chunks.
    #[test]
    fn prop_any_m_erasures_recover_data(
        (k, m, data, present) in erased_stripe_strategy(),
    ) {
        let encoder = EcEncoder::new(k, m)?;
        let decoder = EcDecoder::new(k, m)?;
        let original = encoder.encode_stripe(data)?;
        let len = original[0].len();

        let mut shards = erase(&original, &present);
        decoder.decode_missing(&mut shards, &present, 0, len, false)?;

        prop_assert_eq!(&shards[..k], &original[..k],
            "Data recovery failed for k={}, m={}, present={:?}", k, m, present);
    }

    /// Property: With recreate_parity every chunk matches the encoded stripe.
    #[test]
    fn prop_recreate_parity_restores_stripe(
        (k, m, data, present) in erased_stripe_strategy(),
    ) {
        let encoder = EcEncoder::new(k, m)?;
        let decoder = EcDecoder::new(k, m)?;
        let original = encoder.encode_stripe(data)?;
        let len = original[0].len();

        let mut shards = erase(&original, &present);
        decoder.decode_missing(&mut shards, &present, 0, len, true)?;

        prop_assert!(encoder.verify(&shards)?);
        prop_assert_eq!(shards, original);
    }

    /// Property: Without recreate_parity, lost parity stays zero when data was also lost.
    #[test]
    fn prop_parity_left_alone_without_flag(
        (k, m, data, present) in erased_stripe_strategy(),
    ) {
        let data_lost = present[..k].iter().any(|&p| !p);
        let encoder = EcEncoder::new(k, m)?;
        let decoder = EcDecoder::new(k, m)?;
        let original = encoder.encode_stripe(data)?;
        let len = original[0].len();

        let mut shards = erase(&original, &present);
        let outcome = decoder.decode_missing(&mut shards, &present, 0, len, false)?;

        for i in k..k + m {
            if present[i] {
                prop_assert_eq!(&shards[i], &original[i]);
            } else if data_lost {
                prop_assert!(shards[i].iter().all(|&b| b == 0));
            } else {
                prop_assert_eq!(&shards[i], &original[i]);
            }
        }
        if data_lost {
            prop_assert_eq!(outcome.parity_regenerated, 0);
        }
    }

    /// Property: Decoding a sub-range only touches that range.
    #[test]
    fn prop_sub_range_decode(
        (k, m, data) in stripe_strategy(),
        cut in 0.0f64..1.0,
    ) {
        let encoder = EcEncoder::new(k, m)?;
        let decoder = EcDecoder::new(k, m)?;
        let original = encoder.encode_stripe(data)?;
        let len = original[0].len();
        let offset = ((len as f64) * cut) as usize;
        let length = len - offset;

        let mut present = vec![true; k + m];
        present[0] = false;
        let mut shards = erase(&original, &present);
        decoder.decode_missing(&mut shards, &present, offset, length, false)?;

        prop_assert!(shards[0][..offset].iter().all(|&b| b == 0));
        prop_assert_eq!(&shards[0][offset..], &original[0][offset..]);
    }
}

// =============================================================================
// Failure Mode Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Property: More than m absent chunks is rejected without touching the buffers.
    #[test]
    fn prop_too_many_erasures_fails(
        (k, m, data) in stripe_strategy(),
    ) {
        let encoder = EcEncoder::new(k, m)?;
        let decoder = EcDecoder::new(k, m)?;
        let original = encoder.encode_stripe(data)?;
        let len = original[0].len();

        let present: Vec<bool> = (0..k + m).map(|i| i > m).collect();
        let mut shards = erase(&original, &present);
        let before = shards.clone();

        let result = decoder.decode_missing(&mut shards, &present, 0, len, true);
        let rejected = matches!(result, Err(Error::InsufficientShards { .. }));
        prop_assert!(rejected, "Should fail with {} erasures (m={})", m + 1, m);
        prop_assert_eq!(shards, before);
    }
}

// =============================================================================
// Striping Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: Translated reads tile the byte range without gaps.
    #[test]
    fn prop_translate_read_tiles_range(
        (k, m) in ec_config_strategy(),
        kib in 1usize..=4,
        offset in 0u64..100_000,
        length in 0usize..50_000,
    ) {
        let policy = StripingPolicy::new(k, m, kib, 0)?;
        let reads = policy.translate_read(offset, length);

        let total: usize = reads.iter().map(|r| r.length).sum();
        prop_assert_eq!(total, length);

        let mut buffer_offset = 0;
        for read in &reads {
            prop_assert_eq!(read.buffer_offset, buffer_offset);
            prop_assert!(read.position < k, "reads only touch data positions");
            prop_assert!(read.object_offset + read.length <= policy.chunk_size());
            prop_assert_eq!(policy.position_of_object(read.object_number), read.position);
            prop_assert_eq!(policy.stripe_of_object(read.object_number), read.stripe);
            buffer_offset += read.length;
        }
    }

    /// Property: Normalised extents are sorted and disjoint.
    #[test]
    fn prop_normalized_extents_are_disjoint(
        raw in prop::collection::vec((0u64..1000, 0u64..200), 0..20),
    ) {
        // Single version: overlaps always merge
        let extents: Vec<Extent> = raw
            .into_iter()
            .map(|(start, len)| Extent::new(start, start + len, 1))
            .collect();
        let covered: Vec<(u64, u64)> = extents.iter().filter(|e| !e.is_empty()).map(|e| (e.start, e.end)).collect();

        let normalized = CommittedExtents::normalize(extents)?;
        for pair in normalized.as_slice().windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
        for (start, end) in covered {
            prop_assert!(normalized.covers(start, end));
        }
    }
}
