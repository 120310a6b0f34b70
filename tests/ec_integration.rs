//! EC Integration Tests
//!
//! End-to-end tests for the codec, the striping arithmetic and the buffer
//! pool as seen from outside the crate.

use std::sync::Arc;

use stripe_rebuild::domain::ports::EcCodec;
use stripe_rebuild::adapters::ReedSolomonCodecAdapter;
use stripe_rebuild::ec::buffer::{BufferPool, BufferPoolConfig};
use stripe_rebuild::ec::encoder::{EcDecoder, EcEncoder};
use stripe_rebuild::ec::policy::{CommittedExtents, Extent, StripingPolicy};
use stripe_rebuild::Error;

fn stripe_data(k: usize, chunk: usize) -> Vec<Vec<u8>> {
    (0..k)
        .map(|i| (0..chunk).map(|j| ((i * 131 + j) % 256) as u8).collect())
        .collect()
}

fn degrade(shards: &[Vec<u8>], lost: &[usize]) -> (Vec<Vec<u8>>, Vec<bool>) {
    let present: Vec<bool> = (0..shards.len()).map(|i| !lost.contains(&i)).collect();
    let degraded = shards
        .iter()
        .zip(&present)
        .map(|(s, &p)| if p { s.clone() } else { vec![0; s.len()] })
        .collect();
    (degraded, present)
}

// =============================================================================
// Encoder/Decoder Integration Tests
// =============================================================================

#[test]
fn test_encode_decode_full_pipeline() {
    let encoder = EcEncoder::new(4, 2).expect("Failed to create encoder");
    let decoder = EcDecoder::new(4, 2).expect("Failed to create decoder");

    let shards = encoder
        .encode_stripe(stripe_data(4, 4096))
        .expect("Failed to encode");
    assert_eq!(shards.len(), 6);
    assert!(encoder.verify(&shards).expect("Verify failed"));

    // Nothing missing: nothing regenerated, nothing changed
    let (mut copy, present) = degrade(&shards, &[]);
    let outcome = decoder
        .decode_missing(&mut copy, &present, 0, 4096, true)
        .expect("Failed to decode");
    assert_eq!(outcome.data_regenerated + outcome.parity_regenerated, 0);
    assert_eq!(copy, shards);
}

#[test]
fn test_reconstruction_preserves_data_integrity() {
    let encoder = EcEncoder::new(4, 2).expect("Failed to create encoder");
    let decoder = EcDecoder::new(4, 2).expect("Failed to create decoder");
    let shards = encoder
        .encode_stripe(stripe_data(4, 1024))
        .expect("Failed to encode");

    let loss_patterns = vec![
        vec![0],    // Lose shard 0
        vec![3],    // Lose shard 3
        vec![5],    // Lose parity shard
        vec![0, 1], // Lose 2 data shards
        vec![0, 5], // Lose 1 data + 1 parity
        vec![4, 5], // Lose both parity shards
    ];

    for pattern in loss_patterns {
        let (mut degraded, present) = degrade(&shards, &pattern);
        decoder
            .decode_missing(&mut degraded, &present, 0, 1024, true)
            .unwrap_or_else(|_| panic!("Failed with loss pattern: {:?}", pattern));

        assert_eq!(
            degraded, shards,
            "Stripe mismatch with loss pattern: {:?}",
            pattern
        );
    }
}

#[test]
fn test_decode_beyond_max_loss_fails() {
    let codec = ReedSolomonCodecAdapter::new(4, 2).expect("Failed to create codec");
    let encoder = EcEncoder::new(4, 2).expect("Failed to create encoder");
    let shards = encoder
        .encode_stripe(stripe_data(4, 512))
        .expect("Failed to encode");

    let (mut degraded, present) = degrade(&shards, &[0, 1, 2]);
    let result = codec.decode_missing(&mut degraded, &present, 0, 512, false);
    assert!(matches!(
        result,
        Err(Error::InsufficientShards {
            available: 3,
            required: 4
        })
    ));
}

#[test]
fn test_different_ec_configurations() {
    let configs = vec![
        (2, 1),  // Minimal: 2+1
        (4, 2),  // Standard: 4+2
        (6, 3),  // High: 6+3
        (10, 4), // Wide: 10+4
    ];

    for (k, m) in configs {
        let encoder = EcEncoder::new(k, m).expect("Failed to create encoder");
        let decoder = EcDecoder::new(k, m).expect("Failed to create decoder");
        let shards = encoder
            .encode_stripe(stripe_data(k, 256))
            .expect("Failed to encode");

        // Lose the first m chunks
        let lost: Vec<usize> = (0..m).collect();
        let (mut degraded, present) = degrade(&shards, &lost);
        decoder
            .decode_missing(&mut degraded, &present, 0, 256, false)
            .unwrap_or_else(|_| panic!("Failed to recover with {}+{} config", k, m));

        assert_eq!(
            &degraded[..k],
            &shards[..k],
            "Data mismatch with {}+{} config",
            k,
            m
        );
    }
}

// =============================================================================
// Striping Integration Tests
// =============================================================================

#[test]
fn test_translate_read_feeds_object_numbers() {
    let policy = StripingPolicy::new(4, 2, 64, 0).expect("policy");
    let chunk = policy.chunk_size() as u64;

    // Read the last 10 bytes of stripe 0 and the first 10 of stripe 1
    let reads = policy.translate_read(4 * chunk - 10, 20);
    assert_eq!(reads.len(), 2);
    assert_eq!(reads[0].object_number, 3);
    assert_eq!(reads[0].stripe, 0);
    assert_eq!(reads[1].object_number, 4);
    assert_eq!(reads[1].stripe, 1);
    assert_eq!(reads[1].position, 0);
    assert_eq!(reads[1].object_number, policy.object_number(1, 0));
}

#[test]
fn test_committed_extents_from_json_are_normalized() {
    let extents: CommittedExtents = serde_json::from_str(
        r#"[
            {"start": 100, "end": 200, "version": 2},
            {"start": 0, "end": 50, "version": 1},
            {"start": 50, "end": 80, "version": 1}
        ]"#,
    )
    .expect("parse");

    assert_eq!(
        extents.as_slice(),
        &[Extent::new(0, 80, 1), Extent::new(100, 200, 2)]
    );
    assert!(extents.covers(10, 70));
    assert!(!extents.covers(70, 120));

    let conflicting = serde_json::from_str::<CommittedExtents>(
        r#"[{"start": 0, "end": 50, "version": 1}, {"start": 40, "end": 60, "version": 2}]"#,
    );
    assert!(conflicting.is_err());
}

// =============================================================================
// Buffer Pool Integration Tests
// =============================================================================

#[test]
fn test_pool_reuses_released_buffers() {
    let pool: Arc<BufferPool> = BufferPool::new(BufferPoolConfig::default());

    let first = pool.allocate(64 * 1024);
    drop(first);
    let second = pool.allocate(40 * 1024);

    let stats = pool.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.outstanding(), 1);
    assert!(second.iter().all(|&b| b == 0));
}

#[tokio::test]
async fn test_pool_is_shared_across_threads() {
    let pool = BufferPool::new(BufferPoolConfig::default());

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let mut buf = pool.allocate(1024 * (i + 1));
                    buf[0] = i as u8;
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for worker in workers {
        worker.await.expect("worker panicked");
    }
    assert_eq!(pool.stats().outstanding(), 0);
    assert_eq!(pool.stats().allocated, 400);
}
