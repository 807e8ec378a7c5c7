//! Property-based tests for the rewrite engine and the eligibility filter.

use inplace_recompress::filter::passes_ratio;
use inplace_recompress::{
    evaluate, rewrite_in_place, Decision, FileTask, InodeKey, MemoryLedger, RunConfig, SkipReason,
    BLOCK_UNIT,
};
use proptest::prelude::*;

/// Strategy for file contents up to a few buffers long.
fn any_data() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..40_000)
}

/// Strategy for file names with and without ignored extensions.
fn any_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("notes.txt".to_string()),
        Just("IMAGE.JPEG".to_string()),
        Just("archive.tar.gz".to_string()),
        Just("database.sqlite".to_string()),
        "[a-z]{1,8}\\.[a-z]{1,4}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Rewriting never changes bytes or length, whatever the buffer size.
    #[test]
    fn test_rewrite_preserves_bytes(data in any_data(), buf_len in 1usize..9000) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, &data).unwrap();

        let mut buf = vec![0u8; buf_len];
        let copied = rewrite_in_place(&path, &mut buf, false).unwrap();

        prop_assert_eq!(copied, data.len() as u64);
        prop_assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    /// Files below the minimum size are always too small, whatever else holds.
    #[test]
    fn test_small_files_always_too_small(
        name in any_name(),
        min in 1u64..1_000_000,
        blocks in 0u64..4000,
        ratio in 0.0f64..4.0,
    ) {
        let size = min - 1;
        let config = RunConfig { min_file_size: min, skip_ratio: ratio, ..RunConfig::default() };
        let task = FileTask::synthetic(format!("/t/{}", name), size, blocks, InodeKey::new(1, 1));
        let decision = evaluate(&task, &config, &MemoryLedger::new()).unwrap();
        prop_assert_eq!(decision, Decision::Skip(SkipReason::TooSmall));
    }

    /// Above the size floor and outside the ignore set, the ratio check alone
    /// decides for a fresh ledger.
    #[test]
    fn test_ratio_decides_for_plain_files(
        size in 1u64..10_000_000,
        blocks in 0u64..40_000,
        ratio in prop_oneof![Just(0.0f64), 0.5f64..3.0],
    ) {
        let config = RunConfig { min_file_size: 1, skip_ratio: ratio, ..RunConfig::default() };
        let task = FileTask::synthetic("/t/data.bin", size, blocks, InodeKey::new(1, 1));
        let decision = evaluate(&task, &config, &MemoryLedger::new()).unwrap();

        let expected = if ratio == 0.0 || ((blocks * BLOCK_UNIT) as f64) * ratio < size as f64 {
            Decision::Process
        } else {
            Decision::Skip(SkipReason::Ratio)
        };
        prop_assert_eq!(decision, expected);
        prop_assert_eq!(passes_ratio(blocks * BLOCK_UNIT, size, ratio), expected == Decision::Process);
    }
}
