use gpucap_chunklog::{
    read_log_from_slice, write_log_to_vec, Chunk, ChunkKind, ChunkLog, DrawcallUse,
    DrawcallUseIndex, FieldValue,
};
use proptest::prelude::*;

fn valid_log_bytes() -> Vec<u8> {
    let mut log = ChunkLog::new();
    for i in 0..4u32 {
        log.append(
            Chunk::new(ChunkKind(i as u16))
                .with_field("commandBuffer", FieldValue::Resource(1))
                .with_field("value", FieldValue::U32(i))
                .with_field("label", FieldValue::Str(format!("chunk {i}"))),
        );
    }
    write_log_to_vec(&log).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        rng_algorithm: proptest::test_runner::RngAlgorithm::ChaCha,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0x6C_0C_A9),
        .. ProptestConfig::default()
    })]

    #[test]
    fn reading_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..=4096)) {
        let res = std::panic::catch_unwind(|| read_log_from_slice(&bytes));
        prop_assert!(res.is_ok(), "reader panicked (len={})", bytes.len());
    }

    #[test]
    fn corrupting_a_valid_log_never_panics(pos in 0usize..200, byte in any::<u8>()) {
        let mut bytes = valid_log_bytes();
        let pos = pos % bytes.len();
        bytes[pos] = byte;
        let res = std::panic::catch_unwind(|| read_log_from_slice(&bytes));
        prop_assert!(res.is_ok(), "reader panicked after corrupting byte {}", pos);
    }

    #[test]
    fn lower_bound_returns_first_use_at_or_after_offset(
        mut entries in proptest::collection::vec((0u64..64, 1u32..1000), 0..64),
        at in 0u64..70,
    ) {
        let mut index = DrawcallUseIndex::new();
        // Arrival order is arbitrary; the index must still answer as if sorted.
        for (offset, event) in &entries {
            index.push(DrawcallUse::new(*offset, *event));
        }
        entries.sort();

        let expected = entries
            .iter()
            .find(|(offset, _)| *offset >= at)
            .map(|(offset, event)| DrawcallUse::new(*offset, *event));
        prop_assert_eq!(index.lower_bound(at), expected);
        prop_assert!(index.as_slice().windows(2).all(|w| w[0] <= w[1]));
    }
}
