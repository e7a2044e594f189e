#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Property tests for header and chain encoding

use potato_formats::compression::CompressionRegistry;
use potato_formats::constants::{BUNDLE_MAGIC, CHAIN_LENGTH, HEADER_SIZE};
use potato_formats::{BundleHeader, FileRecord, FileTime};
use proptest::prelude::*;

fn header() -> impl Strategy<Value = BundleHeader> {
    (
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        any::<[u8; 8]>(),
    )
        .prop_map(
            |(file_size, dummy_size, index_size, unknown, attributes)| BundleHeader {
                magic: BUNDLE_MAGIC,
                file_size,
                dummy_size,
                index_size,
                unknown,
                attributes,
            },
        )
}

fn record() -> impl Strategy<Value = FileRecord> {
    (
        "[\\\\a-zA-Z0-9_. -]{1,255}",
        any::<[u8; 16]>(),
        any::<(u32, u32, u32)>(),
        any::<i64>(),
        any::<(u32, u32)>(),
        any::<u32>(),
    )
        .prop_map(
            |(path, hash, (uncompressed_size, compressed_size, data_offset), ticks, (unique_id, compression), chain_position)| {
                FileRecord {
                    path,
                    hash,
                    reserved: 0,
                    uncompressed_size,
                    compressed_size,
                    data_offset,
                    timestamp: FileTime::from_ticks(ticks),
                    reserved2: [0; 16],
                    unique_id,
                    compression,
                    chain_position,
                }
            },
        )
}

proptest! {
    #[test]
    fn header_round_trip(header in header()) {
        let bytes = header.build().expect("build");
        prop_assert_eq!(bytes.len(), HEADER_SIZE as usize);
        prop_assert_eq!(BundleHeader::parse(&bytes).expect("parse"), header);
    }

    #[test]
    fn record_round_trip(record in record()) {
        let bytes = record.build().expect("build");
        prop_assert_eq!(bytes.len(), CHAIN_LENGTH as usize);
        let parsed = FileRecord::parse(&bytes, record.chain_position).expect("parse");
        prop_assert_eq!(parsed, record);
    }

    #[test]
    fn default_codecs_round_trip(data in prop::collection::vec(any::<u8>(), 1..4096), code in 0u32..6) {
        let registry = CompressionRegistry::with_defaults();
        let packed = registry.compress(code, &data).expect("compress");
        let unpacked = registry.decompress(code, &packed, data.len() as u32).expect("decompress");
        prop_assert_eq!(unpacked, data);
    }

    #[test]
    fn codes_past_five_are_rejected(code in 6u32..) {
        let registry = CompressionRegistry::with_defaults();
        prop_assert!(registry.lookup(code).is_err());
    }
}
