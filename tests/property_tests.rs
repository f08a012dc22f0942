//! Property-based tests for the wire layer.

use proptest::prelude::*;

use kegcore::kegboard::crc::crc16;
use kegcore::kegboard::message::{encode_frame, TagMap, MESSAGE_TYPE_METER_STATUS};
use kegcore::kegboard::{KegboardMessage, MessageFactory};

fn meter_frame(meter: &str, reading: u32) -> Vec<u8> {
    let mut tags = TagMap::new();
    tags.insert(0x01, meter.as_bytes().to_vec());
    tags.insert(0x02, reading.to_le_bytes().to_vec());
    encode_frame(MESSAGE_TYPE_METER_STATUS, &tags)
}

fn readings(messages: &[KegboardMessage]) -> Vec<u32> {
    messages
        .iter()
        .filter_map(|m| match m {
            KegboardMessage::MeterStatus(s) => Some(s.reading),
            _ => None,
        })
        .collect()
}

proptest! {
    /// Splitting the stream at arbitrary points never changes the decoded
    /// messages.
    #[test]
    fn chunking_is_invariant(
        values in prop::collection::vec(any::<u32>(), 1..16),
        chunk_size in 1usize..128,
    ) {
        let mut stream = Vec::new();
        for &v in &values {
            stream.extend_from_slice(&meter_frame("kegboard.flow0", v));
        }

        let mut whole = MessageFactory::new();
        whole.add_bytes(&stream);
        let expected = readings(&whole.drain_messages());
        prop_assert_eq!(&expected, &values);

        let mut chunked = MessageFactory::new();
        for chunk in stream.chunks(chunk_size) {
            chunked.add_bytes(chunk);
        }
        prop_assert_eq!(readings(&chunked.drain_messages()), expected);
    }

    /// Garbage before, between, and after frames is discarded without
    /// affecting the frames themselves.
    #[test]
    fn interleaved_garbage_is_tolerated(
        values in prop::collection::vec(any::<u32>(), 1..8),
        garbage in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        // Keep the noise free of frame prefixes so it cannot masquerade as
        // a new frame start.
        let noise: Vec<u8> = garbage.iter().map(|&b| if b == b'K' { b'k' } else { b }).collect();

        let mut stream = noise.clone();
        for &v in &values {
            stream.extend_from_slice(&meter_frame("kegboard.flow0", v));
            stream.extend_from_slice(&noise);
        }

        let mut factory = MessageFactory::new();
        factory.add_bytes(&stream);
        prop_assert_eq!(readings(&factory.drain_messages()), values);
    }

    /// A single flipped byte in one frame loses at most that frame.
    #[test]
    fn single_corruption_loses_at_most_one_frame(
        flip_at_fraction in 0.0f64..1.0,
        flip_mask in 1u8..=255,
    ) {
        let good_a = meter_frame("kegboard.flow0", 1);
        let mut bad = meter_frame("kegboard.flow0", 2);
        let good_b = meter_frame("kegboard.flow0", 3);

        let mut idx = ((bad.len() - 1) as f64 * flip_at_fraction) as usize;
        // Skip the payload-length field; a corrupted declared length can
        // swallow bytes of the following frame.
        if idx == 10 || idx == 11 {
            idx = 12;
        }
        bad[idx] ^= flip_mask;

        let mut factory = MessageFactory::new();
        factory.add_bytes(&good_a);
        factory.add_bytes(&bad);
        factory.add_bytes(&good_b);
        let out = readings(&factory.drain_messages());

        prop_assert!(out.contains(&1));
        prop_assert!(out.contains(&3));
        prop_assert!(out.len() <= 3);
    }

    /// The factory never panics, whatever bytes arrive.
    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let mut factory = MessageFactory::new();
        factory.add_bytes(&data);
        let _ = factory.drain_messages();
    }

    /// CRC is deterministic and sensitive to any single-byte change.
    #[test]
    fn crc_detects_single_byte_changes(
        data in prop::collection::vec(any::<u8>(), 1..256),
        idx_fraction in 0.0f64..1.0,
        mask in 1u8..=255,
    ) {
        let base = crc16(&data);
        prop_assert_eq!(base, crc16(&data));

        let idx = ((data.len() - 1) as f64 * idx_fraction) as usize;
        let mut changed = data.clone();
        changed[idx] ^= mask;
        prop_assert_ne!(base, crc16(&changed));
    }
}
