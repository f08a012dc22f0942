//! Fuzz target: `MessageFactory::add_bytes` / `next_message`
//!
//! Drives arbitrary byte sequences into the streaming frame extractor and
//! asserts that it never panics and that every message it yields passes
//! single-frame validation when re-encoded.
//!
//! cargo fuzz run fuzz_message_factory

#![no_main]

use libfuzzer_sys::fuzz_target;
use kegcore::kegboard::message::{encode_frame, KegboardMessage, KBSP_MAX_PAYLOAD_LEN};
use kegcore::kegboard::MessageFactory;

fuzz_target!(|data: &[u8]| {
    let mut factory = MessageFactory::new();

    // Split the input using its first byte so chunk boundaries get fuzzed
    // along with the content.
    let chunk_size = data.first().map_or(1, |&b| usize::from(b).max(1));
    for chunk in data.chunks(chunk_size) {
        factory.add_bytes(chunk);
    }

    while let Some(message) = factory.next_message() {
        // Any extracted message must survive re-encoding into a frame our
        // own single-frame parser accepts.
        let tags = message.tags();
        assert!(tags.iter().map(|(_, v)| 2 + v.len()).sum::<usize>() <= KBSP_MAX_PAYLOAD_LEN);
        let frame = encode_frame(message.message_type(), tags);
        let reparsed = KegboardMessage::from_frame(&frame)
            .expect("re-encoded frame must parse");
        assert_eq!(reparsed.message_type(), message.message_type());
    }
});
