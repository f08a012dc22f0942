//! Streaming frame extractor.
//!
//! Accepts the serial byte stream in arbitrary chunks, realigns on the KBSP
//! prefix, and yields validated [`KegboardMessage`]s. Garbage between frames
//! (line noise, boot banners, torn frames) is discarded without losing the
//! frames around it; the split points of incoming chunks never affect which
//! messages come out.

use heapless::Vec as HVec;

use crate::error::FrameError;
use crate::kegboard::message::{
    KegboardMessage, KBSP_HEADER_LEN, KBSP_MAX_PAYLOAD_LEN, KBSP_PREFIX, KBSP_TRAILER_LEN,
};

/// Buffer capacity. Several max-size frames plus slack for noise bursts.
const BUFFER_CAPACITY: usize = 2048;

/// Incremental KBSP frame assembler.
///
/// Single-owner; the reader task feeds [`add_bytes`](Self::add_bytes) and
/// drains messages. Not internally synchronized.
#[derive(Default)]
pub struct MessageFactory {
    buffer: HVec<u8, BUFFER_CAPACITY>,
    crc_errors: u64,
    framing_errors: u64,
}

impl MessageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the byte source.
    ///
    /// If the buffer would overflow, the oldest bytes are discarded first.
    /// That only happens when the stream has produced more than
    /// `BUFFER_CAPACITY` bytes of unparseable data, so nothing of value is
    /// lost.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.buffer.is_full() {
                log::warn!("frame buffer overflow, discarding oldest data");
                self.compact(self.buffer.len() / 2);
                self.framing_errors += 1;
            }
            // Cannot fail after compact.
            let _ = self.buffer.push(b);
        }
    }

    /// Extract the next complete, valid message, or `None` if the buffer
    /// does not yet hold one. Invalid frames are counted, logged, and
    /// skipped; extraction continues with the bytes after them.
    pub fn next_message(&mut self) -> Option<KegboardMessage> {
        loop {
            self.align_to_prefix();

            if self.buffer.len() < KBSP_HEADER_LEN {
                return None;
            }

            let payload_len =
                u16::from_le_bytes([self.buffer[10], self.buffer[11]]) as usize;
            if payload_len > KBSP_MAX_PAYLOAD_LEN {
                // Header is unusable; drop it and resync on the next prefix.
                log::warn!("oversized payload length {payload_len}, resyncing");
                self.framing_errors += 1;
                self.compact(KBSP_HEADER_LEN);
                continue;
            }

            let total = KBSP_HEADER_LEN + payload_len + KBSP_TRAILER_LEN;
            if self.buffer.len() < total {
                return None;
            }

            let result = KegboardMessage::from_frame(&self.buffer[..total]);
            match result {
                Ok(message) => {
                    self.compact(total);
                    return Some(message);
                }
                Err(FrameError::BadCrc { expected, computed }) => {
                    log::warn!(
                        "CRC mismatch (expected {expected:#06x}, got {computed:#06x}), skipping frame"
                    );
                    self.crc_errors += 1;
                    self.compact(total);
                }
                Err(err) => {
                    log::warn!("malformed frame ({err}), resyncing");
                    self.framing_errors += 1;
                    // Skip just the prefix so a real frame that begins
                    // inside the bad region can still be found.
                    self.compact(KBSP_PREFIX.len());
                }
            }
        }
    }

    /// Drain every complete message currently buffered.
    pub fn drain_messages(&mut self) -> Vec<KegboardMessage> {
        let mut out = Vec::new();
        while let Some(m) = self.next_message() {
            out.push(m);
        }
        out
    }

    /// Frames dropped for CRC mismatch since construction.
    pub fn crc_error_count(&self) -> u64 {
        self.crc_errors
    }

    /// Resyncs and discards for structural reasons since construction.
    pub fn framing_error_count(&self) -> u64 {
        self.framing_errors
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discard leading bytes until the buffer starts with the KBSP prefix,
    /// or with a proper prefix of it at the tail (a frame may still be
    /// arriving).
    fn align_to_prefix(&mut self) {
        let mut start = 0;
        'scan: while start < self.buffer.len() {
            let avail = self.buffer.len() - start;
            let check = avail.min(KBSP_PREFIX.len());
            for i in 0..check {
                if self.buffer[start + i] != KBSP_PREFIX[i] {
                    start += 1;
                    continue 'scan;
                }
            }
            break;
        }
        if start > 0 {
            self.compact(start);
        }
    }

    /// Drop the first `n` buffered bytes.
    fn compact(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        let remaining = self.buffer.len() - n;
        for i in 0..remaining {
            self.buffer[i] = self.buffer[i + n];
        }
        self.buffer.truncate(remaining);
    }
}
