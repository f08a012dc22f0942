//! Unified error types for the kegcore crate.
//!
//! A single crate-level `Error` enum that every subsystem converts into,
//! keeping error handling uniform at the orchestrator. Subsystem errors
//! (frame decoding, accounting) have their own typed enums and `From`
//! conversions, so callers close to the failure can still match on the
//! precise condition.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A referenced tap, keg, or user does not exist.
    NotFound(String),
    /// A caller-supplied argument is invalid (e.g. duplicate tap meter name).
    InvalidArgument(String),
    /// A frame failed CRC or structural validation. Recovered locally by
    /// the decoder; surfaces here only from explicit single-frame parses.
    MalformedFrame(FrameError),
    /// The accounting backend is unreachable; the triggering record is
    /// queued through the pending store instead of being lost.
    BackendUnavailable(String),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::MalformedFrame(e) => write!(f, "malformed frame: {e}"),
            Self::BackendUnavailable(msg) => write!(f, "backend unavailable: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Frame decode errors
// ---------------------------------------------------------------------------

/// Why a single frame failed to decode. The streaming factory skips the
/// frame and counts the error; these never abort the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Frame shorter than the minimum 16 bytes.
    TooShort,
    /// Declared payload length exceeds the 240-byte maximum.
    PayloadTooLong,
    /// Computed CRC16 does not match the frame trailer.
    BadCrc { expected: u16, computed: u16 },
    /// The two trailer bytes are not CRLF.
    BadTrailer,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "frame too short"),
            Self::PayloadTooLong => write!(f, "payload too long"),
            Self::BadCrc { expected, computed } => {
                write!(f, "bad CRC: expected=0x{expected:04x} computed=0x{computed:04x}")
            }
            Self::BadTrailer => write!(f, "bad trailer"),
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::MalformedFrame(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
