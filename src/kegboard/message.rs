//! KBSP frame layout and typed message decoding.
//!
//! Wire format (KBSP v1):
//! ```text
//! ┌──────────────┬─────────┬──────────┬───────────────────┬─────────┬──────┐
//! │ "KBSP v1:"   │ type    │ paylen   │ payload           │ CRC16   │ CRLF │
//! │ 8 bytes      │ LE u16  │ LE u16   │ [tag][len][value]*│ LE u16  │ 2 B  │
//! └──────────────┴─────────┴──────────┴───────────────────┴─────────┴──────┘
//! ```
//! The CRC covers everything from the first prefix byte through the end of
//! the payload. Payloads are sequences of tag/length/value triples; unknown
//! tags are preserved so newer firmware never breaks decoding.

use crate::error::FrameError;
use crate::kegboard::crc::crc16;

pub const KBSP_PREFIX: &[u8; 8] = b"KBSP v1:";
pub const KBSP_TRAILER: &[u8; 2] = b"\r\n";

pub const KBSP_HEADER_LEN: usize = 12;
/// CRC16 plus CRLF.
pub const KBSP_TRAILER_LEN: usize = 4;
pub const KBSP_MIN_FRAME_LEN: usize = KBSP_HEADER_LEN + KBSP_TRAILER_LEN;
pub const KBSP_MAX_PAYLOAD_LEN: usize = 240;
pub const KBSP_MAX_FRAME_LEN: usize = KBSP_MIN_FRAME_LEN + KBSP_MAX_PAYLOAD_LEN;

// Message type identifiers, per the kegboard firmware.
pub const MESSAGE_TYPE_HELLO: u16 = 0x01;
pub const MESSAGE_TYPE_METER_STATUS: u16 = 0x10;
pub const MESSAGE_TYPE_TEMPERATURE: u16 = 0x11;
pub const MESSAGE_TYPE_OUTPUT_STATUS: u16 = 0x12;
pub const MESSAGE_TYPE_ONEWIRE_PRESENCE: u16 = 0x13;
pub const MESSAGE_TYPE_AUTH_TOKEN: u16 = 0x14;
// Host-originated commands.
pub const MESSAGE_TYPE_PING: u16 = 0x81;
pub const MESSAGE_TYPE_SET_OUTPUT: u16 = 0x84;

// ───────────────────────────────────────────────────────────────
// Tag map
// ───────────────────────────────────────────────────────────────

/// Insertion-ordered mapping from tag id to raw value bytes.
///
/// Inserting an existing tag replaces its value in place, preserving the
/// original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    entries: Vec<(u8, Vec<u8>)>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: u8, value: Vec<u8>) {
        if let Some(entry) = self.entries.iter_mut().find(|(t, _)| *t == tag) {
            entry.1 = value;
        } else {
            self.entries.push((tag, value));
        }
    }

    pub fn get(&self, tag: u8) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_slice())
    }

    /// Tag value as little-endian `u32`; `None` unless exactly 4 bytes.
    pub fn read_u32_le(&self, tag: u8) -> Option<u32> {
        let v = self.get(tag)?;
        let bytes: [u8; 4] = v.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    /// Tag value as little-endian `i32`; `None` unless exactly 4 bytes.
    pub fn read_i32_le(&self, tag: u8) -> Option<i32> {
        self.read_u32_le(tag).map(|v| v as i32)
    }

    /// Tag value as little-endian `u16`; `None` unless exactly 2 bytes.
    pub fn read_u16_le(&self, tag: u8) -> Option<u16> {
        let v = self.get(tag)?;
        let bytes: [u8; 2] = v.try_into().ok()?;
        Some(u16::from_le_bytes(bytes))
    }

    /// Tag value as a string, truncated at the first NUL byte.
    pub fn read_str(&self, tag: u8) -> Option<String> {
        let v = self.get(tag)?;
        let end = v.iter().position(|&b| b == 0).unwrap_or(v.len());
        Some(String::from_utf8_lossy(&v[..end]).into_owned())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.entries.iter().map(|(t, v)| (*t, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a tag/length/value payload. A truncated final triple is
    /// skipped, matching controller behavior for padded payloads.
    fn parse(payload: &[u8]) -> Self {
        let mut tags = Self::new();
        let mut i = 0;
        while i + 2 <= payload.len() {
            let tag = payload[i];
            let len = payload[i + 1] as usize;
            i += 2;
            if i + len <= payload.len() {
                tags.insert(tag, payload[i..i + len].to_vec());
            }
            i += len;
        }
        tags
    }

    fn encoded_len(&self) -> usize {
        self.entries.iter().map(|(_, v)| 2 + v.len()).sum()
    }
}

// ───────────────────────────────────────────────────────────────
// Message kinds
// ───────────────────────────────────────────────────────────────

/// One decoded, validated KBSP frame.
///
/// Closed union over the known message kinds; unrecognized type identifiers
/// decode into [`KegboardMessage::Unknown`] with the full tag map intact.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum KegboardMessage {
    Hello(HelloMessage),
    MeterStatus(MeterStatusMessage),
    TemperatureReading(TemperatureMessage),
    OutputStatus(GenericMessage),
    OnewirePresence(GenericMessage),
    AuthToken(AuthTokenMessage),
    Unknown(GenericMessage),
}

/// Controller boot/identity report.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    pub tags: TagMap,
}

impl HelloMessage {
    const TAG_FIRMWARE_VERSION: u8 = 0x01;
    const TAG_PROTOCOL_VERSION: u8 = 0x02;
    const TAG_SERIAL_NUMBER: u8 = 0x03;
    const TAG_UPTIME_MILLIS: u8 = 0x04;
    const TAG_UPTIME_DAYS: u8 = 0x05;

    pub fn firmware_version(&self) -> Option<u16> {
        self.tags.read_u16_le(Self::TAG_FIRMWARE_VERSION)
    }

    pub fn protocol_version(&self) -> Option<u16> {
        self.tags.read_u16_le(Self::TAG_PROTOCOL_VERSION)
    }

    pub fn serial_number(&self) -> String {
        self.tags.read_str(Self::TAG_SERIAL_NUMBER).unwrap_or_default()
    }

    pub fn uptime_millis(&self) -> Option<u32> {
        self.tags.read_u32_le(Self::TAG_UPTIME_MILLIS)
    }

    pub fn uptime_days(&self) -> Option<u32> {
        self.tags.read_u32_le(Self::TAG_UPTIME_DAYS)
    }
}

/// Cumulative meter reading for one named flow sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterStatusMessage {
    pub tags: TagMap,
    /// Meter identity, e.g. `kegboard.flow0`. Empty if the tag was absent.
    pub meter_name: String,
    /// Raw cumulative tick counter as reported by the controller.
    pub reading: u32,
}

pub const TAG_METER_NAME: u8 = 0x01;
pub const TAG_METER_READING: u8 = 0x02;

/// Temperature sample from a named onewire sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureMessage {
    pub tags: TagMap,
    pub sensor_name: String,
    /// Degrees Celsius (wire value is signed micro-degrees).
    pub temp_c: f64,
}

const TAG_SENSOR_NAME: u8 = 0x01;
const TAG_SENSOR_VALUE: u8 = 0x02;

/// Presence or removal of an authentication token at a reader.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthTokenMessage {
    pub tags: TagMap,
    /// Reader name; the bare controller name `onewire` is normalized to
    /// `core.onewire`.
    pub device_name: String,
    /// Token id as lowercase hex, byte order reversed from the wire.
    pub token: String,
    pub status: TokenStatus,
}

const TAG_DEVICE_NAME: u8 = 0x01;
const TAG_TOKEN: u8 = 0x02;
const TAG_STATUS: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Removed,
    Present,
    Unknown,
}

/// A validated frame with no kind-specific decoding (output status,
/// onewire presence, and unrecognized message types).
#[derive(Debug, Clone, PartialEq)]
pub struct GenericMessage {
    pub message_type: u16,
    pub tags: TagMap,
}

impl KegboardMessage {
    /// Wire message-type identifier.
    pub fn message_type(&self) -> u16 {
        match self {
            Self::Hello(_) => MESSAGE_TYPE_HELLO,
            Self::MeterStatus(_) => MESSAGE_TYPE_METER_STATUS,
            Self::TemperatureReading(_) => MESSAGE_TYPE_TEMPERATURE,
            Self::OutputStatus(_) => MESSAGE_TYPE_OUTPUT_STATUS,
            Self::OnewirePresence(_) => MESSAGE_TYPE_ONEWIRE_PRESENCE,
            Self::AuthToken(_) => MESSAGE_TYPE_AUTH_TOKEN,
            Self::Unknown(m) => m.message_type,
        }
    }

    /// Shared tag map, regardless of kind.
    pub fn tags(&self) -> &TagMap {
        match self {
            Self::Hello(m) => &m.tags,
            Self::MeterStatus(m) => &m.tags,
            Self::TemperatureReading(m) => &m.tags,
            Self::OutputStatus(m) | Self::OnewirePresence(m) | Self::Unknown(m) => &m.tags,
            Self::AuthToken(m) => &m.tags,
        }
    }

    /// Parse and validate one complete frame.
    ///
    /// `frame` must span exactly one frame (header through trailer); the
    /// streaming factory guarantees this. Structural or CRC failures return
    /// the precise [`FrameError`] so the factory can count and skip.
    pub fn from_frame(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < KBSP_MIN_FRAME_LEN {
            return Err(FrameError::TooShort);
        }
        let payload_len = u16::from_le_bytes([frame[10], frame[11]]) as usize;
        if payload_len > KBSP_MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong);
        }
        let total = KBSP_HEADER_LEN + payload_len + KBSP_TRAILER_LEN;
        if frame.len() != total {
            return Err(FrameError::TooShort);
        }

        let payload_end = KBSP_HEADER_LEN + payload_len;
        if &frame[payload_end + 2..payload_end + 4] != KBSP_TRAILER {
            return Err(FrameError::BadTrailer);
        }

        let expected = crc16(&frame[..payload_end]);
        let computed = u16::from_le_bytes([frame[payload_end], frame[payload_end + 1]]);
        if expected != computed {
            return Err(FrameError::BadCrc { expected, computed });
        }

        let message_type = u16::from_le_bytes([frame[8], frame[9]]);
        let tags = TagMap::parse(&frame[KBSP_HEADER_LEN..payload_end]);
        Ok(Self::from_parts(message_type, tags))
    }

    fn from_parts(message_type: u16, tags: TagMap) -> Self {
        match message_type {
            MESSAGE_TYPE_HELLO => Self::Hello(HelloMessage { tags }),
            MESSAGE_TYPE_METER_STATUS => {
                let meter_name = tags.read_str(TAG_METER_NAME).unwrap_or_default();
                let reading = tags.read_u32_le(TAG_METER_READING).unwrap_or(0);
                Self::MeterStatus(MeterStatusMessage {
                    tags,
                    meter_name,
                    reading,
                })
            }
            MESSAGE_TYPE_TEMPERATURE => {
                let sensor_name = tags.read_str(TAG_SENSOR_NAME).unwrap_or_default();
                let temp_c = tags
                    .read_i32_le(TAG_SENSOR_VALUE)
                    .map_or(0.0, |raw| f64::from(raw) / 1e6);
                Self::TemperatureReading(TemperatureMessage {
                    tags,
                    sensor_name,
                    temp_c,
                })
            }
            MESSAGE_TYPE_AUTH_TOKEN => {
                let raw_name = tags.read_str(TAG_DEVICE_NAME).unwrap_or_default();
                let device_name = if raw_name == "onewire" {
                    "core.onewire".to_owned()
                } else {
                    raw_name
                };
                let token = tags.get(TAG_TOKEN).map_or_else(String::new, |bytes| {
                    bytes.iter().rev().map(|b| format!("{b:02x}")).collect()
                });
                let status = match tags.get(TAG_STATUS) {
                    Some([1, ..]) => TokenStatus::Present,
                    Some([_, ..]) => TokenStatus::Removed,
                    _ => TokenStatus::Unknown,
                };
                Self::AuthToken(AuthTokenMessage {
                    tags,
                    device_name,
                    token,
                    status,
                })
            }
            MESSAGE_TYPE_OUTPUT_STATUS => Self::OutputStatus(GenericMessage { message_type, tags }),
            MESSAGE_TYPE_ONEWIRE_PRESENCE => {
                Self::OnewirePresence(GenericMessage { message_type, tags })
            }
            _ => Self::Unknown(GenericMessage { message_type, tags }),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Outbound encoding
// ───────────────────────────────────────────────────────────────

/// Encode one outbound frame: header, tag/length/value payload, CRC16
/// (little-endian), CRLF trailer.
///
/// Tags that would push the payload past the 240-byte cap are dropped with
/// a warning; earlier tags still go out.
pub fn encode_frame(message_type: u16, tags: &TagMap) -> Vec<u8> {
    let mut payload = Vec::with_capacity(tags.encoded_len().min(KBSP_MAX_PAYLOAD_LEN));
    for (tag, value) in tags.iter() {
        if payload.len() + 2 + value.len() > KBSP_MAX_PAYLOAD_LEN || value.len() > u8::MAX as usize
        {
            log::warn!("dropping oversized tag {tag:#04x} from outbound frame");
            continue;
        }
        payload.push(tag);
        payload.push(value.len() as u8);
        payload.extend_from_slice(value);
    }

    let mut frame = Vec::with_capacity(KBSP_HEADER_LEN + payload.len() + KBSP_TRAILER_LEN);
    frame.extend_from_slice(KBSP_PREFIX);
    frame.extend_from_slice(&message_type.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(KBSP_TRAILER);
    frame
}

/// Keepalive probe sent to the controller.
pub fn ping_command() -> Vec<u8> {
    encode_frame(MESSAGE_TYPE_PING, &TagMap::new())
}

const TAG_OUTPUT_ID: u8 = 0x01;
const TAG_OUTPUT_MODE: u8 = 0x02;

/// Command a controller relay output on or off.
pub fn set_output_command(output_id: u8, enabled: bool) -> Vec<u8> {
    let mut tags = TagMap::new();
    tags.insert(TAG_OUTPUT_ID, vec![output_id & 0x0f]);
    tags.insert(TAG_OUTPUT_MODE, vec![u8::from(enabled), 0]);
    encode_frame(MESSAGE_TYPE_SET_OUTPUT, &tags)
}
