//! CCITT-variant CRC16 used by the kegboard serial protocol (KBSP).
//!
//! Table-driven: one entry per byte value, derived at compile time from the
//! bitwise update function. The conformance anchor is the protocol's
//! reference vector `{0x01, 0x02, 0x03, 0x04} → 0xC54F`.

/// One-byte bitwise CRC step. Used only to derive the lookup table.
const fn crc16_update(crc: u16, byte: u8) -> u16 {
    let mut bval = (byte ^ (crc as u8)) as u16;
    bval ^= (bval << 4) & 0xff;
    let mut result = (bval << 8) | (crc >> 8);
    result ^= bval >> 4;
    result ^= bval << 3;
    result
}

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = crc16_update(0, i as u8);
        i += 1;
    }
    table
}

static TABLE: [u16; 256] = build_table();

/// CRC16 of `bytes`, initial value 0.
pub fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |crc, &b| {
        (crc >> 8) ^ TABLE[((crc ^ u16::from(b)) & 0xff) as usize]
    })
}
