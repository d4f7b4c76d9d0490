//! Fixed sizes and signatures of the classic capture format.

/// Classic signature as stored by a little-endian writer.
pub const CLASSIC_MAGIC_LE: [u8; 4] = [0xd4, 0xc3, 0xb2, 0xa1];
/// Classic signature as stored by a big-endian writer.
pub const CLASSIC_MAGIC_BE: [u8; 4] = [0xa1, 0xb2, 0xc3, 0xd4];
/// Section header block type of the next-generation format.
pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// Default ceiling for a single record's captured length.
pub const DEFAULT_MAX_RECORD_LEN: u32 = 64 * 1024;
