use pcap_parser::nom;
use pcap_parser::{Linktype, PcapHeader, parse_pcap_header};
use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use super::layout;

/// Byte order of every multi-byte field in a classic capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    Little,
    Big,
}

/// Format tag assigned to an uploaded byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Classic capture file in the given byte order.
    Classic(ByteOrder),
    /// Next-generation capture file (recognized, not decoded).
    NextGen,
    Invalid,
}

impl CaptureFormat {
    /// Whether the signature is one this system accepts for upload.
    pub fn is_accepted(self) -> bool {
        !matches!(self, CaptureFormat::Invalid)
    }

    /// Whether records can be walked and decoded from this format.
    pub fn is_decodable(self) -> bool {
        matches!(self, CaptureFormat::Classic(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            CaptureFormat::Classic(_) => "pcap",
            CaptureFormat::NextGen => "pcapng",
            CaptureFormat::Invalid => "invalid",
        }
    }
}

/// Tag a byte sequence by its leading signature.
///
/// # Examples
/// ```
/// use pktlens_core::{ByteOrder, CaptureFormat, detect_format};
///
/// let bytes = [0xd4, 0xc3, 0xb2, 0xa1, 0x02, 0x00];
/// assert_eq!(detect_format(&bytes), CaptureFormat::Classic(ByteOrder::Little));
/// assert_eq!(detect_format(b"nope"), CaptureFormat::Invalid);
/// ```
pub fn detect_format(bytes: &[u8]) -> CaptureFormat {
    let Some(magic) = bytes.first_chunk::<4>() else {
        return CaptureFormat::Invalid;
    };
    match *magic {
        layout::CLASSIC_MAGIC_LE => CaptureFormat::Classic(ByteOrder::Little),
        layout::CLASSIC_MAGIC_BE => CaptureFormat::Classic(ByteOrder::Big),
        layout::PCAPNG_MAGIC => CaptureFormat::NextGen,
        _ => CaptureFormat::Invalid,
    }
}

/// File-level header of a classic capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalHeader {
    pub byte_order: ByteOrder,
    pub version_major: u16,
    pub version_minor: u16,
    pub this_zone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub link_type: Linktype,
}

impl GlobalHeader {
    pub fn is_ethernet(&self) -> bool {
        self.link_type == Linktype::ETHERNET
    }
}

/// Serializable view of [`GlobalHeader`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub byte_order: ByteOrder,
    pub version: String,
    pub snaplen: u32,
    pub link_type: i32,
}

impl From<&GlobalHeader> for HeaderInfo {
    fn from(header: &GlobalHeader) -> Self {
        Self {
            byte_order: header.byte_order,
            version: format!("{}.{}", header.version_major, header.version_minor),
            snaplen: header.snaplen,
            link_type: header.link_type.0,
        }
    }
}

impl From<PcapHeader> for GlobalHeader {
    fn from(header: PcapHeader) -> Self {
        Self {
            byte_order: if header.is_bigendian() {
                ByteOrder::Big
            } else {
                ByteOrder::Little
            },
            version_major: header.version_major,
            version_minor: header.version_minor,
            this_zone: header.thiszone,
            sigfigs: header.sigfigs,
            snaplen: header.snaplen,
            link_type: header.network,
        }
    }
}

/// Parse the 24-byte global header of a classic capture.
///
/// Only the microsecond signature is accepted, in either byte order.
///
/// # Errors
/// `InvalidFormat` when the signature is not a classic one, `TruncatedHeader`
/// when fewer than 24 bytes are available.
pub fn parse_global_header(bytes: &[u8]) -> Result<GlobalHeader, CaptureError> {
    if !matches!(detect_format(bytes), CaptureFormat::Classic(_)) {
        return Err(CaptureError::invalid_format(bytes));
    }

    match parse_pcap_header(bytes) {
        Ok((_, header)) => Ok(GlobalHeader::from(header)),
        Err(nom::Err::Incomplete(_)) => Err(CaptureError::TruncatedHeader {
            needed: layout::GLOBAL_HEADER_LEN,
            actual: bytes.len(),
        }),
        Err(_) => Err(CaptureError::invalid_format(bytes)),
    }
}
