use etherparse::err::tcp::{HeaderError, HeaderSliceError};
use etherparse::TcpHeaderSlice;

use super::error::DecodeError;

/// Size of the fixed part of a TCP header.
pub const MIN_HEADER_LEN: usize = etherparse::TcpHeader::MIN_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    /// Declared data offset in bytes.
    pub data_offset: usize,
    pub window: u16,
    pub flags: Vec<String>,
}

impl TcpHeader {
    fn from_slice(tcp: &TcpHeaderSlice<'_>, data_offset: usize) -> Self {
        Self {
            source_port: tcp.source_port(),
            destination_port: tcp.destination_port(),
            sequence_number: tcp.sequence_number(),
            acknowledgment_number: tcp.acknowledgment_number(),
            data_offset,
            window: tcp.window_size(),
            flags: flag_labels(tcp),
        }
    }
}

/// Parse a TCP header from at least 20 bytes.
///
/// Options are neither decoded nor required: a data offset below 20 or past
/// the end of `bytes` still yields the fixed fields.
pub fn parse_tcp(bytes: &[u8]) -> Result<TcpHeader, DecodeError> {
    match TcpHeaderSlice::from_slice(bytes) {
        Ok(tcp) => Ok(TcpHeader::from_slice(&tcp, tcp.slice().len())),
        Err(HeaderSliceError::Content(HeaderError::DataOffsetTooSmall { data_offset })) => {
            parse_fixed_part(bytes, usize::from(data_offset) * 4)
        }
        Err(HeaderSliceError::Len(err)) if err.required_len > MIN_HEADER_LEN => {
            parse_fixed_part(bytes, err.required_len)
        }
        Err(HeaderSliceError::Len(err)) => Err(err.into()),
    }
}

/// Read the fixed part through a copy whose data offset is reset to 5.
fn parse_fixed_part(bytes: &[u8], data_offset: usize) -> Result<TcpHeader, DecodeError> {
    let Some(fixed) = bytes.first_chunk::<MIN_HEADER_LEN>() else {
        return Err(DecodeError::TooShort {
            needed: MIN_HEADER_LEN,
            actual: bytes.len(),
        });
    };
    let mut fixed = *fixed;
    fixed[12] = (fixed[12] & 0x0f) | 0x50;
    let tcp = TcpHeaderSlice::from_slice(&fixed).map_err(|_| DecodeError::TooShort {
        needed: MIN_HEADER_LEN,
        actual: bytes.len(),
    })?;
    Ok(TcpHeader::from_slice(&tcp, data_offset))
}

/// Labels of the set control flags, FIN first.
pub fn flag_labels(tcp: &TcpHeaderSlice<'_>) -> Vec<String> {
    [
        (tcp.fin(), "FIN"),
        (tcp.syn(), "SYN"),
        (tcp.rst(), "RST"),
        (tcp.psh(), "PSH"),
        (tcp.ack(), "ACK"),
        (tcp.urg(), "URG"),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .map(|(_, label)| label.to_string())
    .collect()
}
