use etherparse::err::ipv4::{HeaderError, HeaderSliceError};
use etherparse::{IpNumber, Ipv4HeaderSlice};

use super::error::DecodeError;

/// Size of the fixed part of an IPv4 header.
pub const MIN_HEADER_LEN: usize = etherparse::Ipv4Header::MIN_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    /// Declared header length in bytes (IHL × 4).
    pub header_len: usize,
    pub total_length: u16,
    pub ttl: u8,
    pub protocol: IpNumber,
    pub source: String,
    pub destination: String,
}

impl Ipv4Header {
    fn from_slice(ip: &Ipv4HeaderSlice<'_>, header_len: usize) -> Self {
        Self {
            version: ip.version(),
            header_len,
            total_length: ip.total_len(),
            ttl: ip.ttl(),
            protocol: ip.protocol(),
            source: ip.source_addr().to_string(),
            destination: ip.destination_addr().to_string(),
        }
    }

    /// Whether the declared header length can be used to locate the payload.
    pub fn has_valid_header_len(&self) -> bool {
        self.header_len >= MIN_HEADER_LEN
    }
}

/// Parse an IPv4 header; options are skipped, not decoded.
///
/// Only the fixed 20 bytes are required. A declared header length below 20
/// or past the end of `bytes` still yields the fixed fields, with
/// `header_len` reporting the declared value. `total_length` is never
/// checked against the bytes at hand.
pub fn parse_ipv4(bytes: &[u8]) -> Result<Ipv4Header, DecodeError> {
    match Ipv4HeaderSlice::from_slice(bytes) {
        Ok(ip) => Ok(Ipv4Header::from_slice(&ip, ip.slice().len())),
        Err(HeaderSliceError::Content(HeaderError::UnexpectedVersion { version_number })) => {
            Err(DecodeError::UnsupportedVersion {
                version: version_number,
            })
        }
        Err(HeaderSliceError::Content(HeaderError::HeaderLengthSmallerThanHeader { ihl })) => {
            parse_fixed_part(bytes, usize::from(ihl) * 4)
        }
        Err(HeaderSliceError::Len(err)) if err.required_len > MIN_HEADER_LEN => {
            parse_fixed_part(bytes, err.required_len)
        }
        Err(HeaderSliceError::Len(err)) => Err(err.into()),
    }
}

/// Read the fixed part through a copy whose IHL is reset to 5.
fn parse_fixed_part(bytes: &[u8], header_len: usize) -> Result<Ipv4Header, DecodeError> {
    let Some(fixed) = bytes.first_chunk::<MIN_HEADER_LEN>() else {
        return Err(DecodeError::TooShort {
            needed: MIN_HEADER_LEN,
            actual: bytes.len(),
        });
    };
    let mut fixed = *fixed;
    fixed[0] = (fixed[0] & 0xf0) | 0x05;
    let ip = Ipv4HeaderSlice::from_slice(&fixed).map_err(|_| DecodeError::TooShort {
        needed: MIN_HEADER_LEN,
        actual: bytes.len(),
    })?;
    Ok(Ipv4Header::from_slice(&ip, header_len))
}

pub fn ip_protocol_name(protocol: IpNumber) -> String {
    match protocol {
        IpNumber::ICMP => "ICMP".to_string(),
        IpNumber::TCP => "TCP".to_string(),
        IpNumber::UDP => "UDP".to_string(),
        IpNumber(other) => format!("Unknown ({})", other),
    }
}

#[cfg(test)]
mod tests {
    use super::{ip_protocol_name, parse_ipv4};
    use crate::protocols::error::DecodeError;
    use etherparse::IpNumber;

    fn header(version_ihl: u8, protocol: u8) -> Vec<u8> {
        let mut bytes = vec![version_ihl, 0, 0, 40, 0x12, 0x34, 0x40, 0, 64, protocol, 0, 0];
        bytes.extend_from_slice(&[10, 0, 0, 1]);
        bytes.extend_from_slice(&[8, 8, 8, 8]);
        bytes
    }

    #[test]
    fn parses_fixed_header() {
        let parsed = parse_ipv4(&header(0x45, 17)).unwrap();
        assert_eq!(parsed.version, 4);
        assert_eq!(parsed.header_len, 20);
        assert_eq!(parsed.total_length, 40);
        assert_eq!(parsed.ttl, 64);
        assert_eq!(parsed.protocol, IpNumber::UDP);
        assert_eq!(parsed.source, "10.0.0.1");
        assert_eq!(parsed.destination, "8.8.8.8");
        assert!(parsed.has_valid_header_len());
    }

    #[test]
    fn reports_options_length() {
        let mut bytes = header(0x46, 6);
        bytes.extend_from_slice(&[1, 1, 1, 0]);
        let parsed = parse_ipv4(&bytes).unwrap();
        assert_eq!(parsed.header_len, 24);
    }

    #[test]
    fn options_past_the_end_keep_fixed_fields() {
        let parsed = parse_ipv4(&header(0x46, 6)).unwrap();
        assert_eq!(parsed.header_len, 24);
        assert_eq!(parsed.protocol, IpNumber::TCP);
        assert_eq!(parsed.destination, "8.8.8.8");
    }

    #[test]
    fn total_length_is_not_checked() {
        let mut bytes = header(0x45, 17);
        bytes[2..4].copy_from_slice(&1500u16.to_be_bytes());
        let parsed = parse_ipv4(&bytes).unwrap();
        assert_eq!(parsed.total_length, 1500);
    }

    #[test]
    fn rejects_other_versions() {
        let err = parse_ipv4(&header(0x65, 6)).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedVersion { version: 6 });
    }

    #[test]
    fn flags_bogus_header_length() {
        let parsed = parse_ipv4(&header(0x42, 6)).unwrap();
        assert_eq!(parsed.header_len, 8);
        assert_eq!(parsed.source, "10.0.0.1");
        assert!(!parsed.has_valid_header_len());
    }

    #[test]
    fn short_packet_fails() {
        assert_eq!(
            parse_ipv4(&header(0x45, 6)[..19]),
            Err(DecodeError::TooShort {
                needed: 20,
                actual: 19
            })
        );
    }

    #[test]
    fn names_protocols() {
        assert_eq!(ip_protocol_name(IpNumber::TCP), "TCP");
        assert_eq!(ip_protocol_name(IpNumber(47)), "Unknown (47)");
    }
}
