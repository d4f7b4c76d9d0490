use etherparse::{Icmpv4Header, Icmpv4Slice};

use super::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
}

/// Parse the type and code of an ICMP message of at least 8 bytes.
///
/// Timestamp messages whose length is not exactly 20 bytes are still
/// accepted; their type and code are taken from the first two bytes.
pub fn parse_icmp(bytes: &[u8]) -> Result<IcmpHeader, DecodeError> {
    match Icmpv4Slice::from_slice(bytes) {
        Ok(icmp) => Ok(IcmpHeader {
            icmp_type: icmp.type_u8(),
            code: icmp.code_u8(),
        }),
        Err(err) if bytes.len() >= Icmpv4Header::MIN_LEN => {
            tracing::trace!(%err, "icmp message length mismatch");
            Ok(IcmpHeader {
                icmp_type: bytes[0],
                code: bytes[1],
            })
        }
        Err(err) => Err(err.into()),
    }
}

pub fn icmp_type_name(icmp_type: u8) -> String {
    match icmp_type {
        0 => "Echo Reply".to_string(),
        3 => "Destination Unreachable".to_string(),
        5 => "Redirect".to_string(),
        8 => "Echo Request".to_string(),
        11 => "Time Exceeded".to_string(),
        other => format!("Type {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::{icmp_type_name, parse_icmp};

    #[test]
    fn parses_type_and_code() {
        let header = parse_icmp(&[3, 1, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(header.icmp_type, 3);
        assert_eq!(header.code, 1);
    }

    #[test]
    fn names_common_types() {
        assert_eq!(icmp_type_name(8), "Echo Request");
        assert_eq!(icmp_type_name(0), "Echo Reply");
        assert_eq!(icmp_type_name(3), "Destination Unreachable");
        assert_eq!(icmp_type_name(42), "Type 42");
    }

    #[test]
    fn timestamp_with_trailing_bytes_keeps_type_and_code() {
        let mut message = vec![13, 0, 0, 0, 0, 0, 0, 0];
        message.extend_from_slice(&[0; 16]);
        let header = parse_icmp(&message).unwrap();
        assert_eq!(header.icmp_type, 13);
        assert_eq!(header.code, 0);
    }

    #[test]
    fn short_message_fails() {
        assert!(parse_icmp(&[8, 0, 0]).is_err());
    }
}
