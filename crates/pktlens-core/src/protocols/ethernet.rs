use etherparse::{EtherType, Ethernet2HeaderSlice};

use super::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetHeader {
    pub destination: String,
    pub source: String,
    pub ether_type: EtherType,
    /// Bytes occupied by the header; the payload starts here.
    pub header_len: usize,
}

pub fn parse_ethernet(bytes: &[u8]) -> Result<EthernetHeader, DecodeError> {
    let eth = Ethernet2HeaderSlice::from_slice(bytes)?;
    Ok(EthernetHeader {
        destination: format_mac(eth.destination()),
        source: format_mac(eth.source()),
        ether_type: eth.ether_type(),
        header_len: eth.slice().len(),
    })
}

/// Colon-separated lowercase hex, e.g. `00:1a:2b:3c:4d:5e`.
pub fn format_mac(mac: [u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn ether_type_name(ether_type: EtherType) -> String {
    match ether_type {
        EtherType::IPV4 => "IPv4".to_string(),
        EtherType::ARP => "ARP".to_string(),
        EtherType::IPV6 => "IPv6".to_string(),
        EtherType(other) => format!("Unknown (0x{:04x})", other),
    }
}
