use etherparse::UdpHeaderSlice;

use super::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub length: u16,
}

pub fn parse_udp(bytes: &[u8]) -> Result<UdpHeader, DecodeError> {
    let udp = UdpHeaderSlice::from_slice(bytes)?;
    Ok(UdpHeader {
        source_port: udp.source_port(),
        destination_port: udp.destination_port(),
        length: udp.length(),
    })
}
