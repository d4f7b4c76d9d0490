//! Layer chain: Ethernet → IPv4 → TCP/UDP/ICMP.
//!
//! Decoding stops at the first header that does not fit or the first
//! discriminator that is not recognized. Whatever was decoded up to that
//! point is kept; nothing here returns an error.

use std::collections::BTreeMap;

use etherparse::{EtherType, IpNumber};

use crate::config::{EngineConfig, Transport};
use crate::protocols::ethernet::{ether_type_name, parse_ethernet};
use crate::protocols::icmp::{icmp_type_name, parse_icmp};
use crate::protocols::ipv4::{ip_protocol_name, parse_ipv4};
use crate::protocols::tcp::parse_tcp;
use crate::protocols::udp::parse_udp;
use crate::source::RawRecord;
use crate::{FieldValue, PacketRecord, ProtocolLayer, Timestamp, UNKNOWN_PROTOCOL};

#[derive(Debug, Default)]
struct LayerStack {
    layers: Vec<ProtocolLayer>,
    tags: Vec<String>,
    source_address: Option<String>,
    destination_address: Option<String>,
    source_port: Option<u16>,
    destination_port: Option<u16>,
    detail: Option<String>,
}

impl LayerStack {
    fn push(&mut self, name: &str, fields: Vec<(&str, FieldValue)>) {
        self.layers.push(ProtocolLayer {
            name: name.to_string(),
            fields: fields
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect::<BTreeMap<_, _>>(),
        });
    }

    fn set_addresses(&mut self, source: &str, destination: &str) {
        self.source_address = Some(source.to_string());
        self.destination_address = Some(destination.to_string());
    }

    fn set_ports(&mut self, source: u16, destination: u16) {
        self.source_port = Some(source);
        self.destination_port = Some(destination);
    }

    fn primary(&self) -> String {
        self.layers
            .last()
            .map(|layer| layer.name.clone())
            .unwrap_or_else(|| UNKNOWN_PROTOCOL.to_string())
    }

    fn summary(&self, primary: &str, captured_len: u32) -> String {
        let (Some(source), Some(destination)) = (&self.source_address, &self.destination_address)
        else {
            return format!("{} bytes [{}]", captured_len, primary);
        };
        let mut line = format!(
            "{} → {} [{}]",
            endpoint(source, self.source_port),
            endpoint(destination, self.destination_port),
            primary
        );
        for tag in &self.tags {
            line.push(' ');
            line.push_str(tag);
        }
        if let Some(detail) = &self.detail {
            line.push(' ');
            line.push_str(detail);
        }
        line
    }
}

fn endpoint(address: &str, port: Option<u16>) -> String {
    match port {
        Some(port) => format!("{}:{}", address, port),
        None => address.to_string(),
    }
}

/// Bytes from `offset` to the end, empty when `offset` is past the end.
fn rest(data: &[u8], offset: usize) -> &[u8] {
    data.get(offset..).unwrap_or_default()
}

fn text(value: impl Into<String>) -> FieldValue {
    FieldValue::Text(value.into())
}

fn number(value: impl Into<u64>) -> FieldValue {
    FieldValue::Number(value.into())
}

/// Decode one walked record into a [`PacketRecord`].
///
/// `ethernet` tells whether the capture's link type is Ethernet; other link
/// types keep the bytes opaque and the record is labeled "Unknown".
pub(crate) fn decode_record(
    index: u64,
    raw: &RawRecord<'_>,
    ethernet: bool,
    config: &EngineConfig,
) -> PacketRecord {
    let mut stack = LayerStack::default();
    if ethernet {
        decode_ethernet(raw.data, config, &mut stack);
    }

    let primary = stack.primary();
    let summary = stack.summary(&primary, raw.header.captured_len);
    let ts = Timestamp {
        seconds: raw.header.ts_sec,
        microseconds: raw.header.ts_usec,
    };
    let mut protocols: Vec<String> = stack.layers.iter().map(|l| l.name.clone()).collect();
    protocols.extend(stack.tags.iter().cloned());

    PacketRecord {
        index,
        ts,
        timestamp: ts.to_rfc3339(),
        timestamp_micros: ts.to_micros_string(),
        captured_length: raw.header.captured_len,
        original_length: raw.header.original_len,
        offset: raw.offset as u64,
        layers: stack.layers,
        protocols,
        protocol: primary,
        source_address: stack.source_address,
        destination_address: stack.destination_address,
        source_port: stack.source_port,
        destination_port: stack.destination_port,
        summary,
    }
}

fn decode_ethernet(data: &[u8], config: &EngineConfig, stack: &mut LayerStack) {
    let eth = match parse_ethernet(data) {
        Ok(eth) => eth,
        Err(err) => {
            tracing::trace!(%err, "link layer not decoded");
            return;
        }
    };
    stack.push(
        "Ethernet",
        vec![
            ("destination", text(eth.destination.as_str())),
            ("source", text(eth.source.as_str())),
            ("ether_type", number(eth.ether_type.0)),
            ("ether_type_name", text(ether_type_name(eth.ether_type))),
        ],
    );
    stack.set_addresses(&eth.source, &eth.destination);

    if eth.ether_type == EtherType::IPV4 {
        decode_ipv4(rest(data, eth.header_len), config, stack);
    }
}

fn decode_ipv4(data: &[u8], config: &EngineConfig, stack: &mut LayerStack) {
    let ip = match parse_ipv4(data) {
        Ok(ip) => ip,
        Err(err) => {
            tracing::trace!(%err, "network layer not decoded");
            return;
        }
    };
    stack.push(
        "IPv4",
        vec![
            ("version", number(ip.version)),
            ("header_length", number(ip.header_len as u64)),
            ("total_length", number(ip.total_length)),
            ("ttl", number(ip.ttl)),
            ("protocol", number(ip.protocol.0)),
            ("protocol_name", text(ip_protocol_name(ip.protocol))),
            ("source", text(ip.source.as_str())),
            ("destination", text(ip.destination.as_str())),
        ],
    );
    stack.set_addresses(&ip.source, &ip.destination);

    if !ip.has_valid_header_len() {
        return;
    }
    let payload = rest(data, ip.header_len);
    match ip.protocol {
        IpNumber::TCP => decode_tcp(payload, config, stack),
        IpNumber::UDP => decode_udp(payload, config, stack),
        IpNumber::ICMP => decode_icmp(payload, stack),
        _ => {}
    }
}

fn decode_tcp(data: &[u8], config: &EngineConfig, stack: &mut LayerStack) {
    let Ok(tcp) = parse_tcp(data) else {
        return;
    };
    stack.push(
        "TCP",
        vec![
            ("source_port", number(tcp.source_port)),
            ("destination_port", number(tcp.destination_port)),
            ("sequence_number", number(tcp.sequence_number)),
            ("acknowledgment_number", number(tcp.acknowledgment_number)),
            ("data_offset", number(tcp.data_offset as u64)),
            ("window", number(tcp.window)),
            ("flags", FieldValue::Labels(tcp.flags)),
        ],
    );
    stack.set_ports(tcp.source_port, tcp.destination_port);
    tag_ports(config, Transport::Tcp, tcp.source_port, tcp.destination_port, stack);
}

fn decode_udp(data: &[u8], config: &EngineConfig, stack: &mut LayerStack) {
    let Ok(udp) = parse_udp(data) else {
        return;
    };
    stack.push(
        "UDP",
        vec![
            ("source_port", number(udp.source_port)),
            ("destination_port", number(udp.destination_port)),
            ("length", number(udp.length)),
        ],
    );
    stack.set_ports(udp.source_port, udp.destination_port);
    tag_ports(config, Transport::Udp, udp.source_port, udp.destination_port, stack);
}

fn decode_icmp(data: &[u8], stack: &mut LayerStack) {
    let Ok(icmp) = parse_icmp(data) else {
        return;
    };
    let type_name = icmp_type_name(icmp.icmp_type);
    stack.push(
        "ICMP",
        vec![
            ("type", number(icmp.icmp_type)),
            ("code", number(icmp.code)),
            ("type_name", text(type_name.as_str())),
        ],
    );
    stack.detail = Some(type_name);
}

fn tag_ports(
    config: &EngineConfig,
    transport: Transport,
    source_port: u16,
    destination_port: u16,
    stack: &mut LayerStack,
) {
    for label in config.tags_for(transport, source_port, destination_port) {
        stack.tags.push(label.to_string());
    }
}
