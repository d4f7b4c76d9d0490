use std::fs;
use std::path::{Path, PathBuf};

use etherparse::PacketBuilder;

const CLIENT_MAC: [u8; 6] = [0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e];
const GATEWAY_MAC: [u8; 6] = [0x00, 0x5e, 0x00, 0x53, 0xaf, 0x01];
const CLIENT_IP: [u8; 4] = [192, 168, 1, 100];
const WEB_IP: [u8; 4] = [93, 184, 216, 34];
const RESOLVER_IP: [u8; 4] = [8, 8, 8, 8];
const ETHERTYPE_ARP: u16 = 0x0806;
const LINKTYPE_ETHERNET: u32 = 1;
const SNAPLEN: u32 = 65535;

fn main() -> Result<(), String> {
    let root = PathBuf::from("tests/fixtures");
    let frames = mixed_frames()?;
    write_capture(&root.join("mixed.pcap"), &frames, Endian::Little, 0)?;
    write_capture(&root.join("mixed_be.pcap"), &frames, Endian::Big, 0)?;
    write_capture(&root.join("truncated_tail.pcap"), &frames, Endian::Little, 5)?;
    write_capture(&root.join("empty.pcap"), &[], Endian::Little, 0)?;
    Ok(())
}

#[derive(Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, value: u16) -> [u8; 2] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    fn u32(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

/// HTTP request, DNS query, ICMP echo pair and one ARP frame.
fn mixed_frames() -> Result<Vec<Vec<u8>>, String> {
    Ok(vec![
        http_request()?,
        dns_query()?,
        icmp_echo(true)?,
        icmp_echo(false)?,
        arp_request(),
    ])
}

// PacketBuilder steps share no common trait for `size`/`write`.
macro_rules! build_frame {
    ($builder:expr, $payload:expr) => {{
        let builder = $builder;
        let payload: &[u8] = $payload;
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder
            .write(&mut frame, payload)
            .map_err(|err| format!("failed to build frame: {}", err))?;
        Ok(frame)
    }};
}

fn http_request() -> Result<Vec<u8>, String> {
    build_frame!(
        PacketBuilder::ethernet2(CLIENT_MAC, GATEWAY_MAC)
            .ipv4(CLIENT_IP, WEB_IP, 64)
            .tcp(12345, 80, 1000, 8192)
            .psh()
            .ack(2000),
        b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"
    )
}

fn dns_query() -> Result<Vec<u8>, String> {
    build_frame!(
        PacketBuilder::ethernet2(CLIENT_MAC, GATEWAY_MAC)
            .ipv4(CLIENT_IP, RESOLVER_IP, 64)
            .udp(53000, 53),
        &[0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
    )
}

fn icmp_echo(request: bool) -> Result<Vec<u8>, String> {
    let payload = [0xabu8; 8];
    if request {
        build_frame!(
            PacketBuilder::ethernet2(CLIENT_MAC, GATEWAY_MAC)
                .ipv4(CLIENT_IP, RESOLVER_IP, 64)
                .icmpv4_echo_request(1, 1),
            &payload
        )
    } else {
        build_frame!(
            PacketBuilder::ethernet2(GATEWAY_MAC, CLIENT_MAC)
                .ipv4(RESOLVER_IP, CLIENT_IP, 118)
                .icmpv4_echo_reply(1, 1),
            &payload
        )
    }
}

fn arp_request() -> Vec<u8> {
    let mut frame = Vec::with_capacity(42);
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&CLIENT_MAC);
    frame.extend_from_slice(&ETHERTYPE_ARP.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
    frame.extend_from_slice(&CLIENT_MAC);
    frame.extend_from_slice(&CLIENT_IP);
    frame.extend_from_slice(&[0u8; 6]);
    frame.extend_from_slice(&[192, 168, 1, 1]);
    frame
}

fn write_capture(
    path: &Path,
    frames: &[Vec<u8>],
    endian: Endian,
    trailing_garbage: usize,
) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create {}: {}", parent.display(), err))?;
    }

    let mut output = Vec::new();
    output.extend_from_slice(&endian.u32(0xa1b2_c3d4));
    output.extend_from_slice(&endian.u16(2));
    output.extend_from_slice(&endian.u16(4));
    output.extend_from_slice(&endian.u32(0));
    output.extend_from_slice(&endian.u32(0));
    output.extend_from_slice(&endian.u32(SNAPLEN));
    output.extend_from_slice(&endian.u32(LINKTYPE_ETHERNET));

    for (idx, frame) in frames.iter().enumerate() {
        let len = frame.len() as u32;
        output.extend_from_slice(&endian.u32(1_700_000_000 + idx as u32));
        output.extend_from_slice(&endian.u32((idx as u32) * 250_000));
        output.extend_from_slice(&endian.u32(len));
        output.extend_from_slice(&endian.u32(len));
        output.extend_from_slice(frame);
    }
    output.extend(std::iter::repeat_n(0xeeu8, trailing_garbage));

    fs::write(path, output)
        .map_err(|err| format!("failed to write {}: {}", path.display(), err))?;
    println!("wrote {}", path.display());
    Ok(())
}
