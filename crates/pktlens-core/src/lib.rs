//! pktlens core library: capture-file ingestion and protocol-layer decoding.
//!
//! Bytes of an uploaded capture flow one way through the pipeline:
//! format validation and global header (`source`), the record walker,
//! per-record layer decoding and statistics (`analysis`), then a keyed
//! in-memory session (`session`) that the query engine (`query`) reads.
//! Parsing is byte-oriented and side-effect free; the only shared mutable
//! state is the session store.
//!
//! Invariants:
//! - A record's raw slice is exactly its captured length.
//! - Record- and layer-level anomalies shorten the output, they never fail it.
//! - Session contents are immutable once stored.
//!
//! # Examples
//! ```no_run
//! use pktlens_core::{EngineConfig, FilterSpec, QueryEngine, SessionStore};
//!
//! let bytes = std::fs::read("capture.pcap")?;
//! let store = SessionStore::new(EngineConfig::default());
//! let size = bytes.len() as u64;
//! let session = store.ingest(bytes, "capture.pcap", size)?;
//!
//! let engine = QueryEngine::new(&store);
//! let page = engine.filter(session.id(), &FilterSpec::for_protocol("TCP"))?;
//! println!("{} TCP packets", page.pagination.total);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

mod analysis;
mod config;
mod protocols;
mod query;
mod session;
mod source;

pub use analysis::{AnalysisError, DecodedCapture, decode_capture};
pub use config::{ConfigError, EngineConfig, PortTag, Transport};
pub use query::{
    FilterPage, FilterSpec, HexLine, PacketDetail, Pagination, ProtocolStats, QueryEngine,
    RawSummary, SearchField, SearchPage, SearchSpec,
};
pub use session::{
    CaptureFile, CaptureSession, Clock, FileInfo, IdGenerator, NoopRelease, SessionError,
    SessionId, SessionStore, StorageRelease, SystemClock, UuidGenerator,
};
pub use source::{
    ByteOrder, CaptureError, CaptureFormat, GlobalHeader, HeaderInfo, RecordWalker, StopReason,
    WalkSummary, detect_format, parse_global_header,
};

/// Label used when no layer of a record could be decoded.
pub const UNKNOWN_PROTOCOL: &str = "Unknown";
/// Rendering used when a timestamp cannot be formatted.
pub const DEFAULT_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// Capture instant as stored in a record header.
///
/// # Examples
/// ```
/// use pktlens_core::Timestamp;
///
/// let ts = Timestamp { seconds: 1, microseconds: 500_000 };
/// assert!((ts.as_secs_f64() - 1.5).abs() < f64::EPSILON);
/// assert_eq!(ts.to_rfc3339(), "1970-01-01T00:00:01.5Z");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: u32,
    pub microseconds: u32,
}

impl Timestamp {
    pub fn as_secs_f64(&self) -> f64 {
        self.seconds as f64 + self.microseconds as f64 * 1e-6
    }

    /// RFC 3339 rendering in UTC.
    pub fn to_rfc3339(&self) -> String {
        let nanos = i128::from(self.seconds) * 1_000_000_000 + i128::from(self.microseconds) * 1_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
            .unwrap_or_else(|| DEFAULT_TIMESTAMP.to_string())
    }

    /// `seconds.micros` with six fractional digits.
    pub fn to_micros_string(&self) -> String {
        format!("{}.{:06}", self.seconds, self.microseconds)
    }
}

/// Decoded value of a single header field.
///
/// # Examples
/// ```
/// use pktlens_core::FieldValue;
///
/// let value = FieldValue::Labels(vec!["SYN".to_string(), "ACK".to_string()]);
/// assert_eq!(serde_json::to_string(&value).unwrap(), r#"["SYN","ACK"]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(u64),
    Text(String),
    Labels(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_labels(&self) -> Option<&[String]> {
        match self {
            FieldValue::Labels(labels) => Some(labels),
            _ => None,
        }
    }
}

/// One decoded protocol header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolLayer {
    /// Protocol name (e.g., "Ethernet", "IPv4", "TCP").
    pub name: String,
    /// Named header fields.
    pub fields: BTreeMap<String, FieldValue>,
}

impl ProtocolLayer {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// A walked and decoded capture record.
///
/// # Examples
/// ```
/// use pktlens_core::{PacketRecord, Timestamp};
///
/// let record = PacketRecord {
///     index: 0,
///     ts: Timestamp { seconds: 0, microseconds: 0 },
///     timestamp: "1970-01-01T00:00:00Z".to_string(),
///     timestamp_micros: "0.000000".to_string(),
///     captured_length: 60,
///     original_length: 60,
///     offset: 40,
///     layers: Vec::new(),
///     protocols: Vec::new(),
///     protocol: "Unknown".to_string(),
///     source_address: None,
///     destination_address: None,
///     source_port: None,
///     destination_port: None,
///     summary: "60 bytes [Unknown]".to_string(),
/// };
/// assert!(!record.is_truncated());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Zero-based position in capture order.
    pub index: u64,
    pub ts: Timestamp,
    /// RFC 3339 rendering of `ts`.
    pub timestamp: String,
    /// `seconds.micros` rendering of `ts`.
    pub timestamp_micros: String,
    pub captured_length: u32,
    /// May be smaller than `captured_length` in malformed files.
    pub original_length: u32,
    /// Offset of the record bytes within the capture file.
    pub offset: u64,
    /// Layers from the link layer inwards.
    pub layers: Vec<ProtocolLayer>,
    /// Protocol chain including port-based tags (e.g., `Ethernet, IPv4, TCP, HTTP`).
    pub protocols: Vec<String>,
    /// Name of the deepest decoded layer, or "Unknown".
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,
    /// One-line human-readable description.
    pub summary: String,
}

impl PacketRecord {
    /// Whether the capture kept fewer bytes than were on the wire.
    pub fn is_truncated(&self) -> bool {
        self.captured_length < self.original_length
    }

    pub fn layer(&self, name: &str) -> Option<&ProtocolLayer> {
        self.layers.iter().find(|layer| layer.name == name)
    }
}

/// Occurrences of one address as source or destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressCount {
    pub address: String,
    pub count: u64,
}

/// First and last record timestamps in capture order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

/// Share of one protocol label among all records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolShare {
    pub protocol: String,
    pub count: u64,
    /// Percentage of all records (0.0–100.0).
    pub percentage: f64,
}

/// Summary statistics for one decoded capture.
///
/// # Examples
/// ```
/// use pktlens_core::Statistics;
///
/// let stats = Statistics::default();
/// assert_eq!(stats.total_packets, 0);
/// assert!(stats.average_packet_size.is_none());
/// assert!(stats.protocol_shares().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_packets: u64,
    pub total_bytes: u64,
    /// Record count per primary protocol label.
    pub protocol_distribution: BTreeMap<String, u64>,
    /// Most frequent addresses, count descending, first-seen first on ties.
    pub top_addresses: Vec<AddressCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    /// Last minus first timestamp, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_packet_size: Option<f64>,
}

impl Statistics {
    /// Protocol distribution as percentages, count descending then name.
    pub fn protocol_shares(&self) -> Vec<ProtocolShare> {
        let mut shares: Vec<ProtocolShare> = self
            .protocol_distribution
            .iter()
            .map(|(protocol, count)| ProtocolShare {
                protocol: protocol.clone(),
                count: *count,
                percentage: if self.total_packets == 0 {
                    0.0
                } else {
                    *count as f64 * 100.0 / self.total_packets as f64
                },
            })
            .collect();
        shares.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.protocol.cmp(&b.protocol))
        });
        shares
    }
}
