//! Read-only views over stored sessions: filtered and searched pages,
//! per-packet detail with a hex dump, and protocol statistics.
//!
//! Queries never mutate a session. A page past the last one is an empty
//! page with correct totals, not an error.

use serde::{Deserialize, Serialize};

use crate::session::{SessionError, SessionId, SessionStore};
use crate::{AddressCount, PacketRecord, ProtocolShare, TimeRange};

mod hexdump;
mod params;

pub use hexdump::HexLine;
pub use params::{FilterSpec, Pagination, SearchField, SearchSpec};

use hexdump::hex_dump;

/// One page of records matching a [`FilterSpec`].
#[derive(Debug, Clone, Serialize)]
pub struct FilterPage {
    pub packets: Vec<PacketRecord>,
    pub pagination: Pagination,
    /// The predicates that were applied.
    pub filters: FilterSpec,
}

/// One page of records matching a [`SearchSpec`].
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub packets: Vec<PacketRecord>,
    pub pagination: Pagination,
    pub query: String,
    pub field: SearchField,
}

/// Frame-level facts shown next to a packet's hex dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSummary {
    /// One-based frame number.
    pub frame_number: u64,
    pub timestamp: String,
    pub captured_length: u32,
    pub original_length: u32,
    /// Names of the decoded layers, outermost first.
    pub protocols: Vec<String>,
    pub summary: String,
}

/// One record with its captured bytes.
#[derive(Debug, Clone, Serialize)]
pub struct PacketDetail {
    pub record: PacketRecord,
    pub hex: Vec<HexLine>,
    pub raw: RawSummary,
}

/// Protocol statistics view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolStats {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub protocol_distribution: Vec<ProtocolShare>,
    pub top_addresses: Vec<AddressCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

/// Query surface over a [`SessionStore`].
pub struct QueryEngine<'a> {
    store: &'a SessionStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a SessionStore) -> Self {
        Self { store }
    }

    /// Records matching every predicate of `spec`, in capture order, paged.
    ///
    /// # Errors
    /// `NotFound` for an unknown session, `InvalidQuery` for a bad page.
    pub fn filter(&self, id: SessionId, spec: &FilterSpec) -> Result<FilterPage, SessionError> {
        let (page, page_size) = self.page_params(spec.page, spec.page_size)?;
        let session = self.store.get(id)?;
        let matches: Vec<&PacketRecord> = session
            .records()
            .iter()
            .filter(|record| spec.matches(record))
            .collect();

        let pagination = Pagination::new(page, page_size, matches.len());
        tracing::debug!(%id, total = pagination.total, page, "filter");
        Ok(FilterPage {
            packets: matches[pagination.window()]
                .iter()
                .map(|record| (*record).clone())
                .collect(),
            pagination,
            filters: spec.clone(),
        })
    }

    /// Case-insensitive substring search on one field, paged.
    ///
    /// Only the first `scan_limit` records of the capture are searched.
    /// Records without a value for the field never match.
    ///
    /// # Errors
    /// `NotFound` for an unknown session, `InvalidQuery` for an empty query
    /// or a bad page.
    pub fn search(&self, id: SessionId, spec: &SearchSpec) -> Result<SearchPage, SessionError> {
        if spec.query.is_empty() {
            return Err(SessionError::InvalidQuery(
                "search query must not be empty".to_string(),
            ));
        }
        let (page, page_size) = self.page_params(spec.page, spec.page_size)?;
        let scan_limit = spec
            .scan_limit
            .unwrap_or(self.store.config().search_scan_limit);
        let session = self.store.get(id)?;

        let needle = spec.query.to_lowercase();
        let matches: Vec<&PacketRecord> = session
            .records()
            .iter()
            .take(scan_limit)
            .filter(|record| {
                spec.field
                    .text(record)
                    .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
            .collect();

        let pagination = Pagination::new(page, page_size, matches.len());
        tracing::debug!(%id, field = %spec.field, total = pagination.total, "search");
        Ok(SearchPage {
            packets: matches[pagination.window()]
                .iter()
                .map(|record| (*record).clone())
                .collect(),
            pagination,
            query: spec.query.clone(),
            field: spec.field,
        })
    }

    /// The record at `index` with a hex dump of its captured bytes.
    pub fn packet(&self, id: SessionId, index: u64) -> Result<PacketDetail, SessionError> {
        let session = self.store.get(id)?;
        let record = session
            .record(index)
            .ok_or(SessionError::PacketNotFound { id, index })?;
        let bytes = session.raw_bytes(record);

        Ok(PacketDetail {
            hex: hex_dump(bytes),
            raw: RawSummary {
                frame_number: record.index + 1,
                timestamp: record.timestamp.clone(),
                captured_length: record.captured_length,
                original_length: record.original_length,
                protocols: record
                    .layers
                    .iter()
                    .map(|layer| layer.name.clone())
                    .collect(),
                summary: record.summary.clone(),
            },
            record: record.clone(),
        })
    }

    pub fn protocol_stats(&self, id: SessionId) -> Result<ProtocolStats, SessionError> {
        let session = self.store.get(id)?;
        let stats = session.statistics();
        Ok(ProtocolStats {
            total_packets: stats.total_packets,
            total_bytes: stats.total_bytes,
            protocol_distribution: stats.protocol_shares(),
            top_addresses: stats.top_addresses.clone(),
            time_range: stats.time_range.clone(),
        })
    }

    fn page_params(
        &self,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<(u32, u32), SessionError> {
        let config = self.store.config();
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(config.default_page_size);
        if page == 0 {
            return Err(SessionError::InvalidQuery(
                "page must be at least 1".to_string(),
            ));
        }
        if page_size == 0 || page_size > config.max_page_size {
            return Err(SessionError::InvalidQuery(format!(
                "page size must be between 1 and {}",
                config.max_page_size
            )));
        }
        Ok((page, page_size))
    }
}

#[cfg(test)]
mod tests {
    use etherparse::PacketBuilder;

    use super::{FilterSpec, QueryEngine, SearchField, SearchSpec};
    use crate::config::EngineConfig;
    use crate::session::{SessionError, SessionId, SessionStore};

    fn push_record(bytes: &mut Vec<u8>, secs: u32, frame: &[u8]) {
        bytes.extend_from_slice(&secs.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        bytes.extend_from_slice(frame);
    }

    fn tcp(src: [u8; 4], dst: [u8; 4], dport: u16, payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4(src, dst, 64)
            .tcp(40000, dport, 1, 1024)
            .ack(1);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    fn udp(src: [u8; 4], dst: [u8; 4], dport: u16) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4(src, dst, 64)
            .udp(50000, dport);
        let mut frame = Vec::with_capacity(builder.size(4));
        builder.write(&mut frame, &[0, 1, 2, 3]).unwrap();
        frame
    }

    /// Five records: TCP/HTTP, UDP/DNS, TCP, UDP/DNS, TCP/HTTP.
    fn fixture() -> (SessionStore, SessionId) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&65535u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let client = [192, 168, 1, 100];
        push_record(&mut bytes, 1, &tcp(client, [93, 184, 216, 34], 80, b"GET /"));
        push_record(&mut bytes, 2, &udp(client, [8, 8, 8, 8], 53));
        push_record(&mut bytes, 3, &tcp([10, 0, 0, 1], [10, 0, 0, 2], 22, b""));
        push_record(&mut bytes, 4, &udp(client, [8, 8, 4, 4], 53));
        push_record(&mut bytes, 5, &tcp(client, [93, 184, 216, 34], 80, b""));

        let store = SessionStore::new(EngineConfig::default());
        let size = bytes.len() as u64;
        let session = store.ingest(bytes, "mixed.pcap", size).unwrap();
        let id = session.id();
        (store, id)
    }

    #[test]
    fn filter_by_protocol_is_case_insensitive() {
        let (store, id) = fixture();
        let engine = QueryEngine::new(&store);
        let page = engine.filter(id, &FilterSpec::for_protocol("udp")).unwrap();
        assert_eq!(page.pagination.total, 2);
        assert!(page.packets.iter().all(|p| p.protocol == "UDP"));
        assert_eq!(page.filters.protocol.as_deref(), Some("udp"));
    }

    #[test]
    fn filter_predicates_combine() {
        let (store, id) = fixture();
        let engine = QueryEngine::new(&store);
        let spec = FilterSpec {
            protocol: Some("TCP".to_string()),
            source: Some("192.168.1.100".to_string()),
            destination: Some("93.184.216.34".to_string()),
            ..FilterSpec::default()
        };
        let page = engine.filter(id, &spec).unwrap();
        let indices: Vec<u64> = page.packets.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 4]);
    }

    #[test]
    fn pages_cover_all_matches_without_overlap() {
        let (store, id) = fixture();
        let engine = QueryEngine::new(&store);
        let mut seen = Vec::new();
        for page in 1..=3 {
            let result = engine
                .filter(id, &FilterSpec::default().with_page(page, 2))
                .unwrap();
            assert_eq!(result.pagination.total, 5);
            assert_eq!(result.pagination.total_pages, 3);
            seen.extend(result.packets.iter().map(|p| p.index));
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        let beyond = engine
            .filter(id, &FilterSpec::default().with_page(4, 2))
            .unwrap();
        assert!(beyond.packets.is_empty());
        assert_eq!(beyond.pagination.total, 5);
    }

    #[test]
    fn invalid_pages_are_rejected() {
        let (store, id) = fixture();
        let engine = QueryEngine::new(&store);
        for (page, size) in [(0, 10), (1, 0), (1, 101)] {
            let err = engine
                .filter(id, &FilterSpec::default().with_page(page, size))
                .unwrap_err();
            assert!(matches!(err, SessionError::InvalidQuery(_)));
        }
    }

    #[test]
    fn search_matches_substrings_case_insensitively() {
        let (store, id) = fixture();
        let engine = QueryEngine::new(&store);

        let dns = engine
            .search(id, &SearchSpec::new("8.8.8.8", SearchField::DestinationAddress))
            .unwrap();
        assert_eq!(dns.pagination.total, 1);
        assert_eq!(dns.packets[0].index, 1);

        let tcp = engine
            .search(id, &SearchSpec::new("tcp", SearchField::Protocol))
            .unwrap();
        assert_eq!(tcp.pagination.total, 3);

        let http = engine
            .search(id, &SearchSpec::new("http", SearchField::Summary))
            .unwrap();
        assert_eq!(http.pagination.total, 2);
        assert_eq!(http.field, SearchField::Summary);
    }

    #[test]
    fn search_respects_scan_limit() {
        let (store, id) = fixture();
        let engine = QueryEngine::new(&store);
        let mut spec = SearchSpec::new("192.168.1.100", SearchField::SourceAddress);
        spec.scan_limit = Some(2);
        let page = engine.search(id, &spec).unwrap();
        assert_eq!(page.pagination.total, 2);
    }

    #[test]
    fn empty_search_is_rejected() {
        let (store, id) = fixture();
        let engine = QueryEngine::new(&store);
        let err = engine
            .search(id, &SearchSpec::new("", SearchField::Summary))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidQuery(_)));
    }

    #[test]
    fn packet_detail_dumps_real_bytes() {
        let (store, id) = fixture();
        let engine = QueryEngine::new(&store);
        let detail = engine.packet(id, 0).unwrap();
        assert_eq!(detail.raw.frame_number, 1);
        assert_eq!(detail.raw.protocols, vec!["Ethernet", "IPv4", "TCP"]);
        // destination MAC leads the frame
        assert!(detail.hex[0].hex.starts_with("06 05 04 03 02 01"));
        let dumped: usize = detail
            .hex
            .iter()
            .map(|line| line.hex.split(' ').count())
            .sum();
        assert_eq!(dumped, detail.record.captured_length as usize);

        assert!(matches!(
            engine.packet(id, 5),
            Err(SessionError::PacketNotFound { index: 5, .. })
        ));
    }

    #[test]
    fn protocol_stats_percentages_sum_to_hundred() {
        let (store, id) = fixture();
        let engine = QueryEngine::new(&store);
        let stats = engine.protocol_stats(id).unwrap();
        assert_eq!(stats.total_packets, 5);
        assert_eq!(stats.protocol_distribution[0].protocol, "TCP");
        assert_eq!(stats.protocol_distribution[0].count, 3);
        let sum: f64 = stats
            .protocol_distribution
            .iter()
            .map(|share| share.percentage)
            .sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert_eq!(stats.top_addresses[0].address, "192.168.1.100");
    }

    #[test]
    fn queries_on_deleted_session_fail() {
        let (store, id) = fixture();
        store.delete(id).unwrap();
        let engine = QueryEngine::new(&store);
        assert!(matches!(
            engine.filter(id, &FilterSpec::default()),
            Err(SessionError::NotFound { .. })
        ));
        assert!(matches!(
            engine.protocol_stats(id),
            Err(SessionError::NotFound { .. })
        ));
    }
}
