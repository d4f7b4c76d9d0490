//! In-memory session store.
//!
//! One session per uploaded capture, keyed by the file's identifier. A
//! session is built once, synchronously, when its file finishes decoding,
//! read many times by the query engine, and dropped when the file is
//! deleted. Nothing survives a process restart.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::analysis::{AnalysisError, DecodedCapture, decode_capture};
use crate::config::EngineConfig;
use crate::source::{CaptureError, HeaderInfo, WalkSummary};
use crate::{DEFAULT_TIMESTAMP, PacketRecord, Statistics};

mod providers;

pub use providers::{
    Clock, IdGenerator, NoopRelease, SessionId, StorageRelease, SystemClock, UuidGenerator,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("session not found: {id}")]
    NotFound { id: SessionId },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("packet {index} not found in session {id}")]
    PacketNotFound { id: SessionId, index: u64 },
}

impl From<CaptureError> for SessionError {
    fn from(value: CaptureError) -> Self {
        SessionError::Analysis(AnalysisError::Capture(value))
    }
}

/// Descriptor of an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFile {
    pub id: SessionId,
    pub original_name: String,
    /// Size declared by the uploader.
    pub size: u64,
    /// RFC 3339 upload instant.
    pub uploaded_at: String,
    /// Format tag (e.g., "pcap").
    pub format: String,
}

/// File metadata and statistics of a session, without its records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub file: CaptureFile,
    pub header: HeaderInfo,
    pub statistics: Statistics,
    pub parsed_at: String,
    pub walk: WalkSummary,
}

/// Decoded, immutable view of one capture file.
#[derive(Debug)]
pub struct CaptureSession {
    file: CaptureFile,
    header: HeaderInfo,
    bytes: Vec<u8>,
    records: Vec<PacketRecord>,
    statistics: Statistics,
    walk: WalkSummary,
    parsed_at: String,
}

impl CaptureSession {
    /// Assemble a session from a decoded capture and the bytes it came from.
    pub fn new(
        file: CaptureFile,
        bytes: Vec<u8>,
        decoded: DecodedCapture,
        parsed_at: String,
    ) -> Self {
        Self {
            file,
            header: HeaderInfo::from(&decoded.header),
            bytes,
            records: decoded.records,
            statistics: decoded.statistics,
            walk: decoded.walk,
            parsed_at,
        }
    }

    pub fn id(&self) -> SessionId {
        self.file.id
    }

    pub fn file(&self) -> &CaptureFile {
        &self.file
    }

    pub fn header(&self) -> &HeaderInfo {
        &self.header
    }

    pub fn records(&self) -> &[PacketRecord] {
        &self.records
    }

    pub fn record(&self, index: u64) -> Option<&PacketRecord> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.records.get(index))
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn parsed_at(&self) -> &str {
        &self.parsed_at
    }

    /// The record's bytes as captured; always `captured_length` long.
    pub fn raw_bytes(&self, record: &PacketRecord) -> &[u8] {
        let start = record.offset as usize;
        let end = start.saturating_add(record.captured_length as usize);
        self.bytes.get(start..end).unwrap_or(&[])
    }

    pub fn file_info(&self) -> FileInfo {
        FileInfo {
            file: self.file.clone(),
            header: self.header.clone(),
            statistics: self.statistics.clone(),
            parsed_at: self.parsed_at.clone(),
            walk: self.walk.clone(),
        }
    }
}

/// Process-wide keyed store of capture sessions.
///
/// Writes (ingest/put and delete) take the write lock; readers clone the
/// session `Arc` under the read lock and never see a half-removed entry.
pub struct SessionStore {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdGenerator>,
    release: Box<dyn StorageRelease>,
    sessions: RwLock<HashMap<SessionId, Arc<CaptureSession>>>,
}

impl SessionStore {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_parts(
            config,
            Box::new(SystemClock),
            Box::new(UuidGenerator),
            Box::new(NoopRelease),
        )
    }

    pub fn with_parts(
        config: EngineConfig,
        clock: Box<dyn Clock>,
        ids: Box<dyn IdGenerator>,
        release: Box<dyn StorageRelease>,
    ) -> Self {
        Self {
            config,
            clock,
            ids,
            release,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Upload path: validate and decode `bytes`, then store the session.
    ///
    /// # Errors
    /// Propagates format, header and budget failures; nothing is stored then.
    pub fn ingest(
        &self,
        bytes: Vec<u8>,
        original_name: &str,
        declared_size: u64,
    ) -> Result<Arc<CaptureSession>, SessionError> {
        let uploaded_at = self.now_rfc3339();
        if declared_size != bytes.len() as u64 {
            tracing::warn!(
                declared_size,
                actual = bytes.len(),
                name = original_name,
                "declared upload size differs from received bytes"
            );
        }

        let decoded = match decode_capture(&bytes, &self.config) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!(name = original_name, %err, "capture rejected");
                return Err(err.into());
            }
        };

        let file = CaptureFile {
            id: self.ids.next_id(),
            original_name: original_name.to_string(),
            size: declared_size,
            uploaded_at,
            format: "pcap".to_string(),
        };
        let session = CaptureSession::new(file, bytes, decoded, self.now_rfc3339());
        Ok(self.put(session))
    }

    /// Store a session, replacing any previous entry with the same id.
    pub fn put(&self, session: CaptureSession) -> Arc<CaptureSession> {
        let session = Arc::new(session);
        let id = session.id();
        let previous = self.sessions.write().insert(id, Arc::clone(&session));
        tracing::info!(
            %id,
            records = session.records.len(),
            replaced = previous.is_some(),
            "session stored"
        );
        session
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<CaptureSession>, SessionError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound { id })
    }

    /// Remove a session, then tell the storage collaborator to release its file.
    pub fn delete(&self, id: SessionId) -> Result<Arc<CaptureSession>, SessionError> {
        let removed = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(SessionError::NotFound { id })?;
        self.release.release(removed.file());
        tracing::info!(%id, "session deleted");
        Ok(removed)
    }

    /// Descriptors of live sessions, oldest upload first.
    pub fn list(&self) -> Vec<CaptureFile> {
        let mut files: Vec<CaptureFile> = self
            .sessions
            .read()
            .values()
            .map(|session| session.file.clone())
            .collect();
        files.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        files
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn now_rfc3339(&self) -> String {
        format_instant(self.clock.now())
    }
}

fn format_instant(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| DEFAULT_TIMESTAMP.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use parking_lot::Mutex;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::{
        CaptureFile, Clock, IdGenerator, SessionError, SessionId, SessionStore, StorageRelease,
    };
    use crate::analysis::AnalysisError;
    use crate::config::EngineConfig;
    use crate::query::{FilterSpec, QueryEngine};
    use crate::source::CaptureError;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
        }
    }

    #[derive(Default)]
    struct SequentialIds(AtomicU64);

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> SessionId {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            SessionId::from_uuid(Uuid::from_u128(u128::from(n)))
        }
    }

    #[derive(Default, Clone)]
    struct RecordingRelease(Arc<Mutex<Vec<String>>>);

    impl StorageRelease for RecordingRelease {
        fn release(&self, file: &CaptureFile) {
            self.0.lock().push(file.original_name.clone());
        }
    }

    fn store_with(release: RecordingRelease) -> SessionStore {
        SessionStore::with_parts(
            EngineConfig::default(),
            Box::new(FixedClock),
            Box::new(SequentialIds::default()),
            Box::new(release),
        )
    }

    fn capture(records: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&65535u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        for i in 0..records {
            bytes.extend_from_slice(&(i as u32).to_le_bytes());
            bytes.extend_from_slice(&0u32.to_le_bytes());
            bytes.extend_from_slice(&14u32.to_le_bytes());
            bytes.extend_from_slice(&14u32.to_le_bytes());
            bytes.extend_from_slice(&[i as u8; 14]);
        }
        bytes
    }

    #[test]
    fn ingest_stores_session_with_injected_id_and_clock() {
        let store = store_with(RecordingRelease::default());
        let bytes = capture(3);
        let size = bytes.len() as u64;
        let session = store.ingest(bytes, "trace.pcap", size).unwrap();

        assert_eq!(session.id(), SessionId::from_uuid(Uuid::from_u128(1)));
        assert_eq!(session.file().uploaded_at, "2023-11-14T22:13:20Z");
        assert_eq!(session.parsed_at(), "2023-11-14T22:13:20Z");
        assert_eq!(session.file().size, size);
        assert_eq!(session.records().len(), 3);
        assert_eq!(store.len(), 1);
        assert!(Arc::ptr_eq(&store.get(session.id()).unwrap(), &session));
    }

    #[test]
    fn raw_bytes_match_captured_length() {
        let store = store_with(RecordingRelease::default());
        let session = store.ingest(capture(2), "trace.pcap", 0).unwrap();
        for record in session.records() {
            let raw = session.raw_bytes(record);
            assert_eq!(raw.len(), record.captured_length as usize);
            assert!(raw.iter().all(|b| *b == record.index as u8));
        }
    }

    #[test]
    fn rejected_upload_stores_nothing() {
        let store = store_with(RecordingRelease::default());
        let err = store.ingest(b"plain text".to_vec(), "notes.txt", 10).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Analysis(AnalysisError::Capture(CaptureError::InvalidFormat { .. }))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = store_with(RecordingRelease::default());
        let id = SessionId::from_uuid(Uuid::from_u128(99));
        assert!(matches!(store.get(id), Err(SessionError::NotFound { .. })));
        assert!(matches!(store.delete(id), Err(SessionError::NotFound { .. })));
    }

    #[test]
    fn delete_removes_and_releases() {
        let release = RecordingRelease::default();
        let store = store_with(release.clone());
        let session = store.ingest(capture(1), "gone.pcap", 0).unwrap();
        let id = session.id();

        store.delete(id).unwrap();
        assert!(matches!(store.get(id), Err(SessionError::NotFound { .. })));
        assert_eq!(release.0.lock().as_slice(), ["gone.pcap".to_string()]);
        assert!(matches!(store.delete(id), Err(SessionError::NotFound { .. })));
        assert_eq!(release.0.lock().len(), 1);
    }

    #[test]
    fn put_overwrites_same_id() {
        let store = store_with(RecordingRelease::default());
        let first = store.ingest(capture(1), "a.pcap", 0).unwrap();
        let decoded = crate::analysis::decode_capture(&capture(4), store.config()).unwrap();
        let replacement = super::CaptureSession::new(
            first.file().clone(),
            capture(4),
            decoded,
            "2024-01-01T00:00:00Z".to_string(),
        );
        store.put(replacement);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(first.id()).unwrap().records().len(), 4);
    }

    #[test]
    fn list_is_ordered_by_upload_then_id() {
        let store = store_with(RecordingRelease::default());
        store.ingest(capture(1), "a.pcap", 0).unwrap();
        store.ingest(capture(1), "b.pcap", 0).unwrap();
        let names: Vec<String> = store.list().into_iter().map(|f| f.original_name).collect();
        assert_eq!(names, vec!["a.pcap", "b.pcap"]);
    }

    #[test]
    fn readers_keep_their_session_after_delete() {
        let store = store_with(RecordingRelease::default());
        let session = store.ingest(capture(2), "held.pcap", 0).unwrap();
        let held = store.get(session.id()).unwrap();
        store.delete(session.id()).unwrap();
        assert_eq!(held.records().len(), 2);
    }

    #[test]
    fn concurrent_reads_see_whole_session_or_not_found() {
        let store = store_with(RecordingRelease::default());
        let id = store.ingest(capture(20), "shared.pcap", 0).unwrap().id();
        let engine = QueryEngine::new(&store);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        match store.get(id) {
                            Ok(session) => {
                                assert_eq!(session.records().len(), 20);
                                assert_eq!(session.statistics().total_packets, 20);
                            }
                            Err(err) => assert!(matches!(err, SessionError::NotFound { .. })),
                        }
                        match engine.filter(id, &FilterSpec::default()) {
                            Ok(page) => assert_eq!(page.pagination.total, 20),
                            Err(err) => assert!(matches!(err, SessionError::NotFound { .. })),
                        }
                    }
                });
            }
            scope.spawn(|| {
                std::thread::yield_now();
                store.delete(id).unwrap();
            });
        });

        assert!(matches!(store.get(id), Err(SessionError::NotFound { .. })));
        assert!(store.is_empty());
    }
}
