//! Record walker over the bytes following the global header.
//!
//! The walk is best-effort: a short record header, an oversized record or a
//! payload running past the end of the buffer ends iteration without an
//! error. The reason is kept and can be read back once the iterator is
//! exhausted.

use pcap_parser::nom::{self, Needed};
use pcap_parser::{LegacyPcapBlock, parse_pcap_frame, parse_pcap_frame_be};
use serde::{Deserialize, Serialize};

use super::layout;
use super::parser::ByteOrder;

/// Per-record header fields, already converted from the file's byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub captured_len: u32,
    pub original_len: u32,
}

impl From<&LegacyPcapBlock<'_>> for RecordHeader {
    fn from(block: &LegacyPcapBlock<'_>) -> Self {
        Self {
            ts_sec: block.ts_sec,
            ts_usec: block.ts_usec,
            captured_len: block.caplen,
            original_len: block.origlen,
        }
    }
}

/// One walked record: header plus a payload slice of exactly `captured_len` bytes.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    pub header: RecordHeader,
    /// Offset of the payload within the whole file.
    pub offset: usize,
    pub data: &'a [u8],
}

/// Why a walk ended before consuming every byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    TruncatedRecordHeader {
        offset: usize,
        remaining: usize,
    },
    OversizedRecord {
        offset: usize,
        captured_len: u32,
        limit: u32,
    },
    TruncatedPayload {
        offset: usize,
        captured_len: u32,
        remaining: usize,
    },
}

/// Outcome of a full walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkSummary {
    pub records_decoded: u64,
    pub stopped_early: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StopReason>,
}

/// Lazy, finite, non-restartable iterator over classic capture records.
pub struct RecordWalker<'a> {
    bytes: &'a [u8],
    order: ByteOrder,
    offset: usize,
    max_record_len: u32,
    yielded: u64,
    done: bool,
    stop: Option<StopReason>,
}

impl<'a> RecordWalker<'a> {
    /// Start walking right after the global header.
    ///
    /// `bytes` is the whole file; records are read from offset 24.
    pub fn new(bytes: &'a [u8], order: ByteOrder, max_record_len: u32) -> Self {
        Self {
            bytes,
            order,
            offset: layout::GLOBAL_HEADER_LEN,
            max_record_len,
            yielded: 0,
            done: false,
            stop: None,
        }
    }

    /// The reason the walk stopped early, if it did.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    pub fn summary(&self) -> WalkSummary {
        WalkSummary {
            records_decoded: self.yielded,
            stopped_early: self.stop.is_some(),
            reason: self.stop,
        }
    }

    fn oversized(&self, captured_len: u32) -> StopReason {
        StopReason::OversizedRecord {
            offset: self.offset,
            captured_len,
            limit: self.max_record_len,
        }
    }

    fn halt(&mut self, reason: Option<StopReason>) -> Option<RawRecord<'a>> {
        self.done = true;
        self.stop = reason;
        if let Some(reason) = reason {
            tracing::debug!(?reason, records = self.yielded, "record walk stopped early");
        }
        None
    }
}

impl<'a> Iterator for RecordWalker<'a> {
    type Item = RawRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let bytes = self.bytes;
        let remaining = bytes.len().saturating_sub(self.offset);
        if remaining == 0 {
            return self.halt(None);
        }

        let rest = &bytes[self.offset..];
        let parsed = match self.order {
            ByteOrder::Little => parse_pcap_frame(rest),
            ByteOrder::Big => parse_pcap_frame_be(rest),
        };

        match parsed {
            Ok((_, block)) => {
                if block.caplen > self.max_record_len {
                    return self.halt(Some(self.oversized(block.caplen)));
                }
                let payload_start = self.offset + layout::RECORD_HEADER_LEN;
                self.offset = payload_start + block.data.len();
                self.yielded += 1;
                Some(RawRecord {
                    header: RecordHeader::from(&block),
                    offset: payload_start,
                    data: block.data,
                })
            }
            Err(nom::Err::Incomplete(needed)) if remaining >= layout::RECORD_HEADER_LEN => {
                // Short payload: what is missing plus what is there is the
                // declared captured length.
                let available = remaining - layout::RECORD_HEADER_LEN;
                let missing = match needed {
                    Needed::Size(n) => n.get(),
                    Needed::Unknown => 0,
                };
                let captured_len = u32::try_from(available + missing).unwrap_or(u32::MAX);
                let reason = if captured_len > self.max_record_len {
                    self.oversized(captured_len)
                } else {
                    StopReason::TruncatedPayload {
                        offset: self.offset,
                        captured_len,
                        remaining: available,
                    }
                };
                self.halt(Some(reason))
            }
            Err(_) => self.halt(Some(StopReason::TruncatedRecordHeader {
                offset: self.offset,
                remaining,
            })),
        }
    }
}
