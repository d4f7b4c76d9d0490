//! Classic capture file source.
//!
//! This module validates the file signature, reads the global header and
//! walks packet records over an in-memory byte buffer. It performs no I/O;
//! callers hand it the bytes of a whole file.

pub mod error;
pub mod layout;
pub mod parser;
pub mod walker;

pub use error::CaptureError;
pub use parser::{
    ByteOrder, CaptureFormat, GlobalHeader, HeaderInfo, detect_format, parse_global_header,
};
pub use walker::{RawRecord, RecordHeader, RecordWalker, StopReason, WalkSummary};
