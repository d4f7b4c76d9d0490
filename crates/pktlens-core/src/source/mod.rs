pub mod pcap;

pub use pcap::{
    ByteOrder, CaptureError, CaptureFormat, GlobalHeader, HeaderInfo, RawRecord, RecordWalker,
    StopReason, WalkSummary, detect_format, parse_global_header,
};
