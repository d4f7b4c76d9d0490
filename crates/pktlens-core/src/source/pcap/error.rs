use thiserror::Error;

/// Errors that reject a capture file before any record is walked.
///
/// Record-level anomalies never show up here; the walker reports them as a
/// stop reason instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// `magic` holds up to the first four bytes of the input.
    #[error("invalid capture format: unrecognized signature {magic:02x?}")]
    InvalidFormat { magic: Vec<u8> },
    #[error("truncated global header: need {needed} bytes, got {actual}")]
    TruncatedHeader { needed: usize, actual: usize },
    #[error("unsupported capture format: {format} files are recognized but not decoded")]
    UnsupportedFormat { format: &'static str },
}

impl CaptureError {
    pub(crate) fn invalid_format(bytes: &[u8]) -> Self {
        CaptureError::InvalidFormat {
            magic: bytes.iter().take(4).copied().collect(),
        }
    }
}
