use etherparse::err::LenError;
use thiserror::Error;

/// Errors returned by the per-layer header parsers.
///
/// The layer chain treats every variant as a stop signal; none of them
/// escapes record decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("header too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("unsupported IP version: {version}")]
    UnsupportedVersion { version: u8 },
}

impl From<LenError> for DecodeError {
    fn from(err: LenError) -> Self {
        DecodeError::TooShort {
            needed: err.required_len,
            actual: err.len,
        }
    }
}
