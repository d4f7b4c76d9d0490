use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::EngineConfig;
use crate::source::{
    CaptureError, GlobalHeader, RecordWalker, WalkSummary, detect_format, parse_global_header,
};
use crate::{PacketRecord, Statistics};

mod layers;
mod stats;

use layers::decode_record;
use stats::build_statistics;

/// How many records are decoded between two budget checks.
const BUDGET_CHECK_INTERVAL: usize = 1024;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("decode budget exceeded: {elapsed_ms} ms elapsed, budget {budget_ms} ms")]
    BudgetExceeded { elapsed_ms: u64, budget_ms: u64 },
}

/// Result of decoding a whole capture file in one pass.
#[derive(Debug, Clone)]
pub struct DecodedCapture {
    pub header: GlobalHeader,
    pub records: Vec<PacketRecord>,
    pub statistics: Statistics,
    pub walk: WalkSummary,
}

/// Validate, walk and decode a classic capture held in memory.
///
/// Decoding is all-or-nothing: the file is rejected at the signature or
/// header stage, or when the wall-clock budget runs out; otherwise every
/// whole record up to the first malformed one is returned.
///
/// # Errors
/// `Capture(InvalidFormat)` for an unknown signature, `Capture(UnsupportedFormat)`
/// for next-generation files, `Capture(TruncatedHeader)` for fewer than 24
/// bytes, and `BudgetExceeded` when decoding runs past the configured budget.
pub fn decode_capture(bytes: &[u8], config: &EngineConfig) -> Result<DecodedCapture, AnalysisError> {
    let format = detect_format(bytes);
    if !format.is_decodable() {
        let err = if format.is_accepted() {
            CaptureError::UnsupportedFormat {
                format: format.name(),
            }
        } else {
            CaptureError::invalid_format(bytes)
        };
        return Err(err.into());
    }

    let header = parse_global_header(bytes)?;
    let ethernet = header.is_ethernet();
    if !ethernet {
        tracing::debug!(
            link_type = header.link_type.0,
            "link type is not Ethernet; record bytes are kept opaque"
        );
    }

    let budget_ms = config.decode_budget_ms(bytes.len());
    let started = Instant::now();
    let mut walker = RecordWalker::new(bytes, header.byte_order, config.max_record_len);
    let mut records = Vec::new();
    for (index, raw) in walker.by_ref().enumerate() {
        if index % BUDGET_CHECK_INTERVAL == 0 {
            check_budget(started.elapsed(), budget_ms)?;
        }
        records.push(decode_record(index as u64, &raw, ethernet, config));
    }
    check_budget(started.elapsed(), budget_ms)?;

    let walk = walker.summary();
    if let Some(reason) = walk.reason {
        tracing::warn!(
            records = walk.records_decoded,
            ?reason,
            "capture walk stopped before the end of the file"
        );
    }

    let statistics = build_statistics(&records, config.top_address_count);
    tracing::debug!(
        records = records.len(),
        bytes = statistics.total_bytes,
        "capture decoded"
    );

    Ok(DecodedCapture {
        header,
        records,
        statistics,
        walk,
    })
}

fn check_budget(elapsed: Duration, budget_ms: u64) -> Result<(), AnalysisError> {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    if elapsed_ms > budget_ms {
        tracing::warn!(elapsed_ms, budget_ms, "decode budget exceeded");
        return Err(AnalysisError::BudgetExceeded {
            elapsed_ms,
            budget_ms,
        });
    }
    Ok(())
}
