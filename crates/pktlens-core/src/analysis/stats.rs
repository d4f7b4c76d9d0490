use std::collections::{BTreeMap, HashMap};

use crate::{AddressCount, PacketRecord, Statistics, TimeRange};

/// Address occurrence counter that remembers first-seen order.
#[derive(Debug, Default)]
struct AddressCounter {
    index: HashMap<String, usize>,
    counts: Vec<AddressCount>,
}

impl AddressCounter {
    fn add(&mut self, address: &str) {
        match self.index.get(address) {
            Some(&slot) => self.counts[slot].count += 1,
            None => {
                self.index.insert(address.to_string(), self.counts.len());
                self.counts.push(AddressCount {
                    address: address.to_string(),
                    count: 1,
                });
            }
        }
    }

    /// Count descending; the stable sort keeps first-seen order on ties.
    fn top(mut self, limit: usize) -> Vec<AddressCount> {
        self.counts.sort_by(|a, b| b.count.cmp(&a.count));
        self.counts.truncate(limit);
        self.counts
    }
}

/// Reduce decoded records into a [`Statistics`] snapshot.
pub(crate) fn build_statistics(records: &[PacketRecord], top_addresses: usize) -> Statistics {
    let mut protocol_distribution: BTreeMap<String, u64> = BTreeMap::new();
    let mut addresses = AddressCounter::default();
    let mut total_bytes = 0u64;

    for record in records {
        *protocol_distribution
            .entry(record.protocol.clone())
            .or_default() += 1;
        if let Some(source) = &record.source_address {
            addresses.add(source);
        }
        if let Some(destination) = &record.destination_address {
            addresses.add(destination);
        }
        total_bytes += u64::from(record.captured_length);
    }

    let total_packets = records.len() as u64;
    let (time_range, duration_s) = match (records.first(), records.last()) {
        (Some(first), Some(last)) => (
            Some(TimeRange {
                start: first.timestamp.clone(),
                end: last.timestamp.clone(),
            }),
            Some(last.ts.as_secs_f64() - first.ts.as_secs_f64()),
        ),
        _ => (None, None),
    };
    let average_packet_size = if total_packets == 0 {
        None
    } else {
        Some(total_bytes as f64 / total_packets as f64)
    };

    Statistics {
        total_packets,
        total_bytes,
        protocol_distribution,
        top_addresses: addresses.top(top_addresses),
        time_range,
        duration_s,
        average_packet_size,
    }
}
