use serde::{Deserialize, Serialize};

const BYTES_PER_LINE: usize = 16;

/// One line of a classic offset / hex / ASCII dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexLine {
    /// Eight lowercase hex digits.
    pub offset: String,
    /// Space-separated byte pairs.
    pub hex: String,
    /// Printable ASCII, `.` for everything else.
    pub ascii: String,
}

pub(crate) fn hex_dump(bytes: &[u8]) -> Vec<HexLine> {
    bytes
        .chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(line, chunk)| HexLine {
            offset: format!("{:08x}", line * BYTES_PER_LINE),
            hex: chunk
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" "),
            ascii: chunk
                .iter()
                .map(|&b| {
                    if (0x20..=0x7e).contains(&b) {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect(),
        })
        .collect()
}
