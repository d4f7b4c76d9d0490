use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PacketRecord;
use crate::session::SessionError;

/// Predicates and page selection for listing a session's records.
///
/// Every predicate is optional; an empty spec lists all records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Primary protocol label, compared case-insensitively.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Exact source address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Exact destination address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// One-based page number; `None` means the first page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// `None` means the configured default page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl FilterSpec {
    pub fn for_protocol(protocol: impl Into<String>) -> Self {
        Self {
            protocol: Some(protocol.into()),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub(crate) fn matches(&self, record: &PacketRecord) -> bool {
        if let Some(protocol) = &self.protocol {
            if !record.protocol.eq_ignore_ascii_case(protocol) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if record.source_address.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(destination) = &self.destination {
            if record.destination_address.as_deref() != Some(destination.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Record field a free-text search looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchField {
    #[serde(rename = "sourceIP", alias = "source_address")]
    SourceAddress,
    #[serde(rename = "destinationIP", alias = "destination_address")]
    DestinationAddress,
    #[serde(rename = "protocol")]
    Protocol,
    #[default]
    #[serde(rename = "info", alias = "summary")]
    Summary,
}

impl SearchField {
    pub fn name(self) -> &'static str {
        match self {
            SearchField::SourceAddress => "sourceIP",
            SearchField::DestinationAddress => "destinationIP",
            SearchField::Protocol => "protocol",
            SearchField::Summary => "info",
        }
    }

    /// Textual value of this field; absent addresses have none.
    pub(crate) fn text(self, record: &PacketRecord) -> Option<&str> {
        match self {
            SearchField::SourceAddress => record.source_address.as_deref(),
            SearchField::DestinationAddress => record.destination_address.as_deref(),
            SearchField::Protocol => Some(record.protocol.as_str()),
            SearchField::Summary => Some(record.summary.as_str()),
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchField {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sourceIP" | "source_address" => Ok(SearchField::SourceAddress),
            "destinationIP" | "destination_address" => Ok(SearchField::DestinationAddress),
            "protocol" => Ok(SearchField::Protocol),
            "info" | "summary" => Ok(SearchField::Summary),
            other => Err(SessionError::InvalidQuery(format!(
                "unknown search field '{}' (expected sourceIP, destinationIP, protocol or info)",
                other
            ))),
        }
    }
}

/// Free-text search over one record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpec {
    pub query: String,
    #[serde(default)]
    pub field: SearchField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    /// How many records, from the start of the capture, are searched.
    /// `None` means the configured scan limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_limit: Option<usize>,
}

impl SearchSpec {
    pub fn new(query: impl Into<String>, field: SearchField) -> Self {
        Self {
            query: query.into(),
            field,
            page: None,
            page_size: None,
            scan_limit: None,
        }
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }
}

/// Page metadata shared by filter and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    /// Matches before slicing.
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub(crate) fn new(page: u32, page_size: u32, total: usize) -> Self {
        let total = total as u64;
        Self {
            page,
            page_size,
            total,
            total_pages: total.div_ceil(u64::from(page_size)),
        }
    }

    /// Index range of this page within `total` matches; empty past the end.
    pub(crate) fn window(&self) -> std::ops::Range<usize> {
        let size = self.page_size as usize;
        let start = (self.page as usize - 1).saturating_mul(size);
        let total = self.total as usize;
        start.min(total)..start.saturating_add(size).min(total)
    }
}
