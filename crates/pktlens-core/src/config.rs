//! Engine configuration.
//!
//! Every knob has a default; a JSON file may override any subset of them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::pcap::layout::DEFAULT_MAX_RECORD_LEN;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Transport a port tag applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

/// Application label attached when either port of a segment matches.
///
/// # Examples
/// ```
/// use pktlens_core::{PortTag, Transport};
///
/// let tag = PortTag::new(Transport::Tcp, 443, "HTTPS");
/// assert!(tag.matches(Transport::Tcp, 51000, 443));
/// assert!(!tag.matches(Transport::Udp, 51000, 443));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTag {
    pub transport: Transport,
    pub port: u16,
    pub label: String,
}

impl PortTag {
    pub fn new(transport: Transport, port: u16, label: impl Into<String>) -> Self {
        Self {
            transport,
            port,
            label: label.into(),
        }
    }

    pub fn matches(&self, transport: Transport, source_port: u16, destination_port: u16) -> bool {
        self.transport == transport && (self.port == source_port || self.port == destination_port)
    }
}

/// Tunables for decoding, querying and the decode budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Records whose captured length exceeds this stop the walk.
    pub max_record_len: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Upper bound on records examined by one search.
    pub search_scan_limit: usize,
    pub top_address_count: usize,
    pub budget_base_ms: u64,
    pub budget_per_mib_ms: u64,
    pub port_tags: Vec<PortTag>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            default_page_size: 50,
            max_page_size: 100,
            search_scan_limit: 10_000,
            top_address_count: 10,
            budget_base_ms: 2_000,
            budget_per_mib_ms: 1_000,
            port_tags: vec![
                PortTag::new(Transport::Tcp, 80, "HTTP"),
                PortTag::new(Transport::Udp, 53, "DNS"),
            ],
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file. Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_record_len == 0 {
            return Err(ConfigError::Invalid(
                "max_record_len must be positive".to_string(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::Invalid(
                "max_page_size must be positive".to_string(),
            ));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "default_page_size must be within 1..={}",
                self.max_page_size
            )));
        }
        if self.top_address_count == 0 {
            return Err(ConfigError::Invalid(
                "top_address_count must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Labels of every tag matching the given segment, in table order.
    pub fn tags_for(&self, transport: Transport, source_port: u16, destination_port: u16) -> Vec<&str> {
        self.port_tags
            .iter()
            .filter(|tag| tag.matches(transport, source_port, destination_port))
            .map(|tag| tag.label.as_str())
            .collect()
    }

    /// Wall-clock budget for decoding a file of `len` bytes.
    pub fn decode_budget_ms(&self, len: usize) -> u64 {
        let mib = (len as u64).div_ceil(1024 * 1024);
        self.budget_base_ms
            .saturating_add(self.budget_per_mib_ms.saturating_mul(mib))
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig, Transport};

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_record_len, 65536);
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "max_page_size": 20, "default_page_size": 10 }"#)
            .unwrap();
        assert_eq!(config.max_page_size, 20);
        assert_eq!(config.search_scan_limit, 10_000);
        assert_eq!(config.port_tags.len(), 2);
    }

    #[test]
    fn port_tags_can_be_replaced() {
        let config = EngineConfig::from_json_str(
            r#"{ "port_tags": [ { "transport": "tcp", "port": 22, "label": "SSH" } ] }"#,
        )
        .unwrap();
        assert_eq!(config.tags_for(Transport::Tcp, 22, 50000), vec!["SSH"]);
        assert!(config.tags_for(Transport::Tcp, 80, 50000).is_empty());
    }

    #[test]
    fn default_tags_cover_http_and_dns() {
        let config = EngineConfig::default();
        assert_eq!(config.tags_for(Transport::Tcp, 51000, 80), vec!["HTTP"]);
        assert_eq!(config.tags_for(Transport::Udp, 53, 40000), vec!["DNS"]);
        assert!(config.tags_for(Transport::Udp, 80, 40000).is_empty());
    }

    #[test]
    fn rejects_inconsistent_page_sizes() {
        let err = EngineConfig::from_json_str(r#"{ "default_page_size": 500 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = EngineConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "top_address_count": 3 }"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.top_address_count, 3);

        let missing = EngineConfig::from_json_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }

    #[test]
    fn budget_grows_with_file_size() {
        let config = EngineConfig::default();
        assert_eq!(config.decode_budget_ms(0), 2_000);
        assert_eq!(config.decode_budget_ms(1), 3_000);
        assert_eq!(config.decode_budget_ms(3 * 1024 * 1024), 5_000);
    }
}
