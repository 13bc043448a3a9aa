//! Configuration for a ContentDirectory source
//!
//! Defaults suit ordinary media servers. Hosts can override them from JSON or
//! from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CdsError, Result};

/// Default number of objects requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default transport protocol of playable resources
pub const DEFAULT_TRANSPORT_PROTOCOL: &str = "http-get";

/// Configuration for a [`ContentSource`](crate::ContentSource)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Objects requested per Browse or Search page
    /// Default: 50
    pub page_size: u32,

    /// Resources are only reported when served over this protocol
    /// Default: "http-get"
    pub transport_protocol: String,

    /// Connect timeout for SOAP requests, in seconds
    /// Default: 5
    pub connect_timeout_secs: u64,

    /// Read timeout for SOAP requests, in seconds
    /// Default: 10
    pub read_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            transport_protocol: DEFAULT_TRANSPORT_PROTOCOL.to_string(),
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
        }
    }
}

impl SourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Small pages for slow or memory constrained servers
    pub fn small_pages() -> Self {
        Self {
            page_size: 10,
            ..Default::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_transport_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.transport_protocol = protocol.into();
        self
    }

    /// Parse and validate a JSON configuration. Missing fields take their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CdsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `CDS_PAGE_SIZE` and `CDS_TRANSPORT_PROTOCOL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(page_size) = lookup("CDS_PAGE_SIZE") {
            config.page_size = page_size.trim().parse().map_err(|_| {
                CdsError::InvalidConfig(format!("CDS_PAGE_SIZE is not a number: '{}'", page_size))
            })?;
        }
        if let Some(protocol) = lookup("CDS_TRANSPORT_PROTOCOL") {
            config.transport_protocol = protocol.trim().to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CdsError::InvalidConfig(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if self.transport_protocol.trim().is_empty() {
            return Err(CdsError::InvalidConfig(
                "transport_protocol must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SourceConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.transport_protocol, "http-get");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(SourceConfig::small_pages().page_size, 10);
        let config = SourceConfig::new()
            .with_page_size(5)
            .with_transport_protocol("rtsp-rtp-udp");
        assert_eq!(config.page_size, 5);
        assert_eq!(config.transport_protocol, "rtsp-rtp-udp");
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = SourceConfig::from_json_str(r#"{"page_size": 20}"#).unwrap();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.transport_protocol, "http-get");
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            SourceConfig::from_json_str(r#"{"page_size": 0}"#),
            Err(CdsError::InvalidConfig(_))
        ));
        assert!(matches!(
            SourceConfig::from_json_str("not json"),
            Err(CdsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> =
            [("CDS_PAGE_SIZE", " 25 "), ("CDS_TRANSPORT_PROTOCOL", "internal")].into();
        let config = SourceConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.transport_protocol, "internal");

        let config = SourceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SourceConfig::default());

        assert!(SourceConfig::from_lookup(|name| {
            (name == "CDS_PAGE_SIZE").then(|| "lots".to_string())
        })
        .is_err());
    }

    #[test]
    fn test_validate_rejects_empty_protocol() {
        let config = SourceConfig::new().with_transport_protocol("  ");
        assert!(config.validate().is_err());
    }
}
