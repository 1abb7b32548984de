//! Startup configuration file
//!
//! ```toml
//! [ledger]
//! endpoint = "https://rpc.sepolia.org"
//! contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//! from = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
//!
//! [sync]
//! poll_interval = "10s"
//! confirm_deadline = "2m"
//! ```
//!
//! A malformed or incomplete file is fatal at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::SyncConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid ledger endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid selector for {field}: {value}")]
    InvalidSelector { field: &'static str, value: String },

    #[error("invalid duration for {field}: {value}")]
    InvalidDuration { field: &'static str, value: String },
}

/// Top-level config file
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeraldConfig {
    pub ledger: LedgerSection,
    #[serde(default)]
    pub sync: SyncSection,
}

/// Where the shared value lives
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSection {
    /// JSON-RPC endpoint URL
    #[serde(default)]
    pub endpoint: String,
    /// Contract address holding the value
    #[serde(default)]
    pub contract: String,
    /// Account submitting writes; the endpoint's signer must control it
    pub from: Option<String>,
    /// 4-byte selector of the read function
    pub read_selector: Option<String>,
    /// 4-byte selector of the write function
    pub write_selector: Option<String>,
    /// Per-request timeout
    pub request_timeout: Option<String>,
}

/// Optional engine tuning
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    pub poll_interval: Option<String>,
    pub backoff_base: Option<String>,
    pub backoff_max: Option<String>,
    pub confirm_deadline: Option<String>,
    pub max_message_len: Option<usize>,
}

impl HeraldConfig {
    /// Read, parse and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: HeraldConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ledger = &self.ledger;

        if ledger.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("ledger.endpoint"));
        }
        validate_endpoint(&ledger.endpoint)?;

        if ledger.contract.trim().is_empty() {
            return Err(ConfigError::MissingField("ledger.contract"));
        }
        validate_hex(&ledger.contract, 20).map_err(|value| {
            ConfigError::InvalidAddress {
                field: "ledger.contract",
                value,
            }
        })?;

        if let Some(from) = &ledger.from {
            validate_hex(from, 20).map_err(|value| ConfigError::InvalidAddress {
                field: "ledger.from",
                value,
            })?;
        }

        for (field, selector) in [
            ("ledger.read_selector", &ledger.read_selector),
            ("ledger.write_selector", &ledger.write_selector),
        ] {
            if let Some(selector) = selector {
                validate_hex(selector, 4)
                    .map_err(|value| ConfigError::InvalidSelector { field, value })?;
            }
        }

        self.request_timeout()?;
        self.sync_config()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        parse_duration("ledger.request_timeout", self.ledger.request_timeout.as_deref())
    }

    /// Engine configuration with file overrides applied to the defaults
    pub fn sync_config(&self) -> Result<SyncConfig, ConfigError> {
        let mut config = SyncConfig::default();
        let sync = &self.sync;

        if let Some(d) = parse_duration("sync.poll_interval", sync.poll_interval.as_deref())? {
            config.poll.interval = d;
        }
        if let Some(d) = parse_duration("sync.backoff_base", sync.backoff_base.as_deref())? {
            config.poll.backoff_base = d;
        }
        if let Some(d) = parse_duration("sync.backoff_max", sync.backoff_max.as_deref())? {
            config.poll.backoff_max = d;
        }
        if let Some(d) = parse_duration("sync.confirm_deadline", sync.confirm_deadline.as_deref())? {
            config.tx.confirm_deadline = d;
        }
        if let Some(len) = sync.max_message_len {
            config.classifier.max_message_len = len.max(8);
        }

        Ok(config)
    }
}

/// Accept absolute http(s) URLs that name a host
fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidEndpoint(endpoint.to_string());
    let url = Url::parse(endpoint).map_err(|_| invalid())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}

/// Check a 0x-prefixed hex string of `bytes` bytes
fn validate_hex(value: &str, bytes: usize) -> Result<(), String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| value.to_string())?;

    if digits.len() != bytes * 2 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(value.to_string());
    }
    Ok(())
}

fn parse_duration(field: &'static str, value: Option<&str>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|v| {
            humantime::parse_duration(v).map_err(|_| ConfigError::InvalidDuration {
                field,
                value: v.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        [ledger]
        endpoint = "http://127.0.0.1:8545"
        contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        from = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"

        [sync]
        poll_interval = "3s"
        confirm_deadline = "1m 30s"
        max_message_len = 80
    "#;

    #[test]
    fn test_valid_config() {
        let config = HeraldConfig::from_toml_str(VALID).unwrap();
        assert_eq!(config.ledger.endpoint, "http://127.0.0.1:8545");

        let sync = config.sync_config().unwrap();
        assert_eq!(sync.poll.interval, Duration::from_secs(3));
        assert_eq!(sync.poll.backoff_base, Duration::from_secs(2));
        assert_eq!(sync.tx.confirm_deadline, Duration::from_secs(90));
        assert_eq!(sync.classifier.max_message_len, 80);
    }

    #[test]
    fn test_sync_section_optional() {
        let config = HeraldConfig::from_toml_str(
            r#"
            [ledger]
            endpoint = "https://rpc.example.org/v1"
            contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            "#,
        )
        .unwrap();
        let sync = config.sync_config().unwrap();
        assert_eq!(sync.poll.interval, Duration::from_secs(10));
        assert!(config.ledger.from.is_none());
    }

    #[test]
    fn test_missing_ledger_is_fatal() {
        assert!(matches!(
            HeraldConfig::from_toml_str("[sync]\npoll_interval = \"1s\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            HeraldConfig::from_toml_str(
                "[ledger]\ncontract = \"0x5FbDB2315678afecb367f032d93F642f64180aa3\""
            ),
            Err(ConfigError::MissingField("ledger.endpoint"))
        ));
    }

    #[test]
    fn test_malformed_fields() {
        let bad_endpoint = VALID.replace("http://127.0.0.1:8545", "ftp://host");
        assert!(matches!(
            HeraldConfig::from_toml_str(&bad_endpoint),
            Err(ConfigError::InvalidEndpoint(_))
        ));

        let bad_contract = VALID.replace("0x5FbDB2315678afecb367f032d93F642f64180aa3", "0x1234");
        assert!(matches!(
            HeraldConfig::from_toml_str(&bad_contract),
            Err(ConfigError::InvalidAddress { field: "ledger.contract", .. })
        ));

        let bad_duration = VALID.replace("\"3s\"", "\"soon\"");
        assert!(matches!(
            HeraldConfig::from_toml_str(&bad_duration),
            Err(ConfigError::InvalidDuration { field: "sync.poll_interval", .. })
        ));
    }

    #[test]
    fn test_endpoint_shapes() {
        for endpoint in [
            "http://127.0.0.1:8545",
            "https://rpc.example.org/v1?key=abc",
            "http://[::1]:8545",
            "HTTPS://RPC.EXAMPLE.ORG",
        ] {
            assert!(validate_endpoint(endpoint).is_ok(), "{endpoint}");
        }

        for endpoint in [
            "",
            "http://",
            "https:// bad",
            "https://bad host/",
            "localhost:8545",
            "ws://127.0.0.1:8546",
            "file:///etc/hosts",
        ] {
            assert!(
                matches!(validate_endpoint(endpoint), Err(ConfigError::InvalidEndpoint(_))),
                "{endpoint}"
            );
        }
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let extra = format!("{}\nretries = 3\n", VALID);
        assert!(matches!(
            HeraldConfig::from_toml_str(&extra),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_selector_validation() {
        let with_selector = VALID.replace(
            "[sync]",
            "read_selector = \"0xce6d41de\"\nwrite_selector = \"0x368b\"\n\n[sync]",
        );
        assert!(matches!(
            HeraldConfig::from_toml_str(&with_selector),
            Err(ConfigError::InvalidSelector { field: "ledger.write_selector", .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            HeraldConfig::load("/nonexistent/herald.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
