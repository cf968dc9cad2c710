//! Configuration management.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides
//! - Validation and defaults

use crate::chain::{ChainType, KNOWN_L1_CHAIN_IDS};
use crate::core::{MetricsError, Result};
use crate::export::{ExportFormat, DEFAULT_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the implicit chain used when none is configured.
pub const DEFAULT_CHAIN_NAME: &str = "ethereum";

/// Default capacity of the record channel between reader and exporter.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chains by name, kept sorted
    pub chains: BTreeMap<String, ChainConfig>,
    /// Export configuration
    pub export: ExportConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Per-chain configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Kind of chain, selects the metric set
    #[serde(rename = "type")]
    pub kind: ChainType,
    /// Name of the configured chain this one settles on
    #[serde(default)]
    pub l1: Option<String>,
    /// Chain id whose rollup inboxes split calldata volume
    #[serde(default)]
    pub l1_chain_id: Option<u64>,
    /// Blocks older than this unix time are skipped
    #[serde(default)]
    pub min_time: u64,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output encoding
    pub format: ExportFormat,
    /// Records per JSON-lines flush
    pub batch_size: usize,
    /// Records buffered between reader and exporter
    pub channel_capacity: usize,
    /// Write a header line before CSV output
    pub csv_header: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            kind: ChainType::Ethereum,
            l1: None,
            l1_chain_id: None,
            min_time: 0,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            format: ExportFormat::Csv,
            batch_size: DEFAULT_BATCH_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            csv_header: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.export.batch_size == 0 {
            return Err(MetricsError::config("batch_size must be greater than 0"));
        }

        if self.export.channel_capacity == 0 {
            return Err(MetricsError::config("channel_capacity must be greater than 0"));
        }

        for (name, chain) in &self.chains {
            if let Some(l1) = &chain.l1 {
                if l1 == name {
                    return Err(MetricsError::config(format!(
                        "chain '{}' cannot be its own L1",
                        name
                    )));
                }
                if !self.chains.contains_key(l1) {
                    return Err(MetricsError::config(format!(
                        "chain '{}' references unknown L1 chain '{}'",
                        name, l1
                    )));
                }
            }

            if let Some(id) = chain.l1_chain_id {
                if !KNOWN_L1_CHAIN_IDS.contains(&id) {
                    return Err(MetricsError::config(format!(
                        "chain '{}' has no inbox table for L1 chain id {} (known: {:?})",
                        name, id, KNOWN_L1_CHAIN_IDS
                    )));
                }
            }
        }

        Ok(())
    }

    /// Pick the chain to export.
    ///
    /// With no name, a single configured chain is used as is, and an empty
    /// chain table falls back to a plain Ethereum chain.
    pub fn select_chain(&self, name: Option<&str>) -> Result<(String, ChainConfig)> {
        match name {
            Some(name) => self
                .chains
                .get(name)
                .map(|chain| (name.to_string(), chain.clone()))
                .ok_or_else(|| {
                    MetricsError::config(format!(
                        "unknown chain '{}', configured: {:?}",
                        name,
                        self.chains.keys().collect::<Vec<_>>()
                    ))
                }),
            None => {
                let mut chains = self.chains.iter();
                match (chains.next(), chains.next()) {
                    (None, _) => Ok((DEFAULT_CHAIN_NAME.to_string(), ChainConfig::default())),
                    (Some((name, chain)), None) => Ok((name.clone(), chain.clone())),
                    _ => Err(MetricsError::config(format!(
                        "multiple chains configured, pick one of {:?}",
                        self.chains.keys().collect::<Vec<_>>()
                    ))),
                }
            },
        }
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| MetricsError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Add or replace a chain
    pub fn chain(mut self, name: impl Into<String>, chain: ChainConfig) -> Self {
        self.config.chains.insert(name.into(), chain);
        self
    }

    /// Set export format
    pub fn format(mut self, format: ExportFormat) -> Self {
        self.config.export.format = format;
        self
    }

    /// Set JSON-lines batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.export.batch_size = size;
        self
    }

    /// Set record channel capacity
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.export.channel_capacity = capacity;
        self
    }

    /// Enable the CSV header line
    pub fn csv_header(mut self, enable: bool) -> Self {
        self.config.export.csv_header = enable;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opstack_on(l1: &str) -> ChainConfig {
        ChainConfig {
            kind: ChainType::Opstack,
            l1: Some(l1.to_string()),
            ..ChainConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.export.batch_size, 100);
        assert_eq!(config.export.channel_capacity, 100);
        assert_eq!(config.export.format, ExportFormat::Csv);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(ConfigBuilder::new().batch_size(0).build().is_err());
        assert!(ConfigBuilder::new().channel_capacity(0).build().is_err());
    }

    #[test]
    fn test_l1_references() {
        let ok = ConfigBuilder::new()
            .chain("mainnet", ChainConfig::default())
            .chain("op", opstack_on("mainnet"))
            .build();
        assert!(ok.is_ok());

        let unknown = ConfigBuilder::new().chain("op", opstack_on("mainnet")).build();
        assert!(matches!(unknown, Err(MetricsError::Config(_))));

        let own = ConfigBuilder::new().chain("op", opstack_on("op")).build();
        assert!(own.is_err());
    }

    #[test]
    fn test_unknown_inbox_chain_id() {
        let chain = ChainConfig {
            l1_chain_id: Some(10),
            ..ChainConfig::default()
        };
        let err = ConfigBuilder::new().chain("mainnet", chain).build().unwrap_err();
        assert!(err.to_string().contains("L1 chain id 10"));
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .format(ExportFormat::Json)
            .batch_size(25)
            .channel_capacity(8)
            .log_level(LogLevel::Warn)
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.export.format, ExportFormat::Json);
        assert_eq!(config.export.batch_size, 25);
        assert_eq!(config.export.channel_capacity, 8);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.debug);
    }

    #[test]
    fn test_select_chain() {
        let empty = Config::default();
        let (name, chain) = empty.select_chain(None).unwrap();
        assert_eq!(name, DEFAULT_CHAIN_NAME);
        assert_eq!(chain.kind, ChainType::Ethereum);

        let config = ConfigBuilder::new()
            .chain("mainnet", ChainConfig::default())
            .chain("op", opstack_on("mainnet"))
            .build()
            .unwrap();
        assert!(config.select_chain(None).is_err());
        assert!(config.select_chain(Some("base")).is_err());

        let (name, chain) = config.select_chain(Some("op")).unwrap();
        assert_eq!(name, "op");
        assert_eq!(chain.kind, ChainType::Opstack);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
chains:
  op-mainnet:
    type: opstack
    l1: mainnet
    min_time: 1686068903
  mainnet:
    type: ethereum
    l1_chain_id: 1
export:
  format: json
  batch_size: 50
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        // sorted by name regardless of file order
        let names: Vec<&str> = config.chains.keys().map(String::as_str).collect();
        assert_eq!(names, ["mainnet", "op-mainnet"]);

        let op = &config.chains["op-mainnet"];
        assert_eq!(op.kind, ChainType::Opstack);
        assert_eq!(op.l1.as_deref(), Some("mainnet"));
        assert_eq!(op.min_time, 1686068903);
        assert_eq!(config.chains["mainnet"].l1_chain_id, Some(1));

        assert_eq!(config.export.format, ExportFormat::Json);
        assert_eq!(config.export.batch_size, 50);
        assert_eq!(config.export.channel_capacity, 100);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_yaml_bad_chain_type() {
        let yaml = "chains:\n  x:\n    type: solana\n";
        assert!(ConfigBuilder::new().from_yaml(yaml).is_err());
    }
}
