//! Error handling and configuration shared by the whole crate.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{ChainConfig, Config, ConfigBuilder, ExportConfig, LogLevel, LoggingConfig};
pub use error::{MetricsError, Result};
