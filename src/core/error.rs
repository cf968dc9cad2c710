use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("metric {metric} failed: {source}")]
    Metric {
        metric: String,
        #[source]
        source: Box<MetricsError>,
    },

    #[error("agg {index} failed: {source}")]
    Aggregate {
        index: usize,
        #[source]
        source: Box<MetricsError>,
    },

    #[error("failed to collect record {index} (t={timestamp}) metrics: {source}")]
    Record {
        index: u64,
        timestamp: i64,
        #[source]
        source: Box<MetricsError>,
    },

    #[error("extraction error: {0}")]
    Extract(String),

    #[error("destination holds {actual} values, metric tree declares {expected}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("failed to encode {context}: {source}")]
    Encode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to format {0}")]
    Format(String),

    #[error("failed to write {context}: {source}")]
    Write {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("export cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: u64, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for metric operations
pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    /// Creates a new extraction error
    pub fn extract<S: Into<String>>(msg: S) -> Self {
        Self::Extract(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(line: u64, msg: S) -> Self {
        Self::Parse {
            line,
            message: msg.into(),
        }
    }

    /// Wraps an error raised by the named scalar metric
    pub fn in_metric<S: Into<String>>(metric: S, source: MetricsError) -> Self {
        Self::Metric {
            metric: metric.into(),
            source: Box::new(source),
        }
    }

    /// Wraps an error raised by child `index` of a combined tree
    pub fn in_aggregate(index: usize, source: MetricsError) -> Self {
        Self::Aggregate {
            index,
            source: Box::new(source),
        }
    }

    /// Wraps a compute error with the position of the record that caused it
    pub fn in_record(index: u64, timestamp: i64, source: MetricsError) -> Self {
        Self::Record {
            index,
            timestamp,
            source: Box::new(source),
        }
    }

    /// Returns true if the export was stopped by its cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Metric { .. }
            | Self::Aggregate { .. }
            | Self::Record { .. }
            | Self::Extract(_)
            | Self::WidthMismatch { .. } => "compute",
            Self::Encode { .. } | Self::Format(_) => "encode",
            Self::Write { .. } | Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
            Self::Parse { .. } => "parse",
        }
    }

    /// Walks nested compute errors down to the innermost cause
    pub fn root_cause(&self) -> &MetricsError {
        match self {
            Self::Metric { source, .. }
            | Self::Aggregate { source, .. }
            | Self::Record { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = MetricsError::extract("missing base fee");
        assert_eq!(err.to_string(), "extraction error: missing base fee");
        assert_eq!(err.category(), "compute");
    }

    #[test]
    fn test_nested_context() {
        let err = MetricsError::in_record(
            7,
            1_700_000_000,
            MetricsError::in_aggregate(
                2,
                MetricsError::in_metric("block_basefee", MetricsError::extract("no base fee")),
            ),
        );
        assert_eq!(
            err.to_string(),
            "failed to collect record 7 (t=1700000000) metrics: agg 2 failed: \
             metric block_basefee failed: extraction error: no base fee"
        );
        assert!(matches!(err.root_cause(), MetricsError::Extract(_)));
        assert_eq!(err.category(), "compute");
    }

    #[test]
    fn test_cancelled() {
        assert!(MetricsError::Cancelled.is_cancelled());
        assert!(!MetricsError::config("bad").is_cancelled());
        assert_eq!(MetricsError::Cancelled.category(), "cancelled");
    }
}
