//! Error types for StockPull
//!
//! This module defines all error types used throughout the application,
//! providing detailed error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for StockPull operations
#[derive(Error, Debug)]
pub enum StockPullError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Request could not be sent or the body could not be read
    #[error("HTTP error for '{url}': {message}")]
    Http { url: String, message: String },

    /// Server answered with an unexpected status code
    #[error("Unexpected HTTP status {status} from '{url}'")]
    Status { url: String, status: u16 },

    /// Response payload could not be decoded
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// CSV reading or writing failed
    #[error("CSV error at '{path}': {message}")]
    Csv { path: PathBuf, message: String },

    /// No usable proxy is left in the pool
    #[error("Proxy pool is empty")]
    EmptyProxyPool,

    /// No ticker list has been saved yet
    #[error("No ticker list found in '{0}'")]
    NoTickerList(PathBuf),

    /// Source returned nothing usable
    #[error("No data returned: {0}")]
    NoData(String),

    /// Interpolation input is invalid
    #[error("Interpolation error: {0}")]
    Interpolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Job scheduler interaction failed
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Operation timed out
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Multiple errors occurred
    #[error("Multiple errors occurred ({count} errors)")]
    MultipleErrors {
        count: usize,
        errors: Vec<StockPullError>,
    },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StockPullError>,
    },
}

impl StockPullError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP transport error
    pub fn http(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Http {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error
    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// Create a CSV error with path context
    pub fn csv(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Csv {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

/// Result type alias for StockPull operations
pub type Result<T> = std::result::Result<T, StockPullError>;

impl From<std::io::Error> for StockPullError {
    fn from(err: std::io::Error) -> Self {
        StockPullError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for StockPullError {
    fn from(err: serde_json::Error) -> Self {
        StockPullError::parse("JSON", err)
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| StockPullError::io(path, e))
    }
}

/// Collects multiple results into a single result
pub fn collect_errors<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => errors.push(e),
        }
    }

    match errors.len() {
        0 => Ok(successes),
        1 => Err(errors.remove(0)),
        count => Err(StockPullError::MultipleErrors { count, errors }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = StockPullError::io("/data/tickers/raw/AAPL.csv", io_err);
        let message = err.to_string();
        assert!(message.contains("/data/tickers/raw/AAPL.csv"));
        assert!(message.contains("file not found"));
    }

    #[test]
    fn test_error_recoverability() {
        assert!(StockPullError::Timeout(30).is_recoverable());
        assert!(StockPullError::http("https://example.com", "reset").is_recoverable());
        assert!(StockPullError::Status {
            url: "u".into(),
            status: 503
        }
        .is_recoverable());
        assert!(!StockPullError::Status {
            url: "u".into(),
            status: 404
        }
        .is_recoverable());
        assert!(!StockPullError::EmptyProxyPool.is_recoverable());
        assert!(StockPullError::Timeout(1)
            .with_context("downloading AAPL")
            .is_recoverable());
    }

    #[test]
    fn test_collect_errors() {
        let results: Vec<Result<i32>> = vec![Ok(1), Ok(2), Ok(3)];
        assert_eq!(collect_errors(results).unwrap(), vec![1, 2, 3]);

        let results: Vec<Result<i32>> = vec![
            Ok(1),
            Err(StockPullError::EmptyProxyPool),
            Err(StockPullError::Timeout(10)),
        ];
        match collect_errors(results) {
            Err(StockPullError::MultipleErrors { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
