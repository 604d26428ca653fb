//! Error types for the printer simulator

use thiserror::Error;

/// Printer simulator error types
#[derive(Debug, Error)]
pub enum PrinterError {
    /// Malformed call into a buffer (slice bounds outside the source)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Pop beyond the bytes currently buffered
    #[error("Out of range: requested {requested}, available {available}")]
    OutOfRange { requested: usize, available: usize },

    /// Listener could not bind
    #[error("Bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Host has no usable network address
    #[error("No network address available")]
    NoAddressAvailable,

    /// IO error on a connection or listener
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raster block header inconsistent with the job bytes
    #[error("Malformed raster block at offset {offset}: {reason}")]
    MalformedBlock { offset: usize, reason: String },

    /// A received job could not be processed
    #[error("Job processing failed: {0}")]
    Processing(String),

    /// Outbound connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for a peer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration value
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for printer simulator operations
pub type PrinterResult<T> = Result<T, PrinterError>;
