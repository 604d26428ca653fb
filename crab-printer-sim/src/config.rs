//! Simulator configuration
//!
//! # Environment
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | PRINTER_BIND_HOST | 0.0.0.0 | listen host |
//! | PRINTER_PORT | 9100 | listen port |
//! | PRINTER_READ_BUFFER | 4096 | bytes per socket read |
//! | PRINTER_INITIAL_CAPACITY | 8192 | per-connection buffer start size |
//! | PRINTER_QUEUE_CAPACITY | 64 | jobs pending before senders wait |
//! | PRINTER_OUTPUT_DIR | - | where decoded rasters are saved |
//! | LOG_LEVEL | info | tracing level |
//! | LOG_DIR | - | daily rolling log directory |

use std::path::PathBuf;
use std::str::FromStr;

/// Raw printing port used by networked receipt printers
pub const DEFAULT_PORT: u16 = 9100;

/// Listener and per-connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    /// Size of each socket read
    pub read_buffer_size: usize,
    /// Starting capacity of each connection's accumulator
    pub initial_capacity: usize,
    /// Bound of the shared job queue
    pub queue_capacity: usize,
}

impl ServerConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind_host: std::env::var("PRINTER_BIND_HOST").unwrap_or(d.bind_host),
            port: env_parse("PRINTER_PORT").unwrap_or(d.port),
            read_buffer_size: env_parse("PRINTER_READ_BUFFER")
                .filter(|&n| n > 0)
                .unwrap_or(d.read_buffer_size),
            initial_capacity: env_parse("PRINTER_INITIAL_CAPACITY")
                .filter(|&n| n > 0)
                .unwrap_or(d.initial_capacity),
            queue_capacity: env_parse("PRINTER_QUEUE_CAPACITY")
                .filter(|&n| n > 0)
                .unwrap_or(d.queue_capacity),
        }
    }

    /// Loopback listener on an OS-assigned port
    ///
    /// Used by tests.
    pub fn loopback() -> Self {
        Self {
            bind_host: "127.0.0.1".into(),
            port: 0,
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` to bind
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            read_buffer_size: 4096,
            initial_capacity: 8 * 1024,
            queue_capacity: 64,
        }
    }
}

/// Application settings for the `crab-printer-sim` binary
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Directory for decoded raster PNGs, disabled when unset
    pub output_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_dir: Option<String>,
}

impl Config {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            output_dir: std::env::var("PRINTER_OUTPUT_DIR").ok().map(PathBuf::from),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| parse_value(&v))
}

fn parse_value<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}
