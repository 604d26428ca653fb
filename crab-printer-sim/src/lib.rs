//! # crab-printer-sim
//!
//! Network thermal printer simulator. Listens on the raw printing port
//! (TCP 9100) like a real ESC/POS receipt printer, splits the incoming byte
//! stream into jobs at every paper cut, and decodes each job into text or a
//! raster image.
//!
//! ## Scope
//!
//! - Stream framing: [`ByteAccumulator`] + [`JobFramer`]
//! - TCP listener with a bounded job queue: [`PrinterServer`]
//! - Decoding: [`JobClassifier`] over the text and `GS v 0` raster decoders
//! - Receiving side: [`JobConsumer`] feeding a [`ContentSink`]
//! - Test tickets: [`TestPrintClient`] + [`escpos::test_page`]
//!
//! ## Example
//!
//! ```ignore
//! use crab_printer_sim::{
//!     ImageBitmaps, JobClassifier, JobConsumer, LocalAddressProvider, LogSink, PrinterServer,
//!     ServerConfig,
//! };
//!
//! let server = PrinterServer::new(ServerConfig::from_env(), LocalAddressProvider);
//! let jobs = server.take_jobs().expect("job queue");
//! server.start().await;
//!
//! let mut consumer = JobConsumer::new(JobClassifier::new(ImageBitmaps), LogSink::default());
//! consumer.run(&server, jobs).await?;
//! ```

pub mod address;
pub mod buffer;
pub mod client;
pub mod config;
pub mod consumer;
pub mod decoder;
mod error;
pub mod escpos;
pub mod framer;
pub mod logger;
pub mod server;

// Re-exports
pub use address::{AddressProvider, FixedAddress, LocalAddressProvider};
pub use buffer::ByteAccumulator;
pub use client::TestPrintClient;
pub use config::{Config, DEFAULT_PORT, ServerConfig};
pub use consumer::{ConsumerStats, ContentSink, JobConsumer, LogSink, ReceivedContent};
pub use decoder::bitmap::{BitmapOps, ImageBitmaps, PixelFormat};
pub use decoder::raster::{RasterBlock, RasterDecoder};
pub use decoder::{DecodedContent, JobClassifier, decode_text};
pub use error::{PrinterError, PrinterResult};
pub use escpos::JobBuilder;
pub use framer::JobFramer;
pub use server::{PrintJob, PrinterServer, ServerState, StartResult};
