//! Print job decoding
//!
//! A received job is either a text ticket (ESC/POS commands interleaved with
//! ASCII) or a rendered page sent as `GS v 0` raster images.
//! [`JobClassifier`] picks the decoder by looking for the raster signature.

pub mod bitmap;
pub mod raster;
pub mod text;

use std::fmt;

use bitmap::BitmapOps;
use raster::{RasterDecoder, contains_raster};

pub use text::decode_text;

/// What a job decoded into
pub enum DecodedContent<T> {
    /// Nothing renderable
    None,
    Text(String),
    Raster(T),
}

impl<T> DecodedContent<T> {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Text(_) => "text",
            Self::Raster(_) => "raster",
        }
    }
}

impl<T> fmt::Debug for DecodedContent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Raster(_) => f.write_str("Raster(..)"),
        }
    }
}

/// Routes each job to the text or raster decoder
#[derive(Debug, Clone)]
pub struct JobClassifier<B> {
    raster: RasterDecoder<B>,
}

impl<B: BitmapOps> JobClassifier<B> {
    pub fn new(ops: B) -> Self {
        Self {
            raster: RasterDecoder::new(ops),
        }
    }

    pub fn with_raster_decoder(raster: RasterDecoder<B>) -> Self {
        Self { raster }
    }

    pub fn raster_decoder(&self) -> &RasterDecoder<B> {
        &self.raster
    }

    /// Decode one job
    ///
    /// Raster jobs that yield no bitmap come back as [`DecodedContent::None`].
    pub fn classify(&self, job: &[u8]) -> DecodedContent<B::Bitmap> {
        if contains_raster(job) {
            match self.raster.decode(job) {
                Some(bitmap) => DecodedContent::Raster(bitmap),
                None => DecodedContent::None,
            }
        } else {
            DecodedContent::Text(decode_text(job))
        }
    }
}
