//! Bitmap capability used by the raster decoder
//!
//! The decoder never touches image objects directly. It allocates, writes
//! pixel blocks, reads rows back and crops through [`BitmapOps`], so a GUI
//! front end can plug in its own surface type. [`ImageBitmaps`] is the
//! default backend built on the `image` crate.

use std::path::Path;

use image::{DynamicImage, GenericImage, GenericImageView, GrayImage, Luma, Rgba, RgbaImage};

use crate::error::{PrinterError, PrinterResult};

/// Packed ARGB black
pub const BLACK: u32 = 0xFF00_0000;
/// Packed ARGB white
pub const WHITE: u32 = 0xFFFF_FFFF;

/// Pixel storage requested at allocation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8 bits per channel with alpha
    #[default]
    Argb8888,
    /// 8-bit grayscale
    Gray8,
}

/// Platform bitmap operations
///
/// Pixels cross this boundary as packed ARGB `u32`. New bitmaps start white.
pub trait BitmapOps: Send + Sync {
    type Bitmap: Send + 'static;

    /// Allocate a white bitmap
    fn allocate(&self, width: u32, height: u32, format: PixelFormat) -> Self::Bitmap;

    /// Copy a `width × height` block from `pixels` (rows `stride` apart) to
    /// `(x, y)` and return the bitmap
    #[allow(clippy::too_many_arguments)]
    fn write_pixel_block(
        &self,
        bitmap: Self::Bitmap,
        pixels: &[u32],
        stride: usize,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Self::Bitmap;

    /// Read row `y` into `row` (at most `row.len()` pixels)
    fn read_pixel_row(&self, bitmap: &Self::Bitmap, y: u32, row: &mut [u32]);

    /// Copy out a sub-region
    fn crop(&self, bitmap: &Self::Bitmap, x: u32, y: u32, width: u32, height: u32)
    -> Self::Bitmap;

    /// `(width, height)`
    fn dimensions(&self, bitmap: &Self::Bitmap) -> (u32, u32);
}

/// [`BitmapOps`] backed by `image::DynamicImage`
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBitmaps;

impl BitmapOps for ImageBitmaps {
    type Bitmap = DynamicImage;

    fn allocate(&self, width: u32, height: u32, format: PixelFormat) -> DynamicImage {
        match format {
            PixelFormat::Argb8888 => DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                width,
                height,
                Rgba([255, 255, 255, 255]),
            )),
            PixelFormat::Gray8 => {
                DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255])))
            }
        }
    }

    fn write_pixel_block(
        &self,
        mut bitmap: DynamicImage,
        pixels: &[u32],
        stride: usize,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> DynamicImage {
        let (bw, bh) = bitmap.dimensions();
        for yy in 0..height {
            let dy = y + yy;
            if dy >= bh {
                break;
            }
            let src_row = yy as usize * stride;
            for xx in 0..width {
                let dx = x + xx;
                if dx >= bw {
                    break;
                }
                if let Some(&argb) = pixels.get(src_row + xx as usize) {
                    bitmap.put_pixel(dx, dy, argb_to_rgba(argb));
                }
            }
        }
        bitmap
    }

    fn read_pixel_row(&self, bitmap: &DynamicImage, y: u32, row: &mut [u32]) {
        let (w, h) = bitmap.dimensions();
        if y >= h {
            return;
        }
        for (x, px) in (0..w).zip(row.iter_mut()) {
            *px = rgba_to_argb(bitmap.get_pixel(x, y));
        }
    }

    fn crop(&self, bitmap: &DynamicImage, x: u32, y: u32, width: u32, height: u32) -> DynamicImage {
        bitmap.crop_imm(x, y, width, height)
    }

    fn dimensions(&self, bitmap: &DynamicImage) -> (u32, u32) {
        bitmap.dimensions()
    }
}

fn argb_to_rgba(argb: u32) -> Rgba<u8> {
    let [a, r, g, b] = argb.to_be_bytes();
    Rgba([r, g, b, a])
}

fn rgba_to_argb(px: Rgba<u8>) -> u32 {
    let [r, g, b, a] = px.0;
    u32::from_be_bytes([a, r, g, b])
}

/// Save a decoded receipt as PNG
///
/// # Errors
///
/// [`PrinterError::Io`] if the image cannot be encoded or written.
pub fn save_png(bitmap: &DynamicImage, path: &Path) -> PrinterResult<()> {
    bitmap
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| PrinterError::Io(std::io::Error::other(e)))
}
