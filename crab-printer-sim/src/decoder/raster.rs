//! GS v 0 raster decoding
//!
//! Receipt software that renders its own layout (logos, CJK text, whole
//! tickets) sends the page as one or more `GS v 0` bit images. Decoding runs
//! in five steps:
//!
//! 1. find every raster block in the job
//! 2. unpack each block into a bitmap
//! 3. stitch the blocks top to bottom
//! 4. retry with inverted polarity if the result is almost blank
//! 5. crop the white margin above and below the content

use tracing::{debug, instrument};

use super::bitmap::{BLACK, BitmapOps, PixelFormat, WHITE};
use crate::error::PrinterError;
use crate::escpos::{RASTER_HEADER_LEN, RASTER_SIGNATURE};

/// Rows sampled by the inversion heuristic
pub const SAMPLE_ROWS: u32 = 200;
/// Columns sampled per row by the inversion heuristic
pub const SAMPLE_COLUMNS: u32 = 400;
/// Below this black ratio the job is decoded again inverted
pub const INVERT_BLACK_RATIO: f32 = 0.001;
/// Blank rows kept above and below the content when cropping
pub const CROP_MARGIN: u32 = 10;

/// Location of one raster image inside a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterBlock {
    /// Row width in bytes (8 pixels each)
    pub width_bytes: usize,
    pub height: usize,
    /// Offset of the first data byte in the job
    pub data_offset: usize,
    /// `width_bytes * height`
    pub data_length: usize,
}

impl RasterBlock {
    /// Width in pixels
    pub fn width_px(&self) -> usize {
        self.width_bytes.saturating_mul(8)
    }
}

/// Whether the job carries a raster signature anywhere
pub fn contains_raster(job: &[u8]) -> bool {
    job.windows(RASTER_SIGNATURE.len())
        .any(|w| w == RASTER_SIGNATURE)
}

/// Locate every well-formed raster block, in order of appearance
///
/// Blocks with a zero dimension are skipped. A block whose data runs past the
/// end of the job stops the scan: the rest of the job is presumed truncated.
pub fn extract_blocks(job: &[u8]) -> Vec<RasterBlock> {
    let mut blocks = Vec::new();
    let mut i = 0;

    while i + RASTER_HEADER_LEN <= job.len() {
        if job[i..i + RASTER_SIGNATURE.len()] != RASTER_SIGNATURE {
            i += 1;
            continue;
        }

        // job[i + 3] is the density mode, which does not change the layout
        let width_bytes = usize::from(u16::from_le_bytes([job[i + 4], job[i + 5]]));
        let height = usize::from(u16::from_le_bytes([job[i + 6], job[i + 7]]));
        let data_offset = i + RASTER_HEADER_LEN;
        let data_length = width_bytes * height;

        if width_bytes == 0 || height == 0 {
            let err = PrinterError::MalformedBlock {
                offset: i,
                reason: format!("empty dimensions {width_bytes}x{height}"),
            };
            debug!(error = %err, "skipping raster block");
            i += 1;
            continue;
        }
        if data_offset + data_length > job.len() {
            let err = PrinterError::MalformedBlock {
                offset: i,
                reason: format!(
                    "needs {data_length} data bytes, {} available",
                    job.len() - data_offset
                ),
            };
            debug!(error = %err, "raster data truncated, stopping extraction");
            break;
        }

        blocks.push(RasterBlock {
            width_bytes,
            height,
            data_offset,
            data_length,
        });
        i = data_offset + data_length;
    }

    blocks
}

/// Decodes raster jobs into bitmaps through a [`BitmapOps`] backend
#[derive(Debug, Clone)]
pub struct RasterDecoder<B> {
    ops: B,
    format: PixelFormat,
}

impl<B: BitmapOps> RasterDecoder<B> {
    pub fn new(ops: B) -> Self {
        Self {
            ops,
            format: PixelFormat::default(),
        }
    }

    /// Pixel format for allocated bitmaps
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn ops(&self) -> &B {
        &self.ops
    }

    /// Decode a whole job into one cropped bitmap
    ///
    /// `None` when the job holds no decodable raster block.
    #[instrument(skip_all, fields(job_len = job.len()))]
    pub fn decode(&self, job: &[u8]) -> Option<B::Bitmap> {
        let blocks = extract_blocks(job);
        if blocks.is_empty() {
            debug!("no raster blocks");
            return None;
        }
        debug!(blocks = blocks.len(), "decoding raster blocks");

        let normal = self.decode_all(&blocks, job, false)?;
        let ratio = self.black_ratio(&normal);

        let chosen = if ratio < INVERT_BLACK_RATIO {
            debug!(ratio, "raster almost blank, retrying inverted");
            self.decode_all(&blocks, job, true).unwrap_or(normal)
        } else {
            normal
        };

        Some(self.crop_whitespace(&chosen))
    }

    fn decode_all(&self, blocks: &[RasterBlock], job: &[u8], invert: bool) -> Option<B::Bitmap> {
        let decoded = blocks
            .iter()
            .filter_map(|b| self.decode_block(b, job, invert))
            .collect();
        self.stitch(decoded)
    }

    /// Unpack one block, MSB first
    ///
    /// A set bit is black, or white when `invert` is set. `None` if the block
    /// does not fit inside `job`.
    pub fn decode_block(&self, block: &RasterBlock, job: &[u8], invert: bool) -> Option<B::Bitmap> {
        if block.width_bytes == 0 || block.height == 0 {
            return None;
        }
        let needed = block.width_bytes.checked_mul(block.height)?;
        let end = block.data_offset.checked_add(block.data_length)?;
        if end > job.len() || block.data_length < needed {
            return None;
        }

        let width = block.width_bytes.checked_mul(8)?;
        let mut pixels = vec![WHITE; width.checked_mul(block.height)?];
        let data = &job[block.data_offset..end];

        for (y, row) in data
            .chunks_exact(block.width_bytes)
            .take(block.height)
            .enumerate()
        {
            let row_base = y * width;
            for (xb, &byte) in row.iter().enumerate() {
                for bit in 0..8 {
                    let set = (byte >> (7 - bit)) & 1 == 1;
                    if set != invert {
                        pixels[row_base + xb * 8 + bit] = BLACK;
                    }
                }
            }
        }

        let (w, h) = (u32::try_from(width).ok()?, u32::try_from(block.height).ok()?);
        let bmp = self.ops.allocate(w, h, self.format);
        Some(self.ops.write_pixel_block(bmp, &pixels, width, 0, 0, w, h))
    }

    /// Stack bitmaps vertically, left aligned
    ///
    /// The result is as wide as the widest input.
    pub fn stitch(&self, bitmaps: Vec<B::Bitmap>) -> Option<B::Bitmap> {
        if bitmaps.len() <= 1 {
            return bitmaps.into_iter().next();
        }

        let dims: Vec<(u32, u32)> = bitmaps.iter().map(|b| self.ops.dimensions(b)).collect();
        let width = dims.iter().map(|&(w, _)| w).max().unwrap_or(0);
        let height = dims.iter().map(|&(_, h)| h).sum();

        let mut out = self.ops.allocate(width, height, self.format);
        let mut y_offset = 0;
        for (bmp, &(w, h)) in bitmaps.iter().zip(&dims) {
            let mut row = vec![WHITE; w as usize];
            for yy in 0..h {
                self.ops.read_pixel_row(bmp, yy, &mut row);
                out = self
                    .ops
                    .write_pixel_block(out, &row, w as usize, 0, y_offset + yy, w, 1);
            }
            y_offset += h;
        }
        Some(out)
    }

    /// Fraction of black pixels over a bounded sample grid
    pub fn black_ratio(&self, bitmap: &B::Bitmap) -> f32 {
        let (w, h) = self.ops.dimensions(bitmap);
        let row_step = (h / SAMPLE_ROWS).max(1) as usize;
        let col_step = (w / SAMPLE_COLUMNS).max(1) as usize;

        let mut row = vec![WHITE; w as usize];
        let mut black = 0u64;
        let mut total = 0u64;
        for y in (0..h).step_by(row_step) {
            self.ops.read_pixel_row(bitmap, y, &mut row);
            for &px in row.iter().step_by(col_step) {
                total += 1;
                if px == BLACK {
                    black += 1;
                }
            }
        }

        if total == 0 {
            0.0
        } else {
            black as f32 / total as f32
        }
    }

    /// Trim blank rows above and below the content, keeping a margin
    pub fn crop_whitespace(&self, bitmap: &B::Bitmap) -> B::Bitmap {
        let (w, h) = self.ops.dimensions(bitmap);
        let mut row = vec![WHITE; w as usize];
        let mut has_black = |y: u32| {
            self.ops.read_pixel_row(bitmap, y, &mut row);
            row.contains(&BLACK)
        };

        let top = (0..h).find(|&y| has_black(y)).unwrap_or(0);
        let bottom = (0..h).rev().find(|&y| has_black(y)).unwrap_or(h.saturating_sub(1));

        let crop_top = top.saturating_sub(CROP_MARGIN);
        let crop_bottom = (bottom + CROP_MARGIN).min(h.saturating_sub(1));
        let crop_height = (crop_bottom + 1).saturating_sub(crop_top).max(1);

        self.ops.crop(bitmap, 0, crop_top, w, crop_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::bitmap::ImageBitmaps;
    use crate::escpos::JobBuilder;

    fn decoder() -> RasterDecoder<ImageBitmaps> {
        RasterDecoder::new(ImageBitmaps)
    }

    fn rows(decoder: &RasterDecoder<ImageBitmaps>, bmp: &image::DynamicImage) -> Vec<Vec<u32>> {
        let (w, h) = decoder.ops().dimensions(bmp);
        (0..h)
            .map(|y| {
                let mut row = vec![0; w as usize];
                decoder.ops().read_pixel_row(bmp, y, &mut row);
                row
            })
            .collect()
    }

    fn expected_row(byte: u8, invert: bool) -> Vec<u32> {
        (0..8)
            .map(|bit| {
                let set = (byte >> (7 - bit)) & 1 == 1;
                if set != invert { BLACK } else { WHITE }
            })
            .collect()
    }

    #[test]
    fn test_contains_raster() {
        assert!(contains_raster(b"ab\x1D\x76\x30"));
        assert!(!contains_raster(b"ab\x1D\x76"));
        assert!(!contains_raster(b""));
    }

    #[test]
    fn test_extract_single_block() {
        let mut b = JobBuilder::new();
        b.text("xx").raster(2, 3, &[0xFF; 6]).text("yy");
        let blocks = extract_blocks(&b.build());
        assert_eq!(
            blocks,
            vec![RasterBlock {
                width_bytes: 2,
                height: 3,
                data_offset: 10,
                data_length: 6,
            }]
        );
    }

    #[test]
    fn test_extract_skips_empty_dimensions() {
        let mut b = JobBuilder::new();
        b.raster(0, 5, &[]).raster(1, 2, &[0x80, 0x01]);
        let blocks = extract_blocks(&b.build());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].height, 2);
    }

    #[test]
    fn test_extract_stops_at_truncated_block() {
        let mut b = JobBuilder::new();
        b.raster(1, 1, &[0xAA]).raster(4, 100, &[0x00; 10]).raster(1, 1, &[0x55]);
        let blocks = extract_blocks(&b.build());
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_decode_block_bits() {
        let data = [0xAA, 0x55, 0xF0, 0x0F, 0x81, 0x7E, 0x00, 0xFF];
        let mut b = JobBuilder::new();
        b.raster(1, 8, &data);
        let job = b.build();

        let d = decoder();
        let block = extract_blocks(&job)[0];
        let bmp = d.decode_block(&block, &job, false).unwrap();
        assert_eq!(d.ops().dimensions(&bmp), (8, 8));

        let got = rows(&d, &bmp);
        for (y, &byte) in data.iter().enumerate() {
            assert_eq!(got[y], expected_row(byte, false), "row {y}");
        }

        let inv = d.decode_block(&block, &job, true).unwrap();
        let got = rows(&d, &inv);
        for (y, &byte) in data.iter().enumerate() {
            assert_eq!(got[y], expected_row(byte, true), "inverted row {y}");
        }
    }

    #[test]
    fn test_decode_block_out_of_bounds() {
        let d = decoder();
        let block = RasterBlock {
            width_bytes: 1,
            height: 4,
            data_offset: 2,
            data_length: 4,
        };
        assert!(d.decode_block(&block, &[0u8; 5], false).is_none());
    }

    #[test]
    fn test_decode_block_oversized_dimensions() {
        let d = decoder();
        let job = [0u8; 16];
        for (width_bytes, height) in [(usize::MAX / 2, 3), (usize::MAX / 4, usize::MAX / 4)] {
            let block = RasterBlock {
                width_bytes,
                height,
                data_offset: 0,
                data_length: 16,
            };
            assert!(d.decode_block(&block, &job, false).is_none());
        }
        let wide = RasterBlock {
            width_bytes: usize::MAX,
            height: 1,
            data_offset: 0,
            data_length: 0,
        };
        assert_eq!(wide.width_px(), usize::MAX);
        assert!(d.decode_block(&wide, &job, false).is_none());
    }

    #[test]
    fn test_gray_format_decodes_same_pixels() {
        let data = [0xC3, 0x3C];
        let mut b = JobBuilder::new();
        b.raster(1, 2, &data);
        let job = b.build();

        let d = decoder().with_format(PixelFormat::Gray8);
        let bmp = d.decode_block(&extract_blocks(&job)[0], &job, false).unwrap();
        assert!(matches!(bmp, image::DynamicImage::ImageLuma8(_)));
        let got = rows(&d, &bmp);
        assert_eq!(got[0], expected_row(0xC3, false));
        assert_eq!(got[1], expected_row(0x3C, false));
    }

    #[test]
    fn test_truncated_job_decodes_to_none() {
        let mut b = JobBuilder::new();
        b.raster(2, 10, &[0xFF; 7]);
        assert!(decoder().decode(&b.build()).is_none());
    }

    #[test]
    fn test_no_blocks_decodes_to_none() {
        assert!(decoder().decode(b"plain text only").is_none());
    }

    #[test]
    fn test_stitch_two_blocks() {
        let mut b = JobBuilder::new();
        b.raster(2, 10, &[0xFF; 20]).raster(2, 20, &[0x0F; 40]);
        let job = b.build();

        let d = decoder();
        let blocks = extract_blocks(&job);
        assert_eq!(blocks.len(), 2);
        let bitmaps = blocks
            .iter()
            .filter_map(|blk| d.decode_block(blk, &job, false))
            .collect();
        let stitched = d.stitch(bitmaps).unwrap();
        assert_eq!(d.ops().dimensions(&stitched), (16, 30));

        let got = rows(&d, &stitched);
        assert_eq!(got[9], vec![BLACK; 16]);
        assert_eq!(got[10][..8], expected_row(0x0F, false)[..]);
    }

    #[test]
    fn test_stitch_mixed_widths_left_aligned() {
        let mut b = JobBuilder::new();
        b.raster(1, 1, &[0xFF]).raster(2, 1, &[0x00, 0xFF]);
        let job = b.build();

        let d = decoder();
        let bitmaps = extract_blocks(&job)
            .iter()
            .filter_map(|blk| d.decode_block(blk, &job, false))
            .collect();
        let stitched = d.stitch(bitmaps).unwrap();
        assert_eq!(d.ops().dimensions(&stitched), (16, 2));

        let got = rows(&d, &stitched);
        let mut first = vec![BLACK; 8];
        first.extend(vec![WHITE; 8]);
        assert_eq!(got[0], first);
    }

    #[test]
    fn test_stitch_empty() {
        assert!(decoder().stitch(Vec::new()).is_none());
    }

    #[test]
    fn test_black_ratio() {
        let d = decoder();
        let ops = d.ops();
        let bmp = ops.allocate(10, 10, PixelFormat::Argb8888);
        assert_eq!(d.black_ratio(&bmp), 0.0);

        let bmp = ops.write_pixel_block(bmp, &[BLACK; 10], 10, 0, 0, 10, 1);
        assert!((d.black_ratio(&bmp) - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_inverted_payload_is_retried() {
        // all-zero data decodes to pure white, so the inverted pass wins
        let mut b = JobBuilder::new();
        b.raster(4, 40, &[0x00; 160]);
        let d = decoder();
        let bmp = d.decode(&b.build()).unwrap();

        assert_eq!(d.ops().dimensions(&bmp), (32, 40));
        assert!(d.black_ratio(&bmp) > 0.99);
    }

    #[test]
    fn test_crop_keeps_margin() {
        let d = decoder();
        let ops = d.ops();
        let bmp = ops.allocate(8, 100, PixelFormat::Argb8888);
        let bmp = ops.write_pixel_block(bmp, &[BLACK; 8], 8, 0, 40, 8, 1);
        let bmp = ops.write_pixel_block(bmp, &[BLACK; 8], 8, 0, 50, 8, 1);

        let cropped = d.crop_whitespace(&bmp);
        // rows 30..=60
        assert_eq!(ops.dimensions(&cropped), (8, 31));
        let got = rows(&d, &cropped);
        assert_eq!(got[10], vec![BLACK; 8]);
        assert_eq!(got[20], vec![BLACK; 8]);
    }

    #[test]
    fn test_crop_clamps_to_edges() {
        let d = decoder();
        let ops = d.ops();
        let bmp = ops.allocate(8, 15, PixelFormat::Argb8888);
        let bmp = ops.write_pixel_block(bmp, &[BLACK; 8], 8, 0, 2, 8, 1);
        let cropped = d.crop_whitespace(&bmp);
        assert_eq!(ops.dimensions(&cropped), (8, 13));
    }

    #[test]
    fn test_crop_blank_keeps_full_image() {
        let d = decoder();
        let bmp = d.ops().allocate(8, 50, PixelFormat::Argb8888);
        let cropped = d.crop_whitespace(&bmp);
        assert_eq!(d.ops().dimensions(&cropped), (8, 50));
    }
}
