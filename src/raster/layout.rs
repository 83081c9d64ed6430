//! Block layout of the first band
//!
//! Strips and tiles are both treated as rectangular blocks on a regular
//! grid. A strip is simply a block as wide as the image.

use log::debug;

use crate::io::seekable::SeekableReader;
use crate::tiff::constants::{planar_config, predictor, sample_format, tags};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::IFD;
use crate::tiff::reader::TiffReader;

/// Where the samples of the first band live and how they are encoded
#[derive(Debug, Clone)]
pub struct BlockLayout {
    pub width: u32,
    pub height: u32,
    pub block_width: u32,
    pub block_height: u32,
    pub blocks_across: u32,
    pub blocks_down: u32,
    /// Samples between two consecutive pixels of the first band inside a block
    pub stride: usize,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u64,
    pub predictor: u16,
    pub tiled: bool,
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
}

impl BlockLayout {
    /// Reads the layout of the image described by `ifd`
    pub fn from_ifd(reader: &mut dyn SeekableReader, tiff_reader: &TiffReader, ifd: &IFD) -> TiffResult<Self> {
        let scalar = |reader: &mut dyn SeekableReader, tag: u16| tiff_reader.read_tag_scalar(reader, ifd, tag);

        let width = scalar(reader, tags::IMAGE_WIDTH)?.ok_or(TiffError::MissingDimensions)?;
        let height = scalar(reader, tags::IMAGE_LENGTH)?.ok_or(TiffError::MissingDimensions)?;
        if width == 0 || height == 0 || width > u32::MAX as u64 || height > u32::MAX as u64 {
            return Err(TiffError::MissingDimensions);
        }
        let (width, height) = (width as u32, height as u32);

        let samples_per_pixel = scalar(reader, tags::SAMPLES_PER_PIXEL)?.unwrap_or(1).max(1) as usize;
        let bits_per_sample = scalar(reader, tags::BITS_PER_SAMPLE)?.unwrap_or(1) as u16;
        let format = scalar(reader, tags::SAMPLE_FORMAT)?.unwrap_or(sample_format::UNSIGNED as u64) as u16;
        check_sample_layout(bits_per_sample, format)?;

        let planar = scalar(reader, tags::PLANAR_CONFIGURATION)?.unwrap_or(planar_config::CHUNKY as u64) as u16;
        let stride = if planar == planar_config::PLANAR { 1 } else { samples_per_pixel };

        let compression = scalar(reader, tags::COMPRESSION)?.unwrap_or(1);
        let predictor = scalar(reader, tags::PREDICTOR)?.unwrap_or(predictor::NONE as u64) as u16;
        check_predictor(predictor, format)?;

        let tiled = ifd.is_tiled();
        let (block_width, block_height, offsets_tag, counts_tag) = if tiled {
            let tile_width = scalar(reader, tags::TILE_WIDTH)?.unwrap_or(0);
            let tile_height = scalar(reader, tags::TILE_LENGTH)?.unwrap_or(0);
            if tile_width == 0 || tile_height == 0 || tile_width > u32::MAX as u64 || tile_height > u32::MAX as u64 {
                return Err(TiffError::GenericError(format!("Invalid tile size {}x{}", tile_width, tile_height)));
            }
            (tile_width as u32, tile_height as u32, tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS)
        } else {
            let rows_per_strip = scalar(reader, tags::ROWS_PER_STRIP)?.unwrap_or(height as u64);
            let rows = rows_per_strip.clamp(1, height as u64) as u32;
            (width, rows, tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS)
        };

        let blocks_across = width.div_ceil(block_width);
        let blocks_down = height.div_ceil(block_height);

        let offsets = tiff_reader.read_tag_values(reader, ifd, offsets_tag)?;
        let byte_counts = tiff_reader.read_tag_values(reader, ifd, counts_tag)?;

        let layout = BlockLayout {
            width,
            height,
            block_width,
            block_height,
            blocks_across,
            blocks_down,
            stride,
            bits_per_sample,
            sample_format: format,
            compression,
            predictor,
            tiled,
            offsets,
            byte_counts,
        };

        let needed = layout.blocks_per_band();
        if layout.offsets.len() < needed || layout.byte_counts.len() < needed {
            return Err(TiffError::GenericError(format!(
                "Expected {} blocks for the first band, found {} offsets and {} byte counts",
                needed, layout.offsets.len(), layout.byte_counts.len())));
        }

        debug!("Block layout: {}x{} image, {}x{} {} ({}x{}), {} bits, format {}, compression {}, predictor {}",
               width, height, block_width, block_height, if tiled { "tiles" } else { "strips" },
               blocks_across, blocks_down, bits_per_sample, format, compression, predictor);

        Ok(layout)
    }

    /// Number of blocks holding the first band
    ///
    /// Planar images store each band in its own run of blocks, the first
    /// band coming first.
    pub fn blocks_per_band(&self) -> usize {
        self.blocks_across as usize * self.blocks_down as usize
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes in one decoded row of a block
    pub fn row_bytes(&self) -> usize {
        self.block_width as usize * self.stride * self.bytes_per_sample()
    }

    /// Rows actually stored in a block
    ///
    /// Tiles are always padded to full size, while the last strip stops at
    /// the bottom of the image.
    pub fn block_rows(&self, index: usize) -> usize {
        if self.tiled {
            return self.block_height as usize;
        }
        let first_row = (index / self.blocks_across as usize) * self.block_height as usize;
        (self.height as usize - first_row).min(self.block_height as usize)
    }

    /// Decoded size of a block in bytes
    pub fn expected_block_len(&self, index: usize) -> usize {
        self.block_rows(index) * self.row_bytes()
    }

    /// Block index and sample position inside the decoded block for a cell
    pub fn locate(&self, row: u32, col: u32) -> (usize, usize) {
        let block_row = (row / self.block_height) as usize;
        let block_col = (col / self.block_width) as usize;
        let block = block_row * self.blocks_across as usize + block_col;

        let row_in_block = (row % self.block_height) as usize;
        let col_in_block = (col % self.block_width) as usize;
        let sample = (row_in_block * self.block_width as usize + col_in_block) * self.stride;

        (block, sample)
    }
}

fn check_sample_layout(bits: u16, format: u16) -> TiffResult<()> {
    let supported = match format {
        sample_format::UNSIGNED | sample_format::SIGNED => matches!(bits, 8 | 16 | 32 | 64),
        sample_format::IEEEFP => matches!(bits, 32 | 64),
        _ => false,
    };
    if supported {
        Ok(())
    } else {
        Err(TiffError::UnsupportedSampleFormat(bits, format))
    }
}

fn check_predictor(value: u16, format: u16) -> TiffResult<()> {
    match value {
        predictor::NONE | predictor::HORIZONTAL_DIFFERENCING => Ok(()),
        predictor::FLOATING_POINT if format == sample_format::IEEEFP => Ok(()),
        _ => Err(TiffError::GenericError(format!(
            "Unsupported predictor {} for sample format {}", value, format))),
    }
}
