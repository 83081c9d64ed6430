//! Strip and tile decoding
//!
//! A block goes through three steps: read the stored bytes, decompress
//! them, then undo the predictor. The result keeps the file's byte order
//! and is only turned into numbers one sample at a time.

use byteorder::{ByteOrder as Endian, BE, LE};
use log::trace;
use std::io::SeekFrom;

use crate::compression::{CompressionFactory, CompressionHandler};
use crate::io::byte_order::ByteOrder;
use crate::io::seekable::SeekableReader;
use crate::tiff::constants::{predictor, sample_format};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::validation;

use super::layout::BlockLayout;

/// Decodes blocks of one image
pub struct BlockDecoder {
    compression: Box<dyn CompressionHandler>,
    byte_order: ByteOrder,
}

impl BlockDecoder {
    pub fn new(layout: &BlockLayout, byte_order: ByteOrder) -> TiffResult<Self> {
        let compression = CompressionFactory::create_handler(layout.compression)?;
        Ok(BlockDecoder { compression, byte_order })
    }

    pub fn compression_name(&self) -> &'static str {
        self.compression.name()
    }

    /// Reads and fully decodes block `index`
    pub fn decode(
        &self,
        reader: &mut dyn SeekableReader,
        layout: &BlockLayout,
        index: usize,
        file_size: u64,
    ) -> TiffResult<Vec<u8>> {
        let offset = layout.offsets[index];
        let byte_count = layout.byte_counts[index];
        validation::validate_block_range(offset, byte_count, file_size)?;

        trace!("Reading block {} at offset {} ({} bytes)", index, offset, byte_count);
        reader.seek(SeekFrom::Start(offset))?;
        let mut stored = vec![0u8; byte_count as usize];
        reader.read_exact(&mut stored)?;

        let mut data = self.compression.decompress(&stored)?;
        let expected = layout.expected_block_len(index);
        if data.len() < expected {
            return Err(TiffError::GenericError(format!(
                "Block {} decoded to {} bytes, expected {}", index, data.len(), expected)));
        }
        data.truncate(expected);

        let row_bytes = layout.row_bytes();
        let bytes_per_sample = layout.bytes_per_sample();
        match layout.predictor {
            predictor::HORIZONTAL_DIFFERENCING => {
                for row in data.chunks_exact_mut(row_bytes) {
                    match self.byte_order {
                        ByteOrder::LittleEndian => undo_horizontal::<LE>(row, layout.stride, bytes_per_sample),
                        ByteOrder::BigEndian => undo_horizontal::<BE>(row, layout.stride, bytes_per_sample),
                    }
                }
            },
            predictor::FLOATING_POINT => {
                for row in data.chunks_exact_mut(row_bytes) {
                    undo_floating_point(row, layout.stride, bytes_per_sample, self.byte_order);
                }
            },
            _ => {}
        }

        Ok(data)
    }

    /// Value of the sample at position `sample` of a decoded block
    pub fn sample_at(&self, data: &[u8], layout: &BlockLayout, sample: usize) -> TiffResult<f64> {
        let size = layout.bytes_per_sample();
        let start = sample * size;
        let bytes = data.get(start..start + size).ok_or_else(|| TiffError::GenericError(format!(
            "Sample {} lies outside the decoded block ({} bytes)", sample, data.len())))?;

        Ok(match self.byte_order {
            ByteOrder::LittleEndian => sample_value::<LE>(bytes, layout.sample_format),
            ByteOrder::BigEndian => sample_value::<BE>(bytes, layout.sample_format),
        })
    }
}

fn sample_value<E: Endian>(bytes: &[u8], format: u16) -> f64 {
    match (format, bytes.len()) {
        (sample_format::IEEEFP, 4) => E::read_f32(bytes) as f64,
        (sample_format::IEEEFP, _) => E::read_f64(bytes),
        (sample_format::SIGNED, n) => E::read_int(bytes, n) as f64,
        (_, n) => E::read_uint(bytes, n) as f64,
    }
}

/// Reverses horizontal differencing on one row
///
/// Each sample was stored as the difference to the sample one pixel to
/// the left, with wrapping arithmetic at the sample's width.
fn undo_horizontal<E: Endian>(row: &mut [u8], stride: usize, size: usize) {
    let mask = if size == 8 { u64::MAX } else { (1u64 << (size * 8)) - 1 };
    let step = stride * size;
    let end = row.len() - row.len() % size;

    for i in (step..end).step_by(size) {
        let previous = E::read_uint(&row[i - step..], size);
        let current = E::read_uint(&row[i..], size);
        E::write_uint(&mut row[i..], current.wrapping_add(previous) & mask, size);
    }
}

/// Reverses the floating point predictor on one row
///
/// The encoder split every value into byte planes, most significant
/// byte first, and then differenced the bytes. After summing the bytes
/// back up, each value is reassembled and written in the file's byte
/// order.
fn undo_floating_point(row: &mut [u8], stride: usize, size: usize, byte_order: ByteOrder) {
    for i in stride..row.len() {
        row[i] = row[i].wrapping_add(row[i - stride]);
    }

    let count = row.len() / size;
    let planes = row.to_vec();
    for value in 0..count {
        for byte in 0..size {
            let significance = match byte_order {
                ByteOrder::BigEndian => byte,
                ByteOrder::LittleEndian => size - byte - 1,
            };
            row[value * size + byte] = planes[significance * count + value];
        }
    }
}
