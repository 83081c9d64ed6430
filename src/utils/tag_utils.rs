//! TIFF tag utilities
//!
//! Decoding of tag payloads and human-readable names for tags, field
//! types and compression codes.

use std::io::Cursor;
use byteorder::ReadBytesExt;

use crate::io::seekable::SeekableReader;
use crate::io::byte_order::ByteOrderHandler;
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::IFDEntry;
use crate::tiff::constants::{compression, field_types, tags};

/// Reads an array of integer tag values based on the field type
///
/// RATIONAL values are packed as `numerator << 32 | denominator`.
pub fn read_tag_value_array(
    reader: &mut dyn SeekableReader,
    entry: &IFDEntry,
    handler: &dyn ByteOrderHandler,
    values: &mut Vec<u64>,
) -> TiffResult<()> {
    for _ in 0..entry.count {
        let value = match entry.field_type {
            field_types::BYTE | field_types::SBYTE | field_types::UNDEFINED | field_types::ASCII => {
                reader.read_u8()? as u64
            },
            field_types::SHORT | field_types::SSHORT => handler.read_u16(reader)? as u64,
            field_types::LONG | field_types::SLONG | field_types::FLOAT => handler.read_u32(reader)? as u64,
            field_types::RATIONAL | field_types::SRATIONAL => {
                let num = handler.read_u32(reader)?;
                let den = handler.read_u32(reader)?;
                ((num as u64) << 32) | (den as u64)
            },
            field_types::LONG8 | field_types::SLONG8 | field_types::IFD8 => handler.read_u64(reader)?,
            _ => return Err(TiffError::UnsupportedFieldType(entry.field_type)),
        };

        values.push(value);
    }

    Ok(())
}

/// Reads an array of tag values as floating point numbers
///
/// Used for the GeoTIFF model tags, which are DOUBLE in practice but
/// occasionally written as FLOAT or as integers.
pub fn read_tag_f64_array(
    reader: &mut dyn SeekableReader,
    entry: &IFDEntry,
    handler: &dyn ByteOrderHandler,
    values: &mut Vec<f64>,
) -> TiffResult<()> {
    for _ in 0..entry.count {
        let value = match entry.field_type {
            field_types::DOUBLE => handler.read_f64(reader)?,
            field_types::FLOAT => handler.read_f32(reader)? as f64,
            field_types::BYTE | field_types::UNDEFINED => reader.read_u8()? as f64,
            field_types::SBYTE => reader.read_i8()? as f64,
            field_types::SHORT => handler.read_u16(reader)? as f64,
            field_types::SSHORT => handler.read_i16(reader)? as f64,
            field_types::LONG => handler.read_u32(reader)? as f64,
            field_types::SLONG => handler.read_i32(reader)? as f64,
            field_types::LONG8 => handler.read_u64(reader)? as f64,
            field_types::SLONG8 => handler.read_i64(reader)? as f64,
            field_types::RATIONAL => {
                let num = handler.read_u32(reader)? as f64;
                let den = handler.read_u32(reader)? as f64;
                num / den
            },
            field_types::SRATIONAL => {
                let num = handler.read_i32(reader)? as f64;
                let den = handler.read_i32(reader)? as f64;
                num / den
            },
            _ => return Err(TiffError::UnsupportedFieldType(entry.field_type)),
        };

        values.push(value);
    }

    Ok(())
}

/// Wraps the bytes of an inline value in a reader so that inline
/// values decode through the same paths as out-of-line ones
///
/// Single values were already normalized when the entry was read; packed
/// payloads are still laid out as in the file.
pub fn inline_value_reader(entry: &IFDEntry, handler: &dyn ByteOrderHandler, is_big_tiff: bool) -> Cursor<Vec<u8>> {
    let byte_order = handler.byte_order();
    let bytes = if entry.count == 1 {
        byte_order.scalar_bytes(entry.value_offset, entry.get_field_type_size())
    } else {
        byte_order.inline_bytes(entry.value_offset, is_big_tiff)
    };
    Cursor::new(bytes)
}

/// Get the name of a TIFF tag
pub fn get_tag_name(tag: u16) -> &'static str {
    match tag {
        tags::NEW_SUBFILE_TYPE => "NewSubfileType",
        tags::IMAGE_WIDTH => "ImageWidth",
        tags::IMAGE_LENGTH => "ImageLength",
        tags::BITS_PER_SAMPLE => "BitsPerSample",
        tags::COMPRESSION => "Compression",
        tags::PHOTOMETRIC_INTERPRETATION => "PhotometricInterpretation",
        tags::STRIP_OFFSETS => "StripOffsets",
        tags::SAMPLES_PER_PIXEL => "SamplesPerPixel",
        tags::ROWS_PER_STRIP => "RowsPerStrip",
        tags::STRIP_BYTE_COUNTS => "StripByteCounts",
        tags::PLANAR_CONFIGURATION => "PlanarConfiguration",
        tags::PREDICTOR => "Predictor",
        tags::TILE_WIDTH => "TileWidth",
        tags::TILE_LENGTH => "TileLength",
        tags::TILE_OFFSETS => "TileOffsets",
        tags::TILE_BYTE_COUNTS => "TileByteCounts",
        tags::SAMPLE_FORMAT => "SampleFormat",

        tags::MODEL_PIXEL_SCALE_TAG => "ModelPixelScale",
        tags::MODEL_TIEPOINT_TAG => "ModelTiepoint",
        tags::MODEL_TRANSFORMATION_TAG => "ModelTransformation",
        tags::GEO_KEY_DIRECTORY_TAG => "GeoKeyDirectory",
        tags::GEO_DOUBLE_PARAMS_TAG => "GeoDoubleParams",
        tags::GEO_ASCII_PARAMS_TAG => "GeoAsciiParams",

        tags::GDAL_METADATA => "GDALMetadata",
        tags::GDAL_NODATA => "GDALNoData",

        _ => "Unknown",
    }
}

/// Get the name of a TIFF field type
pub fn get_field_type_name(field_type: u16) -> &'static str {
    match field_type {
        field_types::BYTE => "BYTE",
        field_types::ASCII => "ASCII",
        field_types::SHORT => "SHORT",
        field_types::LONG => "LONG",
        field_types::RATIONAL => "RATIONAL",
        field_types::SBYTE => "SBYTE",
        field_types::UNDEFINED => "UNDEFINED",
        field_types::SSHORT => "SSHORT",
        field_types::SLONG => "SLONG",
        field_types::SRATIONAL => "SRATIONAL",
        field_types::FLOAT => "FLOAT",
        field_types::DOUBLE => "DOUBLE",
        field_types::LONG8 => "LONG8",
        field_types::SLONG8 => "SLONG8",
        field_types::IFD8 => "IFD8",
        _ => "Unknown",
    }
}

/// Get the name of a compression method
pub fn get_compression_name(compression_code: u64) -> &'static str {
    match compression_code as u16 {
        compression::NONE => "None",
        compression::LZW => "LZW",
        compression::JPEG => "JPEG",
        compression::DEFLATE | compression::DEFLATE_OLD => "Deflate",
        compression::ZSTD => "Zstandard",
        compression::PACKBITS => "PackBits",
        _ => "Unknown",
    }
}
