//! TIFF file reader implementation
//!
//! This module implements the TIFF/BigTIFF file reader that uses the
//! Strategy pattern to handle different byte orders.

use log::{debug, info, warn};
use std::io::SeekFrom;

use crate::io::seekable::SeekableReader;
use crate::io::byte_order::{ByteOrder, ByteOrderHandler};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::{IFD, IFDEntry};
use crate::tiff::types::TIFF;
use crate::tiff::validation;
use crate::utils::format_utils;
use crate::utils::ifd_utils;
use crate::utils::tag_utils;
use crate::utils::string_utils;

/// Reasonable limit to prevent looping on a corrupt IFD chain
const MAX_IFDS: usize = 100;

/// Reader for TIFF and BigTIFF files
///
/// After [`TiffReader::read`] has parsed the header, the reader keeps the
/// byte order strategy so that tag payloads and image data can be decoded
/// from the same source later.
pub struct TiffReader {
    /// Current byte order handler
    byte_order_handler: Option<Box<dyn ByteOrderHandler>>,
    /// Whether currently reading BigTIFF format
    is_big_tiff: bool,
}

impl TiffReader {
    /// Creates a new TIFF reader
    pub fn new() -> Self {
        TiffReader {
            byte_order_handler: None,
            is_big_tiff: false,
        }
    }

    /// Returns the byte order handler, or an error if no header was read yet
    pub fn handler(&self) -> TiffResult<&dyn ByteOrderHandler> {
        self.byte_order_handler.as_deref()
            .ok_or_else(|| TiffError::GenericError("Byte order not yet determined".to_string()))
    }

    /// Reads a TIFF file from the given reader
    ///
    /// 1. Detect byte order (little/big endian)
    /// 2. Check for TIFF or BigTIFF format
    /// 3. Read all IFDs (Image File Directories)
    pub fn read(&mut self, reader: &mut dyn SeekableReader) -> TiffResult<TIFF> {
        reader.seek(SeekFrom::Start(0))?;

        let handler = format_utils::detect_byte_order(reader)?;
        let (is_big_tiff, _) = format_utils::detect_tiff_format(reader, handler.as_ref())?;
        self.byte_order_handler = Some(handler);
        self.is_big_tiff = is_big_tiff;

        let mut tiff = TIFF::new(is_big_tiff);

        let first_ifd_offset = ifd_utils::read_ifd_offset(reader, is_big_tiff, self.handler()?)?;
        debug!("First IFD offset: {}", first_ifd_offset);

        let file_size = validation::get_file_size(reader)?;
        validation::validate_ifd_offset(first_ifd_offset, file_size)?;

        tiff.ifds = self.read_ifd_chain(reader, first_ifd_offset, file_size)?;

        info!("Read {} IFDs from {} file", tiff.ifds.len(), if is_big_tiff { "BigTIFF" } else { "TIFF" });
        Ok(tiff)
    }

    /// Reads a chain of IFDs starting from the given offset
    ///
    /// A broken link ends the chain with a warning; the IFDs read so far
    /// are still returned.
    fn read_ifd_chain(&self, reader: &mut dyn SeekableReader, first_ifd_offset: u64, file_size: u64) -> TiffResult<Vec<IFD>> {
        let mut ifds = Vec::new();
        let mut ifd_offset = first_ifd_offset;
        let handler = self.handler()?;

        while ifd_offset != 0 && ifds.len() < MAX_IFDS {
            if ifd_offset >= file_size {
                warn!("IFD offset {} exceeds file size {}, stopping IFD chain", ifd_offset, file_size);
                break;
            }

            let ifd = match self.read_ifd(reader, ifd_offset, ifds.len()) {
                Ok(ifd) => ifd,
                Err(e) => {
                    if ifds.is_empty() {
                        return Err(e);
                    }
                    warn!("Error reading IFD {}: {}", ifds.len(), e);
                    break;
                }
            };

            let next_offset_position = ifd_offset + ifd_utils::calculate_ifd_size(&ifd, self.is_big_tiff);
            ifds.push(ifd);

            if next_offset_position >= file_size {
                warn!("Next IFD offset position {} exceeds file size {}", next_offset_position, file_size);
                break;
            }

            reader.seek(SeekFrom::Start(next_offset_position))?;
            let next_ifd_offset = match ifd_utils::read_ifd_offset(reader, self.is_big_tiff, handler) {
                Ok(offset) => offset,
                Err(e) => {
                    warn!("Error reading next IFD offset: {}", e);
                    break;
                }
            };

            if next_ifd_offset != 0 && (next_ifd_offset >= file_size || next_ifd_offset < 8) {
                warn!("Invalid next IFD offset: {}, stopping IFD chain", next_ifd_offset);
                break;
            }

            ifd_offset = next_ifd_offset;
        }

        Ok(ifds)
    }

    /// Reads an IFD from the reader
    pub fn read_ifd(&self, reader: &mut dyn SeekableReader, offset: u64, number: usize) -> TiffResult<IFD> {
        reader.seek(SeekFrom::Start(offset))?;

        let entry_count = self.read_ifd_entry_count(reader)?;
        debug!("IFD #{} entry count: {}", number, entry_count);

        let mut ifd = IFD::new(number, offset);
        for _ in 0..entry_count {
            let entry = self.read_ifd_entry(reader)?;
            ifd.add_entry(entry);
        }

        Ok(ifd)
    }

    /// Reads the entry count from an IFD
    fn read_ifd_entry_count(&self, reader: &mut dyn SeekableReader) -> TiffResult<u64> {
        let handler = self.handler()?;
        let count = if self.is_big_tiff {
            handler.read_u64(reader)?
        } else {
            handler.read_u16(reader)? as u64
        };
        Ok(count)
    }

    /// Reads a single IFD entry
    fn read_ifd_entry(&self, reader: &mut dyn SeekableReader) -> TiffResult<IFDEntry> {
        let handler = self.handler()?;

        let tag = handler.read_u16(reader)?;
        let field_type = handler.read_u16(reader)?;
        let (count, raw_value) = if self.is_big_tiff {
            (handler.read_u64(reader)?, handler.read_u64(reader)?)
        } else {
            (handler.read_u32(reader)? as u64, handler.read_u32(reader)? as u64)
        };

        let mut entry = IFDEntry::new(tag, field_type, count, raw_value);
        entry.value_offset = self.normalize_scalar(&entry, raw_value, handler);
        Ok(entry)
    }

    /// Moves a single inline value into the low bits of the value field
    ///
    /// Big-endian files left-justify short values, so a SHORT of 5 reads
    /// back as 0x00050000 until it is shifted down.
    fn normalize_scalar(&self, entry: &IFDEntry, raw_value: u64, handler: &dyn ByteOrderHandler) -> u64 {
        let field_size = if self.is_big_tiff { 8 } else { 4 };
        let value_size = entry.get_field_type_size();
        let is_scalar = entry.count == 1 && value_size < field_size;

        match handler.byte_order() {
            ByteOrder::BigEndian if is_scalar => raw_value >> ((field_size - value_size) * 8),
            _ => raw_value,
        }
    }

    /// Reads the first value of an integer tag, if the tag is present
    pub fn read_tag_scalar(&self, reader: &mut dyn SeekableReader, ifd: &IFD, tag: u16) -> TiffResult<Option<u64>> {
        if !ifd.has_tag(tag) {
            return Ok(None);
        }
        Ok(self.read_tag_values(reader, ifd, tag)?.first().copied())
    }

    /// Reads a tag's value as a vector of u64
    ///
    /// Inline payloads holding several values (two SHORTs in a classic
    /// TIFF, for instance) are unpacked individually.
    pub fn read_tag_values(&self, reader: &mut dyn SeekableReader, ifd: &IFD, tag: u16) -> TiffResult<Vec<u64>> {
        let entry = ifd.get_entry(tag)
            .ok_or(TiffError::TagNotFound(tag))?;
        let handler = self.handler()?;

        let mut values = Vec::with_capacity(entry.count as usize);
        if entry.is_value_inline(self.is_big_tiff) {
            let mut inline = tag_utils::inline_value_reader(entry, handler, self.is_big_tiff);
            tag_utils::read_tag_value_array(&mut inline, entry, handler, &mut values)?;
        } else {
            reader.seek(SeekFrom::Start(entry.value_offset))?;
            tag_utils::read_tag_value_array(reader, entry, handler, &mut values)?;
        }

        Ok(values)
    }

    /// Reads a tag's value as a vector of f64
    pub fn read_tag_f64_values(&self, reader: &mut dyn SeekableReader, ifd: &IFD, tag: u16) -> TiffResult<Vec<f64>> {
        let entry = ifd.get_entry(tag)
            .ok_or(TiffError::TagNotFound(tag))?;
        let handler = self.handler()?;

        let mut values = Vec::with_capacity(entry.count as usize);
        if entry.is_value_inline(self.is_big_tiff) {
            let mut inline = tag_utils::inline_value_reader(entry, handler, self.is_big_tiff);
            tag_utils::read_tag_f64_array(&mut inline, entry, handler, &mut values)?;
        } else {
            reader.seek(SeekFrom::Start(entry.value_offset))?;
            tag_utils::read_tag_f64_array(reader, entry, handler, &mut values)?;
        }

        Ok(values)
    }

    /// Reads an ASCII tag, with trailing nulls removed
    pub fn read_tag_ascii(&self, reader: &mut dyn SeekableReader, ifd: &IFD, tag: u16) -> TiffResult<String> {
        let entry = ifd.get_entry(tag)
            .ok_or(TiffError::TagNotFound(tag))?;

        if entry.is_value_inline(self.is_big_tiff) {
            let handler = self.handler()?;
            let mut bytes = tag_utils::inline_value_reader(entry, handler, self.is_big_tiff).into_inner();
            bytes.truncate(entry.count as usize);
            return Self::bytes_to_string(bytes);
        }

        reader.seek(SeekFrom::Start(entry.value_offset))?;
        self.read_ascii_string(reader, entry.count)
    }

    /// Reads an ASCII string of `count` bytes at the current position
    pub fn read_ascii_string(&self, reader: &mut dyn SeekableReader, count: u64) -> TiffResult<String> {
        let mut buffer = vec![0u8; count as usize];
        reader.read_exact(&mut buffer)?;
        Self::bytes_to_string(buffer)
    }

    fn bytes_to_string(mut buffer: Vec<u8>) -> TiffResult<String> {
        string_utils::trim_trailing_nulls(&mut buffer);

        String::from_utf8(buffer)
            .map_err(|e| TiffError::GenericError(format!("Invalid UTF-8 string: {}", e)))
    }

    /// Returns whether the current file is a BigTIFF
    pub fn is_big_tiff(&self) -> bool {
        self.is_big_tiff
    }
}

impl Default for TiffReader {
    fn default() -> Self {
        Self::new()
    }
}
