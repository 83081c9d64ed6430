use std::io::Cursor;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::tiff::constants::{field_types, tags};

/// Builds small classic TIFF files in memory
///
/// Image blocks are laid out right after the header, followed by the IFD
/// and any tag payloads too large to store inline. Offsets and byte
/// counts for the blocks are added automatically.
pub struct TiffFixture {
    big_endian: bool,
    entries: Vec<(u16, u16, u32, Vec<u8>)>,
    blocks: Vec<Vec<u8>>,
    tiled: bool,
}

impl TiffFixture {
    pub fn new(big_endian: bool) -> Self {
        TiffFixture { big_endian, entries: Vec::new(), blocks: Vec::new(), tiled: false }
    }

    pub fn shorts(mut self, tag: u16, values: &[u16]) -> Self {
        let mut bytes = Vec::new();
        for &v in values {
            put_u16(&mut bytes, v, self.big_endian);
        }
        self.entries.push((tag, field_types::SHORT, values.len() as u32, bytes));
        self
    }

    pub fn longs(mut self, tag: u16, values: &[u32]) -> Self {
        let mut bytes = Vec::new();
        for &v in values {
            put_u32(&mut bytes, v, self.big_endian);
        }
        self.entries.push((tag, field_types::LONG, values.len() as u32, bytes));
        self
    }

    pub fn doubles(mut self, tag: u16, values: &[f64]) -> Self {
        let bytes = encode_f64s(values, self.big_endian);
        self.entries.push((tag, field_types::DOUBLE, values.len() as u32, bytes));
        self
    }

    pub fn ascii(mut self, tag: u16, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.entries.push((tag, field_types::ASCII, bytes.len() as u32, bytes));
        self
    }

    pub fn strips(mut self, blocks: Vec<Vec<u8>>) -> Self {
        self.blocks = blocks;
        self.tiled = false;
        self
    }

    pub fn tiles(mut self, blocks: Vec<Vec<u8>>) -> Self {
        self.blocks = blocks;
        self.tiled = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let be = self.big_endian;
        let mut buf = Vec::new();
        buf.extend_from_slice(if be { b"MM" } else { b"II" });
        put_u16(&mut buf, 42, be);
        put_u32(&mut buf, 0, be);

        let mut offsets = Vec::new();
        let mut counts = Vec::new();
        for block in &self.blocks {
            offsets.push(buf.len() as u32);
            counts.push(block.len() as u32);
            buf.extend_from_slice(block);
        }
        if buf.len() % 2 == 1 {
            buf.push(0);
        }

        let mut fixture = self;
        if !fixture.blocks.is_empty() {
            let (offset_tag, count_tag) = if fixture.tiled {
                (tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS)
            } else {
                (tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS)
            };
            fixture = fixture.longs(offset_tag, &offsets).longs(count_tag, &counts);
        }
        let mut entries = fixture.entries;
        entries.sort_by_key(|e| e.0);

        let ifd_offset = buf.len() as u32;
        buf[4..8].copy_from_slice(&if be { ifd_offset.to_be_bytes() } else { ifd_offset.to_le_bytes() });

        let mut overflow_at = ifd_offset + 2 + 12 * entries.len() as u32 + 4;
        let mut overflow = Vec::new();

        put_u16(&mut buf, entries.len() as u16, be);
        for (tag, field_type, count, bytes) in &entries {
            put_u16(&mut buf, *tag, be);
            put_u16(&mut buf, *field_type, be);
            put_u32(&mut buf, *count, be);
            if bytes.len() <= 4 {
                let mut inline = bytes.clone();
                inline.resize(4, 0);
                buf.extend_from_slice(&inline);
            } else {
                put_u32(&mut buf, overflow_at, be);
                overflow.extend_from_slice(bytes);
                if bytes.len() % 2 == 1 {
                    overflow.push(0);
                }
                overflow_at = ifd_offset + 2 + 12 * entries.len() as u32 + 4 + overflow.len() as u32;
            }
        }
        put_u32(&mut buf, 0, be);
        buf.extend_from_slice(&overflow);
        buf
    }

    pub fn build_cursor(self) -> Cursor<Vec<u8>> {
        Cursor::new(self.build())
    }
}

pub fn put_u16(buf: &mut Vec<u8>, v: u16, big_endian: bool) {
    if big_endian {
        buf.write_u16::<BigEndian>(v).unwrap();
    } else {
        buf.write_u16::<LittleEndian>(v).unwrap();
    }
}

pub fn put_u32(buf: &mut Vec<u8>, v: u32, big_endian: bool) {
    if big_endian {
        buf.write_u32::<BigEndian>(v).unwrap();
    } else {
        buf.write_u32::<LittleEndian>(v).unwrap();
    }
}

pub fn encode_f32s(values: &[f32], big_endian: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    for &v in values {
        if big_endian {
            buf.write_f32::<BigEndian>(v).unwrap();
        } else {
            buf.write_f32::<LittleEndian>(v).unwrap();
        }
    }
    buf
}

pub fn encode_f64s(values: &[f64], big_endian: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    for &v in values {
        if big_endian {
            buf.write_f64::<BigEndian>(v).unwrap();
        } else {
            buf.write_f64::<LittleEndian>(v).unwrap();
        }
    }
    buf
}

pub fn encode_i16s(values: &[i16], big_endian: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    for &v in values {
        if big_endian {
            buf.write_i16::<BigEndian>(v).unwrap();
        } else {
            buf.write_i16::<LittleEndian>(v).unwrap();
        }
    }
    buf
}

/// A minimal single-strip float32 GeoTIFF with tiepoint and pixel scale
///
/// The grid's top-left corner sits at (`origin_x`, `origin_y`) and
/// `values` are laid out row by row from the top.
pub fn float_geotiff(width: u32, height: u32, values: &[f32], origin_x: f64, origin_y: f64, cell: f64) -> TiffFixture {
    TiffFixture::new(false)
        .longs(tags::IMAGE_WIDTH, &[width])
        .longs(tags::IMAGE_LENGTH, &[height])
        .shorts(tags::BITS_PER_SAMPLE, &[32])
        .shorts(tags::COMPRESSION, &[1])
        .shorts(tags::SAMPLES_PER_PIXEL, &[1])
        .longs(tags::ROWS_PER_STRIP, &[height])
        .shorts(tags::SAMPLE_FORMAT, &[3])
        .doubles(tags::MODEL_PIXEL_SCALE_TAG, &[cell, cell, 0.0])
        .doubles(tags::MODEL_TIEPOINT_TAG, &[0.0, 0.0, 0.0, origin_x, origin_y, 0.0])
        .strips(vec![encode_f32s(values, false)])
}

/// Creates a test buffer with BigTIFF header and sample data
pub fn create_test_bigtiff_buffer() -> Cursor<Vec<u8>> {
    let mut buffer = Vec::new();

    buffer.write_u16::<LittleEndian>(0x4949).unwrap(); // II for little-endian
    buffer.write_u16::<LittleEndian>(43).unwrap();     // BigTIFF version
    buffer.write_u16::<LittleEndian>(8).unwrap();      // Offset size
    buffer.write_u16::<LittleEndian>(0).unwrap();      // Reserved
    buffer.write_u64::<LittleEndian>(16).unwrap();     // IFD offset

    buffer.write_u64::<LittleEndian>(3).unwrap();      // Entry count

    // ImageWidth
    buffer.write_u16::<LittleEndian>(256).unwrap();
    buffer.write_u16::<LittleEndian>(4).unwrap();
    buffer.write_u64::<LittleEndian>(1).unwrap();
    buffer.write_u64::<LittleEndian>(1024).unwrap();

    // ImageLength
    buffer.write_u16::<LittleEndian>(257).unwrap();
    buffer.write_u16::<LittleEndian>(4).unwrap();
    buffer.write_u64::<LittleEndian>(1).unwrap();
    buffer.write_u64::<LittleEndian>(768).unwrap();

    // ModelPixelScale, three DOUBLEs stored out of line
    buffer.write_u16::<LittleEndian>(33550).unwrap();
    buffer.write_u16::<LittleEndian>(12).unwrap();
    buffer.write_u64::<LittleEndian>(3).unwrap();
    buffer.write_u64::<LittleEndian>(16 + 8 + 3 * 20 + 8).unwrap();

    buffer.write_u64::<LittleEndian>(0).unwrap();      // No more IFDs

    buffer.write_f64::<LittleEndian>(2.5).unwrap();
    buffer.write_f64::<LittleEndian>(2.5).unwrap();
    buffer.write_f64::<LittleEndian>(0.0).unwrap();

    Cursor::new(buffer)
}
