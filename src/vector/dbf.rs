//! dBase III attribute tables of shapefiles
//!
//! Supports character, numeric, float, logical and date fields. Values
//! are stored as fixed-width text, so each field keeps the width and
//! decimal count it was read with when written back.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::Datelike;
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::errors::{ElevError, ElevResult};
use crate::utils::string_utils;
use crate::vector::types::{AttributeValue, FieldDef, FieldType, PointRecord};

const HEADER_SIZE: usize = 32;
const DESCRIPTOR_SIZE: usize = 32;
const HEADER_TERMINATOR: u8 = 0x0D;
const END_OF_FILE: u8 = 0x1A;
const DELETED: u8 = b'*';

/// Longest field name a DBF header can hold
pub const MAX_FIELD_NAME_BYTES: usize = 10;

/// Text encoding declared by a `.cpg` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
    Windows1252,
}

/// Windows-1252 characters for bytes 0x80 to 0x9F; unassigned bytes map to
/// the C1 control of the same value
const WINDOWS_1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

impl TextEncoding {
    /// Picks the encoding for a code page name; UTF-8 when there is none
    pub fn from_codepage(codepage: Option<&str>) -> Self {
        let Some(name) = codepage.map(|c| c.trim().to_ascii_uppercase()) else {
            return TextEncoding::Utf8;
        };
        match name.as_str() {
            "UTF-8" | "UTF8" | "65001" => TextEncoding::Utf8,
            "ISO-8859-1" | "ISO88591" | "8859_1" | "88591" | "LATIN1" => TextEncoding::Latin1,
            "1252" | "CP1252" | "ANSI 1252" | "WINDOWS-1252" => TextEncoding::Windows1252,
            other => {
                warn!("Unknown DBF code page {:?}, reading text as UTF-8", other);
                TextEncoding::Utf8
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            TextEncoding::Windows1252 => bytes.iter()
                .map(|&b| match b {
                    0x80..=0x9F => WINDOWS_1252_HIGH[(b - 0x80) as usize],
                    _ => b as char,
                })
                .collect(),
        }
    }

    /// The single byte for `c`, or `?` when the code page lacks it
    fn encode_char(&self, c: char) -> u8 {
        match self {
            TextEncoding::Windows1252 => match WINDOWS_1252_HIGH.iter().position(|&high| high == c) {
                Some(offset) => 0x80 + offset as u8,
                None if ('\u{80}'..='\u{9F}').contains(&c) => b'?',
                None => u8::try_from(u32::from(c)).unwrap_or(b'?'),
            },
            _ => u8::try_from(u32::from(c)).unwrap_or(b'?'),
        }
    }

    /// Encodes text into exactly `width` bytes, space padded
    fn encode_fixed(&self, text: &str, width: usize) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => string_utils::to_fixed_width(text, width, b' '),
            TextEncoding::Latin1 | TextEncoding::Windows1252 => {
                let mut bytes: Vec<u8> = text.chars()
                    .map(|c| self.encode_char(c))
                    .take(width)
                    .collect();
                bytes.resize(width, b' ');
                bytes
            }
        }
    }
}

/// One parsed row; deleted rows are kept so they can be matched to shapes
#[derive(Debug, Clone, PartialEq)]
pub struct DbfRow {
    pub deleted: bool,
    pub values: HashMap<String, AttributeValue>,
}

/// Field layout as stored in the header
#[derive(Debug, Clone)]
struct DbfField {
    name: String,
    kind: u8,
    width: usize,
    decimals: u8,
}

/// Reads a complete DBF file
pub fn read(path: &Path, encoding: TextEncoding) -> ElevResult<(Vec<FieldDef>, Vec<DbfRow>)> {
    let bytes = std::fs::read(path).map_err(|e| ElevError::io(path, e))?;
    parse(&bytes, encoding).map_err(|e| match e {
        DbfError::Corrupt(message) => ElevError::io(path, message),
        DbfError::Schema(message) => ElevError::schema(path, message),
    })
}

enum DbfError {
    Corrupt(String),
    Schema(String),
}

impl From<std::io::Error> for DbfError {
    fn from(e: std::io::Error) -> Self {
        DbfError::Corrupt(format!("truncated DBF file: {}", e))
    }
}

fn parse(bytes: &[u8], encoding: TextEncoding) -> Result<(Vec<FieldDef>, Vec<DbfRow>), DbfError> {
    let mut cursor = Cursor::new(bytes);
    let version = cursor.read_u8()?;
    if version & 0x07 != 0x03 {
        return Err(DbfError::Corrupt(format!("unsupported DBF version byte {:#04x}", version)));
    }
    cursor.set_position(4);
    let record_count = cursor.read_u32::<LittleEndian>()? as usize;
    let header_len = cursor.read_u16::<LittleEndian>()? as usize;
    let record_len = cursor.read_u16::<LittleEndian>()? as usize;

    let mut fields = Vec::new();
    let mut position = HEADER_SIZE;
    while position + DESCRIPTOR_SIZE <= header_len && bytes.get(position) != Some(&HEADER_TERMINATOR) {
        let descriptor = bytes.get(position..position + DESCRIPTOR_SIZE)
            .ok_or_else(|| DbfError::Corrupt("truncated field descriptor".to_string()))?;
        let name_end = descriptor[..11].iter().position(|&b| b == 0).unwrap_or(11);
        fields.push(DbfField {
            name: encoding.decode(&descriptor[..name_end]).trim().to_string(),
            kind: descriptor[11].to_ascii_uppercase(),
            width: descriptor[16] as usize,
            decimals: descriptor[17],
        });
        position += DESCRIPTOR_SIZE;
    }

    let stored_len = 1 + fields.iter().map(|f| f.width).sum::<usize>();
    if stored_len != record_len {
        return Err(DbfError::Corrupt(format!(
            "record length {} does not match the field widths ({})", record_len, stored_len)));
    }

    let defs = fields.iter().map(field_def).collect::<Result<Vec<_>, _>>()?;
    debug!("DBF: {} fields, {} records of {} bytes", fields.len(), record_count, record_len);

    let mut rows = Vec::with_capacity(record_count);
    let mut record = vec![0u8; record_len];
    cursor.set_position(header_len as u64);
    for _ in 0..record_count {
        cursor.read_exact(&mut record)?;
        let mut values = HashMap::with_capacity(fields.len());
        let mut offset = 1;
        for (field, def) in fields.iter().zip(&defs) {
            let raw = &record[offset..offset + field.width];
            values.insert(def.name.clone(), parse_value(raw, field, encoding));
            offset += field.width;
        }
        rows.push(DbfRow { deleted: record[0] == DELETED, values });
    }

    Ok((defs, rows))
}

fn field_def(field: &DbfField) -> Result<FieldDef, DbfError> {
    let field_type = match field.kind {
        b'C' => FieldType::Text,
        b'N' if field.decimals == 0 && field.width <= 18 => FieldType::Integer,
        b'N' | b'F' => FieldType::Real,
        b'L' => FieldType::Boolean,
        b'D' => FieldType::Date,
        other => {
            return Err(DbfError::Schema(format!(
                "field {} has unsupported DBF type '{}'", field.name, other as char)));
        }
    };

    let mut def = FieldDef::new(field.name.clone(), field_type).with_width(field.width as u8, field.decimals);
    def.native_type = Some((field.kind as char).to_string());
    Ok(def)
}

fn parse_value(raw: &[u8], field: &DbfField, encoding: TextEncoding) -> AttributeValue {
    let text = string_utils::trim_fixed_width(raw);
    if text.is_empty() {
        return AttributeValue::Null;
    }

    match field.kind {
        b'C' => {
            // Leading blanks are data in character fields
            let end = raw.iter().rposition(|&b| b != b' ' && b != 0).map(|i| i + 1).unwrap_or(0);
            AttributeValue::Text(encoding.decode(&raw[..end]))
        },
        b'N' | b'F' => {
            let text = String::from_utf8_lossy(text);
            if text.bytes().all(|b| b == b'*') {
                return AttributeValue::Null;
            }
            let parsed = if field.kind == b'N' && field.decimals == 0 && field.width <= 18 {
                text.parse::<i64>().ok().map(AttributeValue::Integer)
                    .or_else(|| text.parse::<f64>().ok().map(|v| AttributeValue::Integer(v as i64)))
            } else {
                text.parse::<f64>().ok().map(AttributeValue::Real)
            };
            parsed.unwrap_or_else(|| {
                warn!("Unparseable number {:?} in field {}", text, field.name);
                AttributeValue::Null
            })
        },
        b'L' => match text[0] {
            b'T' | b't' | b'Y' | b'y' => AttributeValue::Boolean(true),
            b'F' | b'f' | b'N' | b'n' => AttributeValue::Boolean(false),
            _ => AttributeValue::Null,
        },
        b'D' => {
            let digits = String::from_utf8_lossy(text);
            if digits.len() == 8 && digits != "00000000" && digits.bytes().all(|b| b.is_ascii_digit()) {
                AttributeValue::Text(format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..]))
            } else {
                AttributeValue::Null
            }
        },
        _ => AttributeValue::Null,
    }
}

/// Writes `records` as a DBF file with the given schema
pub fn write(path: &Path, fields: &[FieldDef], records: &[PointRecord], encoding: TextEncoding) -> ElevResult<()> {
    let layout = fields.iter()
        .map(|def| storage_for(def).map_err(|m| ElevError::schema(path, m)))
        .collect::<ElevResult<Vec<_>>>()?;
    let bytes = encode(&layout, fields, records, encoding).map_err(|m| ElevError::schema(path, m))?;
    std::fs::write(path, bytes).map_err(|e| ElevError::io(path, e))
}

/// Storage layout for a field, from what was read or else its type
fn storage_for(def: &FieldDef) -> Result<DbfField, String> {
    if def.name.is_empty() || def.name.len() > MAX_FIELD_NAME_BYTES {
        return Err(format!("field name {:?} must be 1 to {} bytes for a DBF table", def.name, MAX_FIELD_NAME_BYTES));
    }

    let native = def.native_type.as_deref()
        .filter(|t| t.len() == 1)
        .map(|t| t.as_bytes()[0]);
    let (kind, width, decimals) = match (def.field_type, native) {
        (FieldType::Text, _) => (b'C', def.width.unwrap_or(254), 0),
        (FieldType::Integer, _) => (b'N', def.width.unwrap_or(18), 0),
        (FieldType::Real, Some(b'F')) => (b'F', def.width.unwrap_or(24), def.precision.unwrap_or(15)),
        (FieldType::Real, _) => (b'N', def.width.unwrap_or(24), def.precision.unwrap_or(15)),
        (FieldType::Boolean, _) => (b'L', 1, 0),
        (FieldType::Date, _) => (b'D', 8, 0),
        (FieldType::Blob, _) => return Err(format!("field {} holds binary data, which DBF cannot store", def.name)),
    };

    Ok(DbfField { name: def.name.clone(), kind, width: width.max(1) as usize, decimals })
}

fn encode(layout: &[DbfField], fields: &[FieldDef], records: &[PointRecord], encoding: TextEncoding) -> Result<Vec<u8>, String> {
    let header_len = HEADER_SIZE + DESCRIPTOR_SIZE * layout.len() + 1;
    let record_len = 1 + layout.iter().map(|f| f.width).sum::<usize>();
    if header_len > u16::MAX as usize || record_len > u16::MAX as usize {
        return Err("too many or too wide fields for a DBF table".to_string());
    }

    let today = chrono::Local::now().date_naive();
    let mut out = Vec::with_capacity(header_len + record_len * records.len() + 1);
    out.push(0x03);
    out.push((today.year() - 1900).clamp(0, 255) as u8);
    out.push(today.month() as u8);
    out.push(today.day() as u8);
    out.write_u32::<LittleEndian>(records.len() as u32).map_err(|e| e.to_string())?;
    out.write_u16::<LittleEndian>(header_len as u16).map_err(|e| e.to_string())?;
    out.write_u16::<LittleEndian>(record_len as u16).map_err(|e| e.to_string())?;
    out.resize(HEADER_SIZE, 0);

    for field in layout {
        let mut descriptor = vec![0u8; DESCRIPTOR_SIZE];
        descriptor[..field.name.len()].copy_from_slice(field.name.as_bytes());
        descriptor[11] = field.kind;
        descriptor[16] = field.width as u8;
        descriptor[17] = field.decimals;
        out.extend_from_slice(&descriptor);
    }
    out.push(HEADER_TERMINATOR);

    for record in records {
        out.push(b' ');
        for (field, def) in layout.iter().zip(fields) {
            out.extend(format_value(record.value(&def.name), field, encoding)?);
        }
    }
    out.push(END_OF_FILE);
    Ok(out)
}

fn format_value(value: &AttributeValue, field: &DbfField, encoding: TextEncoding) -> Result<Vec<u8>, String> {
    let width = field.width;
    let blank = || vec![b' '; width];

    let text = match (field.kind, value) {
        (b'L', AttributeValue::Boolean(v)) => return Ok(vec![if *v { b'T' } else { b'F' }]),
        (b'L', AttributeValue::Integer(v)) => return Ok(vec![if *v != 0 { b'T' } else { b'F' }]),
        (b'L', _) => return Ok(vec![b'?']),
        (_, AttributeValue::Null) => return Ok(blank()),
        (b'C', value) => return Ok(encoding.encode_fixed(&value.to_string(), width)),
        (b'D', AttributeValue::Text(date)) => date.replace('-', ""),
        (b'N', AttributeValue::Integer(v)) if field.decimals == 0 => v.to_string(),
        (b'N' | b'F', value) => match value.as_f64() {
            Some(v) if !v.is_finite() => return Ok(blank()),
            Some(v) => fit_number(v, width, field.decimals as usize).unwrap_or_else(|| format!("{:e}", v)),
            None => return Err(format!("field {} expects a number, found {:?}", field.name, value)),
        },
        (_, value) => return Err(format!("field {} cannot store {:?}", field.name, value)),
    };

    if text.len() > width {
        return Err(format!("value {} does not fit in field {} ({} characters)", text, field.name, width));
    }
    Ok(format!("{:>width$}", text, width = width).into_bytes())
}

/// Text for a number within `width` characters
///
/// Tries the declared decimals, then as many decimals as the integer part
/// leaves room for, then exponent notation down to seven significant
/// digits. Large nodata sentinels such as the float32 minimum only fit the
/// last way.
fn fit_number(value: f64, width: usize, decimals: usize) -> Option<String> {
    let fits = |text: &String| text.len() <= width;

    let fixed = match decimals {
        0 if value.abs() < 1e18 => (value.round() as i64).to_string(),
        0 => value.round().to_string(),
        _ => format!("{:.*}", decimals, value),
    };
    if fits(&fixed) {
        return Some(fixed);
    }

    let whole = format!("{}", value.trunc()).len();
    if decimals > 0 && whole + 1 < width {
        let reduced = format!("{:.*}", width - whole - 1, value);
        if fits(&reduced) {
            return Some(reduced);
        }
    }

    std::iter::once(format!("{:e}", value))
        .chain((6..16).rev().map(|precision| format!("{:.*e}", precision, value)))
        .find(fits)
}
