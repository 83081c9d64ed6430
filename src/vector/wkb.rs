//! GeoPackage point geometry blobs
//!
//! A GeoPackage geometry is a small header (magic, flags, SRS id and an
//! optional envelope) followed by ISO well-known binary. Both parts
//! declare their own byte order, so each is read through the matching
//! byte order handler.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Cursor, Seek, SeekFrom};

use crate::coordinate::Point;
use crate::io::byte_order::ByteOrder;
use crate::vector::types::GeometryType;

const MAGIC: [u8; 2] = *b"GP";
const EMPTY_FLAG: u8 = 0b0001_0000;
const WKB_POINT: u32 = 1;

/// Why a geometry blob could not be used as a point
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryProblem {
    /// A valid geometry of another type
    NotPoint(String),
    /// A geometry without coordinates
    Empty,
    /// Bytes that do not form a geometry
    Corrupt(String),
}

impl std::fmt::Display for GeometryProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryProblem::NotPoint(name) => write!(f, "geometry is a {}, not a point", name),
            GeometryProblem::Empty => write!(f, "geometry is empty"),
            GeometryProblem::Corrupt(message) => write!(f, "invalid geometry blob: {}", message),
        }
    }
}

impl From<std::io::Error> for GeometryProblem {
    fn from(e: std::io::Error) -> Self {
        GeometryProblem::Corrupt(e.to_string())
    }
}

fn base_type_name(base: u32) -> String {
    match base {
        1 => "Point",
        2 => "LineString",
        3 => "Polygon",
        4 => "MultiPoint",
        5 => "MultiLineString",
        6 => "MultiPolygon",
        7 => "GeometryCollection",
        _ => return format!("geometry type {}", base),
    }.to_string()
}

/// Splits a WKB type code into base type and dimensions
///
/// Accepts ISO codes (1001 for Point Z) as well as the older high-bit
/// flags some writers still use.
fn split_type(code: u32) -> (u32, bool, bool) {
    let flag_z = code & 0x8000_0000 != 0;
    let flag_m = code & 0x4000_0000 != 0;
    let iso = code & 0x0FFF_FFFF;
    let (base, iso_z, iso_m) = match iso / 1000 {
        1 => (iso % 1000, true, false),
        2 => (iso % 1000, false, true),
        3 => (iso % 1000, true, true),
        _ => (iso % 1000, false, false),
    };
    (base, flag_z || iso_z, flag_m || iso_m)
}

/// Decodes a GeoPackage geometry blob holding a point
///
/// Returns the SRS id from the header and the point with whatever Z and M
/// ordinates it carries.
pub fn decode_point(blob: &[u8]) -> Result<(i32, Point), GeometryProblem> {
    if blob.len() < 8 || blob[..2] != MAGIC {
        return Err(GeometryProblem::Corrupt("missing GeoPackage header".to_string()));
    }
    let flags = blob[3];
    let header_order = if flags & 1 == 1 { ByteOrder::LittleEndian } else { ByteOrder::BigEndian };
    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => return Err(GeometryProblem::Corrupt(format!("envelope indicator {}", other))),
    };

    let mut cursor = Cursor::new(blob);
    cursor.seek(SeekFrom::Start(4))?;
    let srs_id = header_order.create_handler().read_i32(&mut cursor)?;
    if flags & EMPTY_FLAG != 0 {
        return Err(GeometryProblem::Empty);
    }
    cursor.seek(SeekFrom::Start(8 + envelope_len))?;

    let mut flag = [0u8; 1];
    std::io::Read::read_exact(&mut cursor, &mut flag)?;
    let wkb_order = ByteOrder::from_wkb_flag(flag[0])
        .ok_or_else(|| GeometryProblem::Corrupt(format!("byte order flag {}", flag[0])))?;
    let handler = wkb_order.create_handler();

    let (base, has_z, has_m) = split_type(handler.read_u32(&mut cursor)?);
    if base != WKB_POINT {
        return Err(GeometryProblem::NotPoint(base_type_name(base)));
    }

    let x = handler.read_f64(&mut cursor)?;
    let y = handler.read_f64(&mut cursor)?;
    let z = if has_z { Some(handler.read_f64(&mut cursor)?) } else { None };
    let m = if has_m { Some(handler.read_f64(&mut cursor)?) } else { None };
    if x.is_nan() && y.is_nan() {
        return Err(GeometryProblem::Empty);
    }

    Ok((srs_id, Point { x, y, z, m }))
}

/// Encodes a point as a little-endian GeoPackage blob without envelope
///
/// Ordinates the layer's geometry type does not declare are left out.
pub fn encode_point(point: &Point, geometry_type: GeometryType, srs_id: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 5 + 32);
    out.extend_from_slice(&MAGIC);
    out.push(0);
    out.push(0b0000_0001);
    // Writing to a Vec cannot fail
    let _ = write_body(&mut out, point, geometry_type, srs_id);
    out
}

fn write_body(out: &mut Vec<u8>, point: &Point, geometry_type: GeometryType, srs_id: i32) -> std::io::Result<()> {
    out.write_i32::<LittleEndian>(srs_id)?;
    out.push(1);

    let code = WKB_POINT + match geometry_type {
        GeometryType::Point => 0,
        GeometryType::PointZ => 1000,
        GeometryType::PointM => 2000,
        GeometryType::PointZM => 3000,
    };
    out.write_u32::<LittleEndian>(code)?;
    out.write_f64::<LittleEndian>(point.x)?;
    out.write_f64::<LittleEndian>(point.y)?;
    if geometry_type.has_z() {
        out.write_f64::<LittleEndian>(point.z.unwrap_or(0.0))?;
    }
    if geometry_type.has_m() {
        out.write_f64::<LittleEndian>(point.m.unwrap_or(f64::NAN))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::BigEndian;

    /// Big-endian header with an XY envelope around big-endian WKB
    fn big_endian_blob(code: u32, coords: &[f64]) -> Vec<u8> {
        let mut blob = b"GP".to_vec();
        blob.push(0);
        blob.push(0b0000_0010);
        blob.write_i32::<BigEndian>(32633).unwrap();
        for v in [1.0, 2.0, 3.0, 4.0] {
            blob.write_f64::<BigEndian>(v).unwrap();
        }
        blob.push(0);
        blob.write_u32::<BigEndian>(code).unwrap();
        for c in coords {
            blob.write_f64::<BigEndian>(*c).unwrap();
        }
        blob
    }

    #[test]
    fn test_encode_then_decode_each_dimension() {
        let point = Point { x: 500000.5, y: 6500000.25, z: Some(12.0), m: Some(3.0) };
        for geometry_type in [GeometryType::Point, GeometryType::PointZ, GeometryType::PointM, GeometryType::PointZM] {
            let blob = encode_point(&point, geometry_type, 25832);
            let (srs_id, decoded) = decode_point(&blob).unwrap();
            assert_eq!(srs_id, 25832);
            assert_eq!(decoded.xy(), point.xy());
            assert_eq!(decoded.has_z(), geometry_type.has_z());
            assert_eq!(decoded.has_m(), geometry_type.has_m());
        }
    }

    #[test]
    fn test_big_endian_with_envelope() {
        let (srs_id, point) = decode_point(&big_endian_blob(1001, &[10.0, 20.0, 30.0])).unwrap();
        assert_eq!(srs_id, 32633);
        assert_eq!(point, Point::new_3d(10.0, 20.0, 30.0));
    }

    #[test]
    fn test_high_bit_dimension_flags() {
        let (_, point) = decode_point(&big_endian_blob(0x4000_0001, &[1.0, 2.0, 9.0])).unwrap();
        assert_eq!(point.m, Some(9.0));
        assert_eq!(point.z, None);
    }

    #[test]
    fn test_line_is_not_a_point() {
        let problem = decode_point(&big_endian_blob(2, &[2.0, 0.0, 0.0, 1.0, 1.0])).unwrap_err();
        assert_eq!(problem, GeometryProblem::NotPoint("LineString".to_string()));
    }

    #[test]
    fn test_empty_points() {
        let mut blob = encode_point(&Point::new(1.0, 1.0), GeometryType::Point, 0);
        blob[3] |= EMPTY_FLAG;
        assert_eq!(decode_point(&blob).unwrap_err(), GeometryProblem::Empty);

        let nan = encode_point(&Point::new(f64::NAN, f64::NAN), GeometryType::Point, 0);
        assert_eq!(decode_point(&nan).unwrap_err(), GeometryProblem::Empty);
    }

    #[test]
    fn test_corrupt_blobs() {
        assert!(matches!(decode_point(b"XX\0\x01\0\0\0\0"), Err(GeometryProblem::Corrupt(_))));
        let blob = encode_point(&Point::new(1.0, 1.0), GeometryType::Point, 0);
        assert!(matches!(decode_point(&blob[..blob.len() - 3]), Err(GeometryProblem::Corrupt(_))));
    }
}
