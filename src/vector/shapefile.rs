//! ESRI shapefile point layers
//!
//! A shapefile is a set of sibling files: `.shp` geometries, the `.shx`
//! record index, the `.dbf` attribute table and optionally a `.prj` WKT
//! and a `.cpg` code page. Only point shape types are read.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::coordinate::{Point, SpatialReference};
use crate::errors::{ElevError, ElevResult};
use crate::vector::dbf::{self, TextEncoding};
use crate::vector::types::{GeometryType, LayerInfo, PointCollection, PointRecord};

const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;
const HEADER_SIZE: usize = 100;

/// Shape type codes
mod shape_type {
    pub const NULL: i32 = 0;
    pub const POINT: i32 = 1;
    pub const POINT_M: i32 = 21;
    pub const POINT_Z: i32 = 11;
}

fn geometry_type_for(code: i32) -> Option<GeometryType> {
    match code {
        shape_type::POINT => Some(GeometryType::Point),
        shape_type::POINT_Z => Some(GeometryType::PointZ),
        shape_type::POINT_M => Some(GeometryType::PointM),
        _ => None,
    }
}

fn shape_type_name(code: i32) -> &'static str {
    match code {
        shape_type::NULL => "Null",
        shape_type::POINT => "Point",
        3 => "PolyLine",
        5 => "Polygon",
        8 => "MultiPoint",
        shape_type::POINT_Z => "PointZ",
        13 => "PolyLineZ",
        15 => "PolygonZ",
        18 => "MultiPointZ",
        shape_type::POINT_M => "PointM",
        23 => "PolyLineM",
        25 => "PolygonM",
        28 => "MultiPointM",
        31 => "MultiPatch",
        _ => "Unknown",
    }
}

/// Path of a sibling file, matching the `.shp` extension's case
pub fn sibling(shp: &Path, extension: &str) -> PathBuf {
    let upper = shp.extension().map(|e| e.to_string_lossy() == "SHP").unwrap_or(false);
    let preferred = if upper { extension.to_ascii_uppercase() } else { extension.to_ascii_lowercase() };
    let candidate = shp.with_extension(&preferred);
    if candidate.exists() {
        return candidate;
    }
    let other = if upper { extension.to_ascii_lowercase() } else { extension.to_ascii_uppercase() };
    let fallback = shp.with_extension(other);
    if fallback.exists() { fallback } else { candidate }
}

/// Whether any file of the set exists
pub fn exists(shp: &Path) -> bool {
    ["shp", "shx", "dbf"].iter().any(|ext| sibling(shp, ext).exists())
}

/// Reads a point shapefile with its attributes and spatial reference
pub fn read(path: &Path) -> ElevResult<PointCollection> {
    let bytes = fs::read(path).map_err(|e| ElevError::io(path, e))?;
    let (geometry_type, points) = parse_shapes(path, &bytes)?;
    debug!("Read {} shapes from {}", points.len(), path.display());

    let codepage = read_optional_text(&sibling(path, "cpg"))?;
    let encoding = TextEncoding::from_codepage(codepage.as_deref());

    let dbf_path = sibling(path, "dbf");
    let (fields, rows) = if dbf_path.exists() {
        dbf::read(&dbf_path, encoding)?
    } else {
        info!("No attribute table next to {}", path.display());
        (Vec::new(), Vec::new())
    };
    if !fields.is_empty() && rows.len() != points.len() {
        return Err(ElevError::io(&dbf_path, format!(
            "attribute table has {} records but the shapefile has {} shapes", rows.len(), points.len())));
    }

    let mut collection = PointCollection::new(geometry_type);
    collection.fields = fields;
    collection.srs = read_optional_text(&sibling(path, "prj"))?.map(SpatialReference::from_wkt);
    collection.layer = LayerInfo {
        name: path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
        codepage,
        ..LayerInfo::default()
    };

    let mut rows = rows.into_iter();
    for (index, point) in points.into_iter().enumerate() {
        let mut record = PointRecord::new(index, point);
        if let Some(row) = rows.next() {
            if row.deleted {
                continue;
            }
            record.attributes = row.values;
        }
        collection.records.push(record);
    }

    Ok(collection)
}

fn read_optional_text(path: &Path) -> ElevResult<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ElevError::io(path, e)),
    }
}

/// Parses the `.shp` header and all point records
///
/// Non-point layers, null shapes and records whose type differs from the
/// header are schema errors; damaged or truncated files are I/O errors.
fn parse_shapes(path: &Path, bytes: &[u8]) -> ElevResult<(GeometryType, Vec<Point>)> {
    let truncated = |e: io::Error| ElevError::io(path, format!("truncated shapefile: {}", e));
    let mut cursor = Cursor::new(bytes);

    let file_code = cursor.read_i32::<BigEndian>().map_err(truncated)?;
    if file_code != FILE_CODE {
        return Err(ElevError::io(path, format!("not a shapefile (file code {})", file_code)));
    }
    cursor.set_position(24);
    let file_len = cursor.read_i32::<BigEndian>().map_err(truncated)? as u64 * 2;
    let _version = cursor.read_i32::<LittleEndian>().map_err(truncated)?;
    let header_type = cursor.read_i32::<LittleEndian>().map_err(truncated)?;

    let geometry_type = geometry_type_for(header_type).ok_or_else(|| ElevError::schema(path, format!(
        "layer geometry is {}, only Point, PointZ and PointM are supported", shape_type_name(header_type))))?;

    if (bytes.len() as u64) < file_len {
        return Err(ElevError::io(path, format!(
            "truncated shapefile: header declares {} bytes, file has {}", file_len, bytes.len())));
    }

    let mut points = Vec::new();
    cursor.set_position(HEADER_SIZE as u64);
    while cursor.position() < file_len {
        let _number = cursor.read_i32::<BigEndian>().map_err(truncated)?;
        let content_len = cursor.read_i32::<BigEndian>().map_err(truncated)?.max(0) as usize * 2;
        let mut content = vec![0u8; content_len];
        cursor.read_exact(&mut content).map_err(truncated)?;

        let index = points.len();
        let point = parse_point(&content, header_type).map_err(|problem| match problem {
            ShapeProblem::Schema(message) => ElevError::schema(path, format!("feature {}: {}", index, message)),
            ShapeProblem::Corrupt(e) => ElevError::io(path, format!("feature {} is damaged: {}", index, e)),
        })?;
        points.push(point);
    }

    Ok((geometry_type, points))
}

enum ShapeProblem {
    Schema(String),
    Corrupt(io::Error),
}

impl From<io::Error> for ShapeProblem {
    fn from(e: io::Error) -> Self {
        ShapeProblem::Corrupt(e)
    }
}

fn parse_point(content: &[u8], header_type: i32) -> Result<Point, ShapeProblem> {
    let mut cursor = Cursor::new(content);
    let record_type = cursor.read_i32::<LittleEndian>()?;
    if record_type == shape_type::NULL {
        return Err(ShapeProblem::Schema("geometry is empty".to_string()));
    }
    if record_type != header_type {
        return Err(ShapeProblem::Schema(format!(
            "mixed geometry types: {} in a {} layer", shape_type_name(record_type), shape_type_name(header_type))));
    }

    let x = cursor.read_f64::<LittleEndian>()?;
    let y = cursor.read_f64::<LittleEndian>()?;
    let point = match record_type {
        shape_type::POINT_Z => {
            let z = cursor.read_f64::<LittleEndian>()?;
            let mut point = Point::new_3d(x, y, z);
            // The measure of a PointZ is optional
            if content.len() >= 36 {
                point.m = Some(cursor.read_f64::<LittleEndian>()?);
            }
            point
        },
        shape_type::POINT_M => Point::new(x, y).with_m(cursor.read_f64::<LittleEndian>()?),
        _ => Point::new(x, y),
    };
    Ok(point)
}

/// Writes the collection as a shapefile set at `path`
///
/// Writes `.shp`, `.shx` and `.dbf`, plus `.prj` and `.cpg` when the
/// collection carries them. Stale `.prj` and `.cpg` files are removed.
pub fn write(path: &Path, points: &PointCollection) -> ElevResult<()> {
    let encoding = TextEncoding::from_codepage(points.layer.codepage.as_deref());
    let dbf_path = sibling(path, "dbf");
    let (shp, shx) = encode_shapes(points).map_err(|e| ElevError::io(path, e))?;

    fs::write(path, shp).map_err(|e| ElevError::io(path, e))?;
    let shx_path = sibling(path, "shx");
    fs::write(&shx_path, shx).map_err(|e| ElevError::io(&shx_path, e))?;
    dbf::write(&dbf_path, &points.fields, &points.records, encoding)?;

    let definition = points.srs.as_ref().and_then(|srs| srs.definition.as_deref());
    write_optional_text(&sibling(path, "prj"), definition)?;
    write_optional_text(&sibling(path, "cpg"), points.layer.codepage.as_deref())?;

    info!("Wrote {} points to {}", points.len(), path.display());
    Ok(())
}

fn write_optional_text(path: &Path, text: Option<&str>) -> ElevResult<()> {
    match text {
        Some(text) => fs::write(path, text).map_err(|e| ElevError::io(path, e)),
        None => match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(ElevError::io(path, e)),
            _ => Ok(()),
        },
    }
}

fn shape_type_of(geometry_type: GeometryType) -> i32 {
    match geometry_type {
        GeometryType::Point => shape_type::POINT,
        GeometryType::PointM => shape_type::POINT_M,
        GeometryType::PointZ | GeometryType::PointZM => shape_type::POINT_Z,
    }
}

/// Encodes the `.shp` and `.shx` contents
fn encode_shapes(points: &PointCollection) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let code = shape_type_of(points.geometry_type);
    let content_len: usize = match code {
        shape_type::POINT_Z => 36,
        shape_type::POINT_M => 28,
        _ => 20,
    };
    let record_len = 8 + content_len;
    let shp_len = HEADER_SIZE + record_len * points.len();
    let shx_len = HEADER_SIZE + 8 * points.len();

    let mut shp = Vec::with_capacity(shp_len);
    let mut shx = Vec::with_capacity(shx_len);
    write_header(&mut shp, points, code, shp_len)?;
    write_header(&mut shx, points, code, shx_len)?;

    for (number, record) in points.records.iter().enumerate() {
        let offset = shp.len();
        shx.write_i32::<BigEndian>((offset / 2) as i32)?;
        shx.write_i32::<BigEndian>((content_len / 2) as i32)?;

        shp.write_i32::<BigEndian>(number as i32 + 1)?;
        shp.write_i32::<BigEndian>((content_len / 2) as i32)?;
        shp.write_i32::<LittleEndian>(code)?;
        shp.write_f64::<LittleEndian>(record.point.x)?;
        shp.write_f64::<LittleEndian>(record.point.y)?;
        match code {
            shape_type::POINT_Z => {
                shp.write_f64::<LittleEndian>(record.point.z.unwrap_or(0.0))?;
                shp.write_f64::<LittleEndian>(record.point.m.unwrap_or(NO_MEASURE))?;
            },
            shape_type::POINT_M => shp.write_f64::<LittleEndian>(record.point.m.unwrap_or(NO_MEASURE))?,
            _ => {}
        }
    }

    Ok((shp, shx))
}

/// Measures below -1e38 mean "no measure"
const NO_MEASURE: f64 = -1e39;

fn write_header(out: &mut Vec<u8>, points: &PointCollection, code: i32, file_len: usize) -> io::Result<()> {
    out.write_i32::<BigEndian>(FILE_CODE)?;
    for _ in 0..5 {
        out.write_i32::<BigEndian>(0)?;
    }
    out.write_i32::<BigEndian>((file_len / 2) as i32)?;
    out.write_i32::<LittleEndian>(VERSION)?;
    out.write_i32::<LittleEndian>(code)?;

    let (min_x, min_y, max_x, max_y) = points.bounds()
        .map(|b| (b.min_x, b.min_y, b.max_x, b.max_y))
        .unwrap_or_default();
    let range = |values: Vec<f64>| values.iter().cloned()
        .fold(None, |acc: Option<(f64, f64)>, v| Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v)))))
        .unwrap_or_default();
    let (min_z, max_z) = range(points.records.iter().filter_map(|r| r.point.z).collect());
    let (min_m, max_m) = range(points.records.iter().filter_map(|r| r.point.m).filter(|m| *m > -1e38).collect());

    for value in [min_x, min_y, max_x, max_y, min_z, max_z, min_m, max_m] {
        out.write_f64::<LittleEndian>(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;
    use crate::vector::types::{AttributeValue, FieldDef, FieldType};

    fn sample_points(geometry_type: GeometryType) -> PointCollection {
        let mut points = PointCollection::new(geometry_type);
        points.fields.push(FieldDef::new("name", FieldType::Text).with_width(16, 0));
        for (i, (x, y)) in [(1.5, 2.5), (-3.0, 4.25)].iter().enumerate() {
            let mut point = Point::new(*x, *y);
            if geometry_type.has_z() {
                point.z = Some(100.0 + i as f64);
            }
            if geometry_type.has_m() || geometry_type.has_z() {
                point.m = Some(i as f64);
            }
            let mut record = PointRecord::new(i, point);
            record.set("name", AttributeValue::Text(format!("pt{}", i)));
            points.records.push(record);
        }
        points
    }

    fn record_bytes(shape_type: i32, coords: &[f64]) -> Vec<u8> {
        let mut content = Vec::new();
        content.write_i32::<LittleEndian>(shape_type).unwrap();
        for c in coords {
            content.write_f64::<LittleEndian>(*c).unwrap();
        }
        let mut record = Vec::new();
        record.write_i32::<BigEndian>(1).unwrap();
        record.write_i32::<BigEndian>((content.len() / 2) as i32).unwrap();
        record.extend(content);
        record
    }

    fn shp_with_records(header_type: i32, records: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = records.concat();
        let mut out = Vec::new();
        let empty = PointCollection::new(GeometryType::Point);
        write_header(&mut out, &empty, header_type, HEADER_SIZE + body.len()).unwrap();
        out.extend(body);
        out
    }

    #[test]
    fn test_encode_then_parse_point_z() {
        let points = sample_points(GeometryType::PointZ);
        let (shp, shx) = encode_shapes(&points).unwrap();

        assert_eq!(shx.len(), HEADER_SIZE + 16);
        assert_eq!(BigEndian::read_i32(&shx[24..28]) as usize * 2, shx.len());

        let (geometry_type, parsed) = parse_shapes(Path::new("t.shp"), &shp).unwrap();
        assert_eq!(geometry_type, GeometryType::PointZ);
        assert_eq!(parsed[1], Point { x: -3.0, y: 4.25, z: Some(101.0), m: Some(1.0) });
    }

    #[test]
    fn test_point_m() {
        let shp = shp_with_records(shape_type::POINT_M, &[record_bytes(shape_type::POINT_M, &[1.0, 2.0, 7.5])]);
        let (geometry_type, parsed) = parse_shapes(Path::new("t.shp"), &shp).unwrap();
        assert_eq!(geometry_type, GeometryType::PointM);
        assert_eq!(parsed[0].m, Some(7.5));
        assert_eq!(parsed[0].z, None);
    }

    #[test]
    fn test_non_point_layer() {
        let shp = shp_with_records(3, &[]);
        let err = parse_shapes(Path::new("t.shp"), &shp).err().unwrap();
        assert_eq!(err.kind(), "SchemaError");
        assert!(err.to_string().contains("PolyLine"));
    }

    #[test]
    fn test_mixed_point_and_line() {
        let shp = shp_with_records(shape_type::POINT, &[
            record_bytes(shape_type::POINT, &[1.0, 2.0]),
            record_bytes(3, &[0.0, 0.0, 1.0, 1.0]),
        ]);
        let err = parse_shapes(Path::new("t.shp"), &shp).err().unwrap();
        assert_eq!(err.kind(), "SchemaError");
        assert!(err.to_string().contains("mixed geometry types"));
    }

    #[test]
    fn test_null_shape_rejected() {
        let shp = shp_with_records(shape_type::POINT, &[record_bytes(shape_type::NULL, &[])]);
        assert_eq!(parse_shapes(Path::new("t.shp"), &shp).err().unwrap().kind(), "SchemaError");
    }

    #[test]
    fn test_truncated_and_foreign_files() {
        let (shp, _) = encode_shapes(&sample_points(GeometryType::Point)).unwrap();
        let err = parse_shapes(Path::new("t.shp"), &shp[..shp.len() - 4]).err().unwrap();
        assert_eq!(err.kind(), "IOError");

        let err = parse_shapes(Path::new("t.shp"), b"GIF89a not a shapefile").err().unwrap();
        assert_eq!(err.kind(), "IOError");
    }

    #[test]
    fn test_write_then_read_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wells.shp");
        let mut points = sample_points(GeometryType::Point);
        points.srs = Some(SpatialReference::from_wkt(r#"GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]]"#));
        points.layer.codepage = Some("UTF-8".into());

        write(&path, &points).unwrap();
        assert!(dir.path().join("wells.shx").exists());

        let read_back = read(&path).unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back.epsg(), Some(4326));
        assert_eq!(read_back.layer.name, "wells");
        assert_eq!(read_back.layer.codepage.as_deref(), Some("UTF-8"));
        assert_eq!(read_back.records[1].xy(), (-3.0, 4.25));
        assert_eq!(read_back.records[0].value("name"), &AttributeValue::Text("pt0".into()));

        // Rewriting without CRS removes the stale .prj
        points.srs = None;
        write(&path, &points).unwrap();
        assert!(!dir.path().join("wells.prj").exists());
    }

    #[test]
    fn test_deleted_rows_drop_their_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pts.shp");
        write(&path, &sample_points(GeometryType::Point)).unwrap();

        let dbf_path = dir.path().join("pts.dbf");
        let mut dbf = fs::read(&dbf_path).unwrap();
        let header_len = u16::from_le_bytes([dbf[8], dbf[9]]) as usize;
        dbf[header_len] = b'*';
        fs::write(&dbf_path, dbf).unwrap();

        let points = read(&path).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points.records[0].index, 1);
        assert_eq!(points.records[0].xy(), (-3.0, 4.25));
    }

    #[test]
    fn test_missing_dbf_means_no_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.shp");
        write(&path, &sample_points(GeometryType::Point)).unwrap();
        fs::remove_file(dir.path().join("bare.dbf")).unwrap();

        let points = read(&path).unwrap();
        assert!(points.fields.is_empty());
        assert_eq!(points.len(), 2);
    }
}
