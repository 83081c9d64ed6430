//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use elevkit::coordinate::{Point, SpatialReference};
use elevkit::vector::{AttributeValue, FieldDef, FieldType, GeometryType, PointCollection, PointRecord};

pub const UTM33N_WKT: &str = r#"PROJCS["WGS 84 / UTM zone 33N",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",15],PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","32633"]]"#;

enum TagValue {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
    Ascii(String),
}

impl TagValue {
    /// Field type, count and little-endian payload
    fn encode(&self) -> (u16, u32, Vec<u8>) {
        match self {
            TagValue::Short(v) => (3, v.len() as u32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            TagValue::Long(v) => (4, v.len() as u32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            TagValue::Double(v) => (12, v.len() as u32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            TagValue::Ascii(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                (2, bytes.len() as u32, bytes)
            },
        }
    }
}

/// A single-strip float32 GeoTIFF, rows top to bottom
pub struct Grid {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
    pub origin: (f64, f64),
    pub cell: f64,
    pub nodata: Option<String>,
    pub epsg: Option<u16>,
}

impl Grid {
    /// The 3x3 grid covering x and y from 0 to 3, values 10 to 90
    pub fn three_by_three() -> Self {
        Grid {
            width: 3,
            height: 3,
            values: vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0],
            origin: (0.0, 3.0),
            cell: 1.0,
            nodata: Some("-9999".to_string()),
            epsg: Some(32633),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let pixels: Vec<u8> = self.values.iter().flat_map(|v| v.to_le_bytes()).collect();

        let mut entries: Vec<(u16, TagValue)> = vec![
            (256, TagValue::Long(vec![self.width])),
            (257, TagValue::Long(vec![self.height])),
            (258, TagValue::Short(vec![32])),
            (259, TagValue::Short(vec![1])),
            (262, TagValue::Short(vec![1])),
            (273, TagValue::Long(vec![8])),
            (277, TagValue::Short(vec![1])),
            (278, TagValue::Long(vec![self.height])),
            (279, TagValue::Long(vec![pixels.len() as u32])),
            (339, TagValue::Short(vec![3])),
            (33550, TagValue::Double(vec![self.cell, self.cell, 0.0])),
            (33922, TagValue::Double(vec![0.0, 0.0, 0.0, self.origin.0, self.origin.1, 0.0])),
        ];
        if let Some(epsg) = self.epsg {
            entries.push((34735, TagValue::Short(vec![1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, epsg])));
        }
        if let Some(nodata) = &self.nodata {
            entries.push((42113, TagValue::Ascii(nodata.clone())));
        }
        entries.sort_by_key(|(tag, _)| *tag);

        let ifd_offset = (8 + pixels.len() + 1) & !1;
        let data_offset = ifd_offset + 2 + 12 * entries.len() + 4;

        let mut out = b"II".to_vec();
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&(ifd_offset as u32).to_le_bytes());
        out.extend_from_slice(&pixels);
        out.resize(ifd_offset, 0);

        let mut extra = Vec::new();
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, value) in &entries {
            let (field_type, count, mut bytes) = value.encode();
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&field_type.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            if bytes.len() <= 4 {
                bytes.resize(4, 0);
                out.extend_from_slice(&bytes);
            } else {
                out.extend_from_slice(&((data_offset + extra.len()) as u32).to_le_bytes());
                extra.extend_from_slice(&bytes);
                if extra.len() % 2 == 1 {
                    extra.push(0);
                }
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&extra);
        out
    }

    pub fn write(&self, path: &Path) {
        fs::write(path, self.to_bytes()).unwrap();
    }
}

/// Points with a name and an integer id, in UTM 33N
pub fn labelled_points(coords: &[(f64, f64)]) -> PointCollection {
    let mut points = PointCollection::new(GeometryType::Point);
    points.srs = Some(SpatialReference::from_wkt(UTM33N_WKT));
    points.fields.push(FieldDef::new("id", FieldType::Integer).with_width(10, 0));
    points.fields.push(FieldDef::new("name", FieldType::Text).with_width(20, 0));
    for (i, &(x, y)) in coords.iter().enumerate() {
        let mut record = PointRecord::new(i, Point::new(x, y));
        record.set("id", AttributeValue::Integer(i as i64 + 1));
        record.set("name", AttributeValue::Text(format!("point {}", i + 1)));
        points.records.push(record);
    }
    points
}

/// The points as a GeoPackage layer, with an EPSG-coded SRS row
pub fn as_layer(mut points: PointCollection, name: &str) -> PointCollection {
    points.fields.iter_mut().for_each(|f| {
        f.width = None;
        f.precision = None;
    });
    points.srs = Some(SpatialReference {
        srs_id: Some(32633),
        name: Some("WGS 84 / UTM zone 33N".to_string()),
        organization: Some("EPSG".to_string()),
        organization_code: Some(32633),
        definition: Some(UTM33N_WKT.to_string()),
        description: None,
    });
    points.layer.name = name.to_string();
    for (i, record) in points.records.iter_mut().enumerate() {
        record.fid = Some(i as i64 + 1);
    }
    points
}

/// Values of a real field in record order
pub fn reals(points: &PointCollection, field: &str) -> Vec<f64> {
    points.records.iter().map(|r| r.value(field).as_f64().unwrap()).collect()
}
