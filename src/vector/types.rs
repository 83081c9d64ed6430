//! Point dataset data model

use std::collections::HashMap;
use std::fmt;

use crate::coordinate::{BoundingBox, Point, SpatialReference};

/// A single attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Blob(Vec<u8>),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(v) => Some(*v as f64),
            AttributeValue::Real(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "NULL"),
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Real(v) => write!(f, "{}", v),
            AttributeValue::Text(v) => write!(f, "{}", v),
            AttributeValue::Boolean(v) => write!(f, "{}", v),
            AttributeValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Logical type of an attribute field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Boolean,
    /// Dates travel as `Text` values
    Date,
    Blob,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Integer => "Integer",
            FieldType::Real => "Real",
            FieldType::Text => "Text",
            FieldType::Boolean => "Boolean",
            FieldType::Date => "Date",
            FieldType::Blob => "Blob",
        }
    }
}

/// Definition of one attribute field
///
/// `width` and `precision` come from shapefile DBF headers. `native_type`
/// is the type as declared by the source format, a DBF type letter or a
/// GeoPackage column type, and each codec writes back what it read.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub width: Option<u8>,
    pub precision: Option<u8>,
    pub native_type: Option<String>,
    pub not_null: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            width: None,
            precision: None,
            native_type: None,
            not_null: false,
        }
    }

    /// The floating-point field that receives sampled elevations
    ///
    /// Carries no native type, so each codec declares it as its own
    /// real number type.
    pub fn elevation(name: impl Into<String>) -> Self {
        FieldDef::new(name, FieldType::Real).with_width(24, 15)
    }

    pub fn with_width(mut self, width: u8, precision: u8) -> Self {
        self.width = Some(width);
        self.precision = Some(precision);
        self
    }
}

impl fmt::Display for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.name, self.field_type.name())?;
        match (self.width, self.precision, &self.native_type) {
            (Some(w), Some(p), _) if p > 0 => write!(f, " {}.{}", w, p)?,
            (Some(w), _, _) => write!(f, " {}", w)?,
            (None, _, Some(native)) => write!(f, " {}", native)?,
            _ => {}
        }
        write!(f, ")")
    }
}

/// Point geometry flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Point,
    PointZ,
    PointM,
    PointZM,
}

impl GeometryType {
    pub fn from_dimensions(has_z: bool, has_m: bool) -> Self {
        match (has_z, has_m) {
            (false, false) => GeometryType::Point,
            (true, false) => GeometryType::PointZ,
            (false, true) => GeometryType::PointM,
            (true, true) => GeometryType::PointZM,
        }
    }

    pub fn has_z(&self) -> bool {
        matches!(self, GeometryType::PointZ | GeometryType::PointZM)
    }

    pub fn has_m(&self) -> bool {
        matches!(self, GeometryType::PointM | GeometryType::PointZM)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GeometryType::Point => "POINT",
            GeometryType::PointZ => "POINTZ",
            GeometryType::PointM => "POINTM",
            GeometryType::PointZM => "POINTZM",
        }
    }
}

/// One point feature
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    /// Position of the feature in the source dataset
    pub index: usize,
    /// The container's own feature id, when the format has one
    pub fid: Option<i64>,
    pub point: Point,
    pub attributes: HashMap<String, AttributeValue>,
}

impl PointRecord {
    pub fn new(index: usize, point: Point) -> Self {
        PointRecord { index, fid: None, point, attributes: HashMap::new() }
    }

    pub fn with_fid(mut self, fid: i64) -> Self {
        self.fid = Some(fid);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// The attribute value, or Null when the record lacks it
    pub fn value(&self, name: &str) -> &AttributeValue {
        self.attributes.get(name).unwrap_or(&AttributeValue::Null)
    }

    pub fn xy(&self) -> (f64, f64) {
        self.point.xy()
    }
}

/// Names and metadata of the layer the points were read from
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerInfo {
    pub name: String,
    /// Geometry column (GeoPackage)
    pub geometry_column: Option<String>,
    /// Integer primary key column (GeoPackage)
    pub fid_column: Option<String>,
    /// `gpkg_contents` identifier and description
    pub identifier: Option<String>,
    pub description: Option<String>,
    /// DBF code page from a `.cpg` file
    pub codepage: Option<String>,
}

/// An ordered set of point features sharing CRS, schema and geometry type
#[derive(Debug, Clone, PartialEq)]
pub struct PointCollection {
    pub records: Vec<PointRecord>,
    pub fields: Vec<FieldDef>,
    pub geometry_type: GeometryType,
    pub srs: Option<SpatialReference>,
    pub layer: LayerInfo,
}

impl PointCollection {
    pub fn new(geometry_type: GeometryType) -> Self {
        PointCollection {
            records: Vec::new(),
            fields: Vec::new(),
            geometry_type,
            srs: None,
            layer: LayerInfo::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Field lookup ignores ASCII case, as DBF and SQLite column names do
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// All (x, y) pairs in record order
    pub fn coordinates(&self) -> Vec<(f64, f64)> {
        self.records.iter().map(PointRecord::xy).collect()
    }

    /// EPSG code of the dataset CRS, when it has one
    pub fn epsg(&self) -> Option<u32> {
        self.srs.as_ref().and_then(SpatialReference::epsg_code)
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.records.iter().map(|r| &r.point))
    }

    /// Multi-line summary for the info command
    pub fn describe(&self) -> String {
        let mut lines = vec![
            format!("Layer: {}", self.layer.name),
            format!("  Features: {}", self.len()),
            format!("  Geometry: {}", self.geometry_type.name()),
            format!("  CRS: {}", self.srs.as_ref().map(|s| s.describe()).unwrap_or_else(|| "none".to_string())),
        ];
        if let Some(b) = self.bounds() {
            lines.push(format!("  Extent: ({}, {}) - ({}, {})", b.min_x, b.min_y, b.max_x, b.max_y));
        }
        lines.push(format!("  Fields: {}", self.fields.len()));
        lines.extend(self.fields.iter().map(|f| format!("    {}", f)));
        lines.join("\n")
    }
}
