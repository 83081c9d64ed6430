//! File Geodatabase codec over GDAL

use gdal::errors::GdalError;
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Feature, FieldDefn, FieldValue, Geometry, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType};
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use log::{debug, info};
use std::path::Path;

use super::{MAX_FIELD_NAME_CHARS, OBJECTID_COLUMN, SHAPE_COLUMN};
use crate::coordinate::{Point, SpatialReference};
use crate::errors::{ElevError, ElevResult};
use crate::utils::progress::ProgressTracker;
use crate::vector::types::{AttributeValue, FieldDef, FieldType, GeometryType, LayerInfo, PointCollection, PointRecord};

/// Drivers tried, in order, when a new geodatabase is created
const CREATE_DRIVERS: [&str; 2] = ["OpenFileGDB", "FileGDB"];

const DATE_FORMAT: &str = "%Y-%m-%d";

fn open(container: &Path, update: bool) -> ElevResult<Dataset> {
    if !container.is_dir() {
        return Err(ElevError::io(container, "File Geodatabase does not exist"));
    }
    let mut open_flags = GdalOpenFlags::GDAL_OF_VECTOR;
    if update {
        open_flags |= GdalOpenFlags::GDAL_OF_UPDATE;
    }
    let options = DatasetOptions { open_flags, ..DatasetOptions::default() };
    Dataset::open_ex(container, options).map_err(|e| ElevError::io(container, e))
}

fn create(container: &Path) -> ElevResult<Dataset> {
    let mut last_error = None;
    for name in CREATE_DRIVERS {
        match DriverManager::get_driver_by_name(name).and_then(|driver| driver.create_vector_only(container)) {
            Ok(dataset) => {
                debug!("Created {} with the {} driver", container.display(), name);
                return Ok(dataset);
            },
            Err(e) => last_error = Some(e),
        }
    }
    Err(ElevError::io(container, last_error.map(|e| e.to_string())
        .unwrap_or_else(|| "no File Geodatabase driver available".to_string())))
}

fn field_type_for(ogr_type: OGRFieldType::Type) -> Option<(FieldType, &'static str)> {
    match ogr_type {
        OGRFieldType::OFTInteger => Some((FieldType::Integer, "Integer")),
        OGRFieldType::OFTInteger64 => Some((FieldType::Integer, "Integer64")),
        OGRFieldType::OFTReal => Some((FieldType::Real, "Real")),
        OGRFieldType::OFTString => Some((FieldType::Text, "String")),
        OGRFieldType::OFTDate => Some((FieldType::Date, "Date")),
        OGRFieldType::OFTDateTime => Some((FieldType::Text, "DateTime")),
        _ => None,
    }
}

fn ogr_type_for(field: &FieldDef) -> Option<OGRFieldType::Type> {
    let native = field.native_type.as_deref();
    match field.field_type {
        FieldType::Integer if native == Some("Integer") => Some(OGRFieldType::OFTInteger),
        FieldType::Integer => Some(OGRFieldType::OFTInteger64),
        FieldType::Boolean => Some(OGRFieldType::OFTInteger),
        FieldType::Real => Some(OGRFieldType::OFTReal),
        FieldType::Text if native == Some("DateTime") => Some(OGRFieldType::OFTDateTime),
        FieldType::Text => Some(OGRFieldType::OFTString),
        FieldType::Date => Some(OGRFieldType::OFTDate),
        FieldType::Blob => None,
    }
}

fn attribute_from(value: Option<FieldValue>) -> AttributeValue {
    match value {
        None => AttributeValue::Null,
        Some(FieldValue::IntegerValue(v)) => AttributeValue::Integer(v as i64),
        Some(FieldValue::Integer64Value(v)) => AttributeValue::Integer(v),
        Some(FieldValue::RealValue(v)) => AttributeValue::Real(v),
        Some(FieldValue::StringValue(v)) => AttributeValue::Text(v),
        Some(FieldValue::DateValue(v)) => AttributeValue::Text(v.format(DATE_FORMAT).to_string()),
        Some(FieldValue::DateTimeValue(v)) => AttributeValue::Text(v.to_rfc3339()),
        Some(other) => AttributeValue::Text(format!("{:?}", other)),
    }
}

fn field_value(value: &AttributeValue, ogr_type: OGRFieldType::Type) -> Result<Option<FieldValue>, String> {
    let converted = match (value, ogr_type) {
        (AttributeValue::Null, _) => return Ok(None),
        (AttributeValue::Real(v), _) if v.is_nan() => return Ok(None),
        (AttributeValue::Boolean(v), _) => FieldValue::IntegerValue(*v as i32),
        (AttributeValue::Integer(v), OGRFieldType::OFTInteger) => FieldValue::IntegerValue(
            i32::try_from(*v).map_err(|_| format!("{} does not fit a 32-bit integer field", v))?),
        (AttributeValue::Integer(v), OGRFieldType::OFTReal) => FieldValue::RealValue(*v as f64),
        (AttributeValue::Integer(v), _) => FieldValue::Integer64Value(*v),
        (AttributeValue::Real(v), _) => FieldValue::RealValue(*v),
        (AttributeValue::Text(v), OGRFieldType::OFTDate) => FieldValue::DateValue(
            chrono::NaiveDate::parse_from_str(v, DATE_FORMAT).map_err(|e| format!("date {:?}: {}", v, e))?),
        (AttributeValue::Text(v), OGRFieldType::OFTDateTime) => FieldValue::DateTimeValue(
            chrono::DateTime::parse_from_rfc3339(v).map_err(|e| format!("date-time {:?}: {}", v, e))?),
        (AttributeValue::Text(v), _) => FieldValue::StringValue(v.clone()),
        (AttributeValue::Blob(_), _) => return Err("binary values are not supported".to_string()),
    };
    Ok(Some(converted))
}

fn read_fields(container: &Path, layer: &gdal::vector::Layer<'_>) -> ElevResult<Vec<FieldDef>> {
    layer.defn().fields()
        .map(|field| {
            let name = field.name();
            let (field_type, native) = field_type_for(field.field_type()).ok_or_else(|| ElevError::schema(
                container, format!("field {} has a type elevkit cannot carry", name)))?;
            let mut def = FieldDef::new(name, field_type);
            def.native_type = Some(native.to_string());
            if field_type == FieldType::Text {
                def.width = u8::try_from(field.width()).ok().filter(|&w| w > 0);
            }
            Ok(def)
        })
        .collect()
}

fn spatial_reference(srs: &SpatialRef) -> Option<SpatialReference> {
    let wkt = srs.to_wkt().ok()?;
    let mut reference = SpatialReference::from_wkt(wkt);
    if let (Ok(organization), Ok(code)) = (srs.auth_name(), srs.auth_code()) {
        reference.organization = Some(organization);
        reference.organization_code = Some(code as i64);
    }
    Some(reference)
}

/// The point of a feature geometry, or why it is not one
fn point_from(geometry: Option<&Geometry>) -> Result<Point, String> {
    let geometry = match geometry {
        Some(g) if !g.is_empty() => g,
        _ => return Err("geometry is empty".to_string()),
    };

    let code = geometry.geometry_type();
    // SAFETY: pure functions over a geometry type code and a live geometry handle
    let (flat, has_z, has_m) = unsafe {
        (gdal_sys::OGR_GT_Flatten(code), gdal_sys::OGR_GT_HasZ(code) != 0, gdal_sys::OGR_GT_HasM(code) != 0)
    };
    if flat != OGRwkbGeometryType::wkbPoint {
        return Err(format!("geometry type {} is not a point", code));
    }

    let (x, y, z) = geometry.get_point(0);
    let mut point = if has_z { Point::new_3d(x, y, z) } else { Point::new(x, y) };
    if has_m {
        let m = unsafe { gdal_sys::OGR_G_GetM(geometry.c_geometry(), 0) };
        point = point.with_m(m);
    }
    Ok(point)
}

fn point_wkt(point: &Point) -> String {
    match (point.z, point.m) {
        (Some(z), Some(m)) => format!("POINT ZM ({} {} {} {})", point.x, point.y, z, m),
        (Some(z), None) => format!("POINT Z ({} {} {})", point.x, point.y, z),
        (None, Some(m)) => format!("POINT M ({} {} {})", point.x, point.y, m),
        (None, None) => format!("POINT ({} {})", point.x, point.y),
    }
}

fn geometry_code(geometry_type: GeometryType) -> OGRwkbGeometryType::Type {
    match geometry_type {
        GeometryType::Point => OGRwkbGeometryType::wkbPoint,
        GeometryType::PointZ => OGRwkbGeometryType::wkbPoint25D,
        GeometryType::PointM => OGRwkbGeometryType::wkbPointM,
        GeometryType::PointZM => OGRwkbGeometryType::wkbPointZM,
    }
}

/// Reads a point feature class
///
/// Every feature must hold a non-empty point of one flavour; anything else
/// is a schema error, as for GeoPackage layers.
pub fn read(container: &Path, layer: &str) -> ElevResult<PointCollection> {
    let dataset = open(container, false)?;
    let mut source = dataset.layer_by_name(layer)
        .map_err(|e| ElevError::io(container, format!("feature class '{}': {}", layer, e)))?;

    let fields = read_fields(container, &source)?;
    let srs = source.spatial_ref().as_ref().and_then(spatial_reference);
    debug!("Feature class {} has {} attribute fields", layer, fields.len());

    let mut records = Vec::new();
    let mut geometry_type = None;
    for feature in source.features() {
        let index = records.len();
        let point = point_from(feature.geometry())
            .map_err(|problem| ElevError::schema(container, format!("feature {}: {}", index, problem)))?;

        let this_type = GeometryType::from_dimensions(point.has_z(), point.has_m());
        match geometry_type {
            None => geometry_type = Some(this_type),
            Some(t) if t != this_type => {
                return Err(ElevError::schema(container, format!(
                    "mixed geometry types: {} and {}", t.name(), this_type.name())));
            },
            _ => {}
        }

        let mut record = PointRecord::new(index, point);
        record.fid = feature.fid().and_then(|fid| i64::try_from(fid).ok());
        for field in &fields {
            let value = feature.field(&field.name).map_err(|e| ElevError::io(container, e))?;
            record.set(field.name.clone(), attribute_from(value));
        }
        records.push(record);
    }

    let mut points = PointCollection::new(geometry_type.unwrap_or(GeometryType::Point));
    points.records = records;
    points.fields = fields;
    points.srs = srs;
    points.layer = LayerInfo {
        name: layer.to_string(),
        geometry_column: Some(SHAPE_COLUMN.to_string()),
        fid_column: Some(OBJECTID_COLUMN.to_string()),
        ..LayerInfo::default()
    };

    info!("Read {} points from {}/{}", points.len(), container.display(), layer);
    Ok(points)
}

/// Whether the geodatabase exists and holds a feature class named `layer`
pub fn layer_exists(container: &Path, layer: &str) -> ElevResult<bool> {
    if !container.is_dir() {
        return Ok(false);
    }
    let dataset = open(container, false)?;
    let exists = dataset.layer_by_name(layer).is_ok();
    Ok(exists)
}

fn delete_layer(container: &Path, dataset: &Dataset, layer: &str) -> ElevResult<()> {
    let Some(index) = dataset.layers().position(|l| l.name() == layer) else {
        return Ok(());
    };
    // SAFETY: the handle belongs to `dataset`, which outlives the call
    let status = unsafe { gdal_sys::GDALDatasetDeleteLayer(dataset.c_dataset(), index as std::os::raw::c_int) };
    if status != gdal_sys::OGRErr::OGRERR_NONE {
        return Err(ElevError::io(container, format!("could not delete feature class '{}' (OGR error {})", layer, status)));
    }
    debug!("Deleted feature class {}", layer);
    Ok(())
}

fn target_srs(points: &PointCollection) -> Result<Option<SpatialRef>, GdalError> {
    let Some(srs) = points.srs.as_ref() else {
        return Ok(None);
    };
    if let Some(code) = srs.epsg_code() {
        return SpatialRef::from_epsg(code).map(Some);
    }
    srs.definition.as_deref().map(SpatialRef::from_wkt).transpose()
}

/// Writes the points as feature class `layer`, replacing any existing one
///
/// The geodatabase is created when missing. Other feature classes are
/// left as they are.
pub fn write(container: &Path, layer: &str, points: &PointCollection, progress: &ProgressTracker) -> ElevResult<()> {
    let gdal_err = |e: GdalError| ElevError::io(container, e);
    for field in &points.fields {
        if field.name.chars().count() > MAX_FIELD_NAME_CHARS {
            return Err(ElevError::schema(container, format!(
                "field name '{}' is longer than {} characters", field.name, MAX_FIELD_NAME_CHARS)));
        }
    }
    let layout = points.fields.iter()
        .map(|field| ogr_type_for(field).map(|t| (field, t)).ok_or_else(|| ElevError::schema(
            container, format!("field {} holds binary data, which elevkit cannot write to a geodatabase", field.name))))
        .collect::<ElevResult<Vec<_>>>()?;

    let mut dataset = if container.is_dir() { open(container, true)? } else { create(container)? };
    delete_layer(container, &dataset, layer)?;

    let srs = target_srs(points).map_err(gdal_err)?;
    let target = dataset.create_layer(LayerOptions {
        name: layer,
        srs: srs.as_ref(),
        ty: geometry_code(points.geometry_type),
        options: None,
    }).map_err(gdal_err)?;

    for (field, ogr_type) in &layout {
        let definition = FieldDefn::new(&field.name, *ogr_type).map_err(gdal_err)?;
        if let (FieldType::Text, Some(width)) = (field.field_type, field.width) {
            definition.set_width(width as i32);
        }
        definition.add_to_layer(&target).map_err(gdal_err)?;
    }

    for record in &points.records {
        let mut feature = Feature::new(target.defn()).map_err(gdal_err)?;
        let geometry = Geometry::from_wkt(&point_wkt(&record.point)).map_err(gdal_err)?;
        feature.set_geometry(geometry).map_err(gdal_err)?;
        for (field, ogr_type) in &layout {
            let value = field_value(record.value(&field.name), *ogr_type)
                .map_err(|m| ElevError::schema(container, format!("feature {}, field {}: {}", record.index, field.name, m)))?;
            if let Some(value) = value {
                feature.set_field(&field.name, &value).map_err(gdal_err)?;
            }
        }
        feature.create(&target).map_err(gdal_err)?;
        progress.increment(1);
    }

    info!("Wrote {} points to {}/{}", points.len(), container.display(), layer);
    Ok(())
}
