//! GeoPackage point layers
//!
//! A GeoPackage is an SQLite database in which every feature table is
//! registered in `gpkg_contents` and `gpkg_geometry_columns`. Layers are
//! read through those registrations and rewritten inside one transaction,
//! so every other table in the container is left as it was.

use chrono::Utc;
use log::{debug, info, warn};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Transaction};
use std::path::Path;

use crate::coordinate::SpatialReference;
use crate::errors::{ElevError, ElevResult};
use crate::utils::progress::ProgressTracker;
use crate::vector::types::{
    AttributeValue, FieldDef, FieldType, GeometryType, LayerInfo, PointCollection, PointRecord,
};
use crate::vector::wkb::{self, GeometryProblem};

const APPLICATION_ID: i32 = 0x4750_4B47;
const USER_VERSION: i32 = 10400;
const RTREE_EXTENSION: &str = "gpkg_rtree_index";

const METADATA_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition TEXT NOT NULL,
  description TEXT
);
CREATE TABLE IF NOT EXISTS gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
INSERT OR IGNORE INTO gpkg_spatial_ref_sys VALUES
  ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
  ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system'),
  ('WGS 84 geodetic', 4326, 'EPSG', 4326,
   'GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]',
   'longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid');
"#;

/// Quotes an SQL identifier
fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1)",
        params![name],
        |row| row.get::<_, i64>(0),
    ).map(|count| count > 0)
}

/// Logical field type for a declared GeoPackage column type
fn field_type_for(declared: &str) -> FieldType {
    let upper = declared.to_ascii_uppercase();
    let base = upper.split('(').next().unwrap_or("").trim();
    match base {
        "BOOLEAN" => FieldType::Boolean,
        "DATE" => FieldType::Date,
        "BLOB" | "" => FieldType::Blob,
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => FieldType::Real,
        _ if base.contains("INT") => FieldType::Integer,
        _ => FieldType::Text,
    }
}

fn column_type_for(field: &FieldDef) -> String {
    if let Some(native) = &field.native_type {
        return native.clone();
    }
    match field.field_type {
        FieldType::Integer => "INTEGER",
        FieldType::Real => "REAL",
        FieldType::Text => "TEXT",
        FieldType::Boolean => "BOOLEAN",
        FieldType::Date => "DATE",
        FieldType::Blob => "BLOB",
    }.to_string()
}

fn attribute_from(value: ValueRef<'_>, field_type: FieldType) -> AttributeValue {
    match value {
        ValueRef::Null => AttributeValue::Null,
        ValueRef::Integer(v) if field_type == FieldType::Boolean => AttributeValue::Boolean(v != 0),
        ValueRef::Integer(v) => AttributeValue::Integer(v),
        ValueRef::Real(v) => AttributeValue::Real(v),
        ValueRef::Text(t) => AttributeValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => AttributeValue::Blob(b.to_vec()),
    }
}

fn sql_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Integer(v) => Value::Integer(*v),
        AttributeValue::Real(v) if v.is_finite() => Value::Real(*v),
        AttributeValue::Real(_) => Value::Null,
        AttributeValue::Text(v) => Value::Text(v.clone()),
        AttributeValue::Boolean(v) => Value::Integer(i64::from(*v)),
        AttributeValue::Blob(v) => Value::Blob(v.clone()),
    }
}

/// Registration of a feature table
struct LayerEntry {
    table: String,
    data_type: String,
    identifier: Option<String>,
    description: Option<String>,
    geometry_column: String,
    geometry_type_name: String,
    srs_id: i64,
}

fn read_entry(conn: &Connection, container: &Path, layer: &str) -> ElevResult<LayerEntry> {
    let sql_err = |e| ElevError::from_sqlite(container, e);

    if !table_exists(conn, "gpkg_contents").map_err(sql_err)? {
        return Err(ElevError::io(container, "not a GeoPackage: gpkg_contents is missing"));
    }

    let contents = conn.query_row(
        "SELECT table_name, data_type, identifier, description FROM gpkg_contents \
         WHERE lower(table_name) = lower(?1)",
        params![layer],
        |row| Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
        )),
    ).optional().map_err(sql_err)?;
    let (table, data_type, identifier, description) = contents
        .ok_or_else(|| ElevError::io(container, format!("layer '{}' is not listed in gpkg_contents", layer)))?;

    let geometry = conn.query_row(
        "SELECT column_name, geometry_type_name, srs_id FROM gpkg_geometry_columns \
         WHERE lower(table_name) = lower(?1)",
        params![layer],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
    ).optional().map_err(sql_err)?;
    let (geometry_column, geometry_type_name, srs_id) = geometry
        .ok_or_else(|| ElevError::io(container, format!("layer '{}' has no geometry column registered", layer)))?;

    Ok(LayerEntry { table, data_type, identifier, description, geometry_column, geometry_type_name, srs_id })
}

fn read_srs(conn: &Connection, srs_id: i64) -> rusqlite::Result<SpatialReference> {
    let row = conn.query_row(
        "SELECT srs_name, organization, organization_coordsys_id, definition, description \
         FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
        params![srs_id],
        |row| Ok(SpatialReference {
            srs_id: Some(srs_id),
            name: row.get(0)?,
            organization: row.get(1)?,
            organization_code: row.get(2)?,
            definition: row.get(3)?,
            description: row.get(4)?,
        }),
    ).optional()?;

    Ok(row.unwrap_or_else(|| {
        warn!("srs_id {} is not defined in gpkg_spatial_ref_sys", srs_id);
        SpatialReference { srs_id: Some(srs_id), ..Default::default() }
    }))
}

/// Attribute fields and the integer primary key of a table
fn read_columns(conn: &Connection, table: &str, geometry_column: &str) -> rusqlite::Result<(Vec<FieldDef>, Option<String>)> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let mut rows = stmt.query([])?;
    let mut fields = Vec::new();
    let mut fid_column = None;

    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        let declared: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
        let not_null: bool = row.get::<_, i64>(3)? != 0;
        let pk: i64 = row.get(5)?;

        if name.eq_ignore_ascii_case(geometry_column) {
            continue;
        }
        if pk == 1 && fid_column.is_none() && declared.to_ascii_uppercase().contains("INT") {
            fid_column = Some(name);
            continue;
        }

        let mut field = FieldDef::new(name, field_type_for(&declared));
        field.native_type = if declared.is_empty() { None } else { Some(declared) };
        field.not_null = not_null;
        fields.push(field);
    }

    Ok((fields, fid_column))
}

fn geometry_error(container: &Path, index: usize, problem: GeometryProblem) -> ElevError {
    match problem {
        GeometryProblem::Corrupt(_) => ElevError::io(container, format!("feature {}: {}", index, problem)),
        _ => ElevError::schema(container, format!("feature {}: {}", index, problem)),
    }
}

/// Reads a point layer from a GeoPackage
///
/// Every feature must hold a point geometry, and all of them the same
/// flavour; anything else is rejected rather than skipped.
pub fn read(container: &Path, layer: &str) -> ElevResult<PointCollection> {
    if !container.is_file() {
        return Err(ElevError::io(container, "GeoPackage does not exist"));
    }
    let sql_err = |e| ElevError::from_sqlite(container, e);
    let conn = Connection::open_with_flags(container, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(sql_err)?;

    let entry = read_entry(&conn, container, layer)?;
    if !entry.data_type.eq_ignore_ascii_case("features") {
        return Err(ElevError::schema(container, format!(
            "layer '{}' holds {}, not features", entry.table, entry.data_type)));
    }
    let declared = entry.geometry_type_name.to_ascii_uppercase();
    if declared != "POINT" && declared != "GEOMETRY" {
        return Err(ElevError::schema(container, format!(
            "layer '{}' has geometry type {}, only points are supported", entry.table, entry.geometry_type_name)));
    }

    let srs = read_srs(&conn, entry.srs_id).map_err(sql_err)?;
    let (fields, fid_column) = read_columns(&conn, &entry.table, &entry.geometry_column).map_err(sql_err)?;
    debug!("Layer {} has {} attribute fields, fid column {:?}", entry.table, fields.len(), fid_column);

    let mut selected = vec![fid_column.as_deref().map(quote).unwrap_or_else(|| "NULL".to_string()), quote(&entry.geometry_column)];
    selected.extend(fields.iter().map(|f| quote(&f.name)));
    let order = fid_column.as_deref().map(|c| format!(" ORDER BY {}", quote(c))).unwrap_or_default();
    let sql = format!("SELECT {} FROM {}{}", selected.join(", "), quote(&entry.table), order);

    let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
    let mut rows = stmt.query([]).map_err(sql_err)?;
    let mut records = Vec::new();
    let mut geometry_type = None;

    while let Some(row) = rows.next().map_err(sql_err)? {
        let index = records.len();
        let blob: Option<Vec<u8>> = row.get(1).map_err(sql_err)?;
        let blob = blob.ok_or_else(|| geometry_error(container, index, GeometryProblem::Empty))?;
        let (_, point) = wkb::decode_point(&blob).map_err(|p| geometry_error(container, index, p))?;

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
        record.fid = row.get(0).map_err(sql_err)?;
        for (i, field) in fields.iter().enumerate() {
            let value = row.get_ref(i + 2).map_err(sql_err)?;
            record.set(field.name.clone(), attribute_from(value, field.field_type));
        }
        records.push(record);
    }

    let mut points = PointCollection::new(geometry_type.unwrap_or(GeometryType::Point));
    points.records = records;
    points.fields = fields;
    points.srs = Some(srs);
    points.layer = LayerInfo {
        name: entry.table,
        geometry_column: Some(entry.geometry_column),
        fid_column,
        identifier: entry.identifier,
        description: entry.description,
        codepage: None,
    };

    info!("Read {} points from {}/{}", points.len(), container.display(), points.layer.name);
    Ok(points)
}

/// Whether the container exists and registers a table named `layer`
pub fn layer_exists(container: &Path, layer: &str) -> ElevResult<bool> {
    if !container.is_file() {
        return Ok(false);
    }
    let sql_err = |e| ElevError::from_sqlite(container, e);
    let conn = Connection::open_with_flags(container, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(sql_err)?;
    table_exists(&conn, layer).map_err(sql_err)
}

/// Writes the collection as layer `layer` of the container
///
/// Creates the container when needed. An existing table of that name is
/// dropped with its R-tree index; all of it happens in one transaction.
pub fn write(container: &Path, layer: &str, points: &PointCollection, progress: &ProgressTracker) -> ElevResult<()> {
    let sql_err = |e| ElevError::from_sqlite(container, e);
    let is_new = !container.exists();
    let mut conn = Connection::open(container).map_err(sql_err)?;
    if is_new {
        conn.execute_batch(&format!(
            "PRAGMA application_id = {}; PRAGMA user_version = {};", APPLICATION_ID, USER_VERSION))
            .map_err(sql_err)?;
    }

    let tx = conn.transaction().map_err(sql_err)?;
    tx.execute_batch(METADATA_TABLES).map_err(sql_err)?;
    let srs_id = register_srs(&tx, points.srs.as_ref()).map_err(sql_err)?;
    drop_layer(&tx, layer).map_err(sql_err)?;

    let geometry_column = points.layer.geometry_column.clone().unwrap_or_else(|| "geom".to_string());
    let fid_column = points.layer.fid_column.clone().unwrap_or_else(|| "fid".to_string());
    create_table(&tx, layer, &fid_column, &geometry_column, &points.fields).map_err(sql_err)?;
    insert_features(&tx, layer, &fid_column, &geometry_column, points, srs_id, progress).map_err(sql_err)?;
    register_layer(&tx, layer, &geometry_column, points, srs_id).map_err(sql_err)?;

    tx.commit().map_err(sql_err)?;
    info!("Wrote {} points to {}/{}", points.len(), container.display(), layer);
    Ok(())
}

/// Ensures the collection's spatial reference row exists and returns its id
fn register_srs(tx: &Transaction<'_>, srs: Option<&SpatialReference>) -> rusqlite::Result<i64> {
    let Some(srs) = srs else {
        return Ok(-1);
    };
    let epsg = srs.epsg_code().map(i64::from);
    let srs_id = srs.srs_id.or(epsg).unwrap_or(-1);

    tx.execute(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys \
         (srs_name, srs_id, organization, organization_coordsys_id, definition, description) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            srs.name.clone().unwrap_or_else(|| srs.describe()),
            srs_id,
            srs.organization.clone().unwrap_or_else(|| if epsg.is_some() { "EPSG" } else { "NONE" }.to_string()),
            srs.organization_code.or(epsg).unwrap_or(srs_id),
            srs.definition.clone().unwrap_or_else(|| "undefined".to_string()),
            srs.description,
        ],
    )?;
    Ok(srs_id)
}

/// Drops the table, its R-tree index and its registrations
fn drop_layer(tx: &Transaction<'_>, layer: &str) -> rusqlite::Result<()> {
    let registered: Option<String> = tx.query_row(
        "SELECT column_name FROM gpkg_geometry_columns WHERE lower(table_name) = lower(?1)",
        params![layer],
        |row| row.get(0),
    ).optional()?;

    if let Some(column) = registered {
        let rtree = format!("rtree_{}_{}", layer, column);
        if table_exists(tx, &rtree)? {
            debug!("Dropping spatial index {}", rtree);
            tx.execute_batch(&format!("DROP TABLE {}", quote(&rtree)))?;
        }
    }
    if table_exists(tx, "gpkg_extensions")? {
        tx.execute(
            "DELETE FROM gpkg_extensions WHERE lower(table_name) = lower(?1) AND extension_name = ?2",
            params![layer, RTREE_EXTENSION],
        )?;
    }

    tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(layer)))?;
    tx.execute("DELETE FROM gpkg_geometry_columns WHERE lower(table_name) = lower(?1)", params![layer])?;
    tx.execute("DELETE FROM gpkg_contents WHERE lower(table_name) = lower(?1)", params![layer])?;
    Ok(())
}

fn create_table(tx: &Transaction<'_>, layer: &str, fid_column: &str, geometry_column: &str, fields: &[FieldDef]) -> rusqlite::Result<()> {
    let mut columns = vec![
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL", quote(fid_column)),
        format!("{} POINT", quote(geometry_column)),
    ];
    for field in fields {
        let not_null = if field.not_null { " NOT NULL" } else { "" };
        columns.push(format!("{} {}{}", quote(&field.name), column_type_for(field), not_null));
    }
    tx.execute_batch(&format!("CREATE TABLE {} ({})", quote(layer), columns.join(", ")))
}

fn insert_features(
    tx: &Transaction<'_>,
    layer: &str,
    fid_column: &str,
    geometry_column: &str,
    points: &PointCollection,
    srs_id: i64,
    progress: &ProgressTracker,
) -> rusqlite::Result<()> {
    let mut columns = vec![quote(fid_column), quote(geometry_column)];
    columns.extend(points.fields.iter().map(|f| quote(&f.name)));
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})", quote(layer), columns.join(", "), placeholders.join(", ")))?;

    let header_srs = i32::try_from(srs_id).unwrap_or(-1);
    for record in &points.records {
        let mut values = Vec::with_capacity(columns.len());
        values.push(record.fid.map(Value::Integer).unwrap_or(Value::Null));
        values.push(Value::Blob(wkb::encode_point(&record.point, points.geometry_type, header_srs)));
        values.extend(points.fields.iter().map(|f| sql_value(record.value(&f.name))));
        stmt.execute(params_from_iter(values))?;
        progress.increment(1);
    }
    Ok(())
}

fn register_layer(tx: &Transaction<'_>, layer: &str, geometry_column: &str, points: &PointCollection, srs_id: i64) -> rusqlite::Result<()> {
    let bounds = points.bounds();
    let last_change = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

    tx.execute(
        "INSERT INTO gpkg_contents \
         (table_name, data_type, identifier, description, last_change, min_x, min_y, max_x, max_y, srs_id) \
         VALUES (?1, 'features', ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            layer,
            points.layer.identifier.clone().unwrap_or_else(|| layer.to_string()),
            points.layer.description.clone().unwrap_or_default(),
            last_change,
            bounds.as_ref().map(|b| b.min_x),
            bounds.as_ref().map(|b| b.min_y),
            bounds.as_ref().map(|b| b.max_x),
            bounds.as_ref().map(|b| b.max_y),
            srs_id,
        ],
    )?;
    tx.execute(
        "INSERT INTO gpkg_geometry_columns (table_name, column_name, geometry_type_name, srs_id, z, m) \
         VALUES (?1, ?2, 'POINT', ?3, ?4, ?5)",
        params![
            layer,
            geometry_column,
            srs_id,
            i64::from(points.geometry_type.has_z()),
            i64::from(points.geometry_type.has_m()),
        ],
    )?;

    if table_exists(tx, "gpkg_ogr_contents")? {
        tx.execute(
            "INSERT OR REPLACE INTO gpkg_ogr_contents (table_name, feature_count) VALUES (?1, ?2)",
            params![layer, points.len() as i64],
        )?;
    }
    Ok(())
}
