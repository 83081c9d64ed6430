mod common;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use common::{as_layer, labelled_points, reals, Grid};
use elevkit::utils::progress::ProgressTracker;
use elevkit::vector::{self, geopackage, shapefile, AttributeValue, FieldDef, FieldType, FormatTag};
use elevkit::{Config, ElevKit, WriteMode};

/// Two points inside the 3x3 grid and one far outside it
const COORDS: [(f64, f64); 3] = [(0.5, 0.5), (2.5, 2.5), (10.0, 10.0)];

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let workspace = Workspace { dir: TempDir::new().unwrap() };
        Grid::three_by_three().write(&workspace.raster());
        workspace
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn raster(&self) -> PathBuf {
        self.path("dtm.tif")
    }

    fn shapefile(&self) -> PathBuf {
        let shp = self.path("wells.shp");
        shapefile::write(&shp, &labelled_points(&COORDS)).unwrap();
        shp
    }

    fn geopackage(&self) -> PathBuf {
        let gpkg = self.path("survey.gpkg");
        let points = as_layer(labelled_points(&COORDS), "wells");
        geopackage::write(&gpkg, "wells", &points, &ProgressTracker::hidden()).unwrap();
        gpkg
    }

    fn kit(&self, points: &str, adjust: impl FnOnce(&mut Config)) -> ElevKit {
        let mut config = Config {
            points: Some(points.to_string()),
            raster: Some(self.raster()),
            ..Config::default()
        };
        adjust(&mut config);
        ElevKit::new(config).unwrap()
    }
}

fn layer_path(container: &Path, layer: &str) -> String {
    format!("{}/{}", container.display(), layer)
}

#[test]
fn test_shapefile_new_file_round_trip() {
    let ws = Workspace::new();
    let shp = ws.shapefile();

    let report = ws.kit(shp.to_str().unwrap(), |_| {}).run().unwrap();
    let derived = ws.path("wells_with_elevations.shp");
    assert_eq!(report.output, FormatTag::SingleFile(derived.clone()));
    assert_eq!(report.points, 3);
    assert_eq!(report.nodata_points, 1);

    let (written, _) = vector::load(derived.to_str().unwrap()).unwrap();
    let elevations = reals(&written, "DTM_Elev");
    assert_abs_diff_eq!(elevations[0], 70.0, epsilon = 1e-6);
    assert_abs_diff_eq!(elevations[1], 30.0, epsilon = 1e-6);
    assert_abs_diff_eq!(elevations[2], -9999.0, epsilon = 1e-6);

    for (record, &(x, y)) in written.records.iter().zip(COORDS.iter()) {
        assert_abs_diff_eq!(record.point.x, x, epsilon = 1e-6);
        assert_abs_diff_eq!(record.point.y, y, epsilon = 1e-6);
    }
    assert_eq!(written.records[1].value("name"), &AttributeValue::Text("point 2".into()));
    assert_eq!(written.epsg(), Some(32633));
    assert_eq!(written.srs.as_ref().and_then(|s| s.definition.as_deref()), Some(common::UTM33N_WKT));

    let (source, _) = vector::load(shp.to_str().unwrap()).unwrap();
    assert!(source.field("DTM_Elev").is_none());
}

#[test]
fn test_geopackage_new_file_round_trip() {
    let ws = Workspace::new();
    let gpkg = ws.geopackage();

    let report = ws.kit(&layer_path(&gpkg, "wells"), |_| {}).run().unwrap();
    assert_eq!(report.output.to_string(), layer_path(&ws.path("survey_with_elevations.gpkg"), "wells"));

    let (written, _) = vector::load(&report.output.to_string()).unwrap();
    let elevations = reals(&written, "DTM_Elev");
    assert_abs_diff_eq!(elevations[0], 70.0, epsilon = 1e-6);
    assert_abs_diff_eq!(elevations[1], 30.0, epsilon = 1e-6);
    assert_abs_diff_eq!(elevations[2], -9999.0, epsilon = 1e-6);
    assert_eq!(written.records.iter().map(|r| r.fid).collect::<Vec<_>>(), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(written.records[0].value("id"), &AttributeValue::Integer(1));
    assert_eq!(written.epsg(), Some(32633));

    let (source, _) = vector::load(&layer_path(&gpkg, "wells")).unwrap();
    assert!(source.field("DTM_Elev").is_none());
}

#[test]
fn test_in_place_geopackage_keeps_other_layers() {
    let ws = Workspace::new();
    let gpkg = ws.geopackage();
    let springs = as_layer(labelled_points(&[(1.5, 1.5)]), "springs");
    geopackage::write(&gpkg, "springs", &springs, &ProgressTracker::hidden()).unwrap();

    let report = ws.kit(&layer_path(&gpkg, "wells"), |c| c.write_mode = WriteMode::InPlace).run().unwrap();
    assert_eq!(report.output.file_path(), gpkg.as_path());

    let (wells, _) = vector::load(&layer_path(&gpkg, "wells")).unwrap();
    assert_eq!(reals(&wells, "DTM_Elev")[..2], [70.0, 30.0]);

    let (untouched, _) = vector::load(&layer_path(&gpkg, "springs")).unwrap();
    assert_eq!(untouched.len(), 1);
    assert!(untouched.field("DTM_Elev").is_none());
    assert!(!ws.path("survey_with_elevations.gpkg").exists());
}

#[test]
fn test_float32_nodata_survives_shapefile() {
    let ws = Workspace::new();
    let shp = ws.shapefile();
    let mut grid = Grid::three_by_three();
    grid.nodata = Some("-3.4028234663852886e+38".to_string());
    grid.write(&ws.raster());

    let report = ws.kit(shp.to_str().unwrap(), |_| {}).run().unwrap();
    assert_eq!(report.nodata_points, 1);

    let (written, _) = vector::load(&report.output.to_string()).unwrap();
    let elevations = reals(&written, "DTM_Elev");
    assert_abs_diff_eq!(elevations[0], 70.0, epsilon = 1e-6);
    assert_relative_eq!(elevations[2], -3.4028234663852886e38, max_relative = 1e-6);
}

#[test]
fn test_in_place_geopackage_overwrites_field_of_other_case() {
    let ws = Workspace::new();
    let gpkg = ws.path("survey.gpkg");
    let mut points = as_layer(labelled_points(&COORDS), "wells");
    points.fields.push(FieldDef::new("dtm_elev", FieldType::Real));
    for record in points.records.iter_mut() {
        record.set("dtm_elev", AttributeValue::Real(0.0));
    }
    geopackage::write(&gpkg, "wells", &points, &ProgressTracker::hidden()).unwrap();

    ws.kit(&layer_path(&gpkg, "wells"), |c| c.write_mode = WriteMode::InPlace).run().unwrap();

    let (wells, _) = vector::load(&layer_path(&gpkg, "wells")).unwrap();
    let elevation_fields: Vec<&str> = wells.fields.iter()
        .map(|f| f.name.as_str())
        .filter(|name| name.eq_ignore_ascii_case("DTM_Elev"))
        .collect();
    assert_eq!(elevation_fields, vec!["DTM_Elev"]);
    assert_eq!(reals(&wells, "DTM_Elev")[..2], [70.0, 30.0]);
}

#[test]
fn test_in_place_shapefile_is_idempotent() {
    let ws = Workspace::new();
    let shp = ws.shapefile();
    let kit = ws.kit(shp.to_str().unwrap(), |c| c.write_mode = WriteMode::InPlace);

    kit.run().unwrap();
    let (once, _) = vector::load(shp.to_str().unwrap()).unwrap();
    kit.run().unwrap();
    let (twice, _) = vector::load(shp.to_str().unwrap()).unwrap();

    assert_eq!(once.fields, twice.fields);
    assert_eq!(once.fields.iter().filter(|f| f.name == "DTM_Elev").count(), 1);
    assert_eq!(reals(&once, "DTM_Elev"), reals(&twice, "DTM_Elev"));
}

#[test]
fn test_mixed_point_and_line_is_schema_error() {
    let ws = Workspace::new();
    let shp = ws.shapefile();

    // Append a two-vertex PolyLine record and fix the header length
    let mut bytes = fs::read(&shp).unwrap();
    let mut content = Vec::new();
    content.extend_from_slice(&3i32.to_le_bytes());
    for v in [0.0f64, 0.0, 1.0, 1.0] {
        content.extend_from_slice(&v.to_le_bytes());
    }
    content.extend_from_slice(&1i32.to_le_bytes());
    content.extend_from_slice(&2i32.to_le_bytes());
    content.extend_from_slice(&0i32.to_le_bytes());
    for v in [0.0f64, 0.0, 1.0, 1.0] {
        content.extend_from_slice(&v.to_le_bytes());
    }
    bytes.extend_from_slice(&4i32.to_be_bytes());
    bytes.extend_from_slice(&((content.len() / 2) as i32).to_be_bytes());
    bytes.extend_from_slice(&content);
    let words = (bytes.len() / 2) as i32;
    bytes[24..28].copy_from_slice(&words.to_be_bytes());
    fs::write(&shp, bytes).unwrap();

    let err = ws.kit(shp.to_str().unwrap(), |_| {}).run().unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
    assert!(!ws.path("wells_with_elevations.shp").exists());
}

#[test]
fn test_long_field_name_fails_before_writing() {
    let ws = Workspace::new();
    let shp = ws.shapefile();

    let kit = ws.kit(shp.to_str().unwrap(), |c| c.elevation_field_name = "elevation_dtm".to_string());
    assert_eq!(kit.run().unwrap_err().kind(), "SchemaError");
    assert!(!ws.path("wells_with_elevations.shp").exists());
}

#[test]
fn test_non_tiff_raster_fails_before_reading_points() {
    let ws = Workspace::new();
    let asc = ws.path("dtm.asc");
    fs::write(&asc, "ncols 3").unwrap();

    let kit = ws.kit(ws.path("missing.shp").to_str().unwrap(), |c| c.raster = Some(asc.clone()));
    let err = kit.run().unwrap_err();
    assert_eq!(err.kind(), "InvalidFormat");
    assert!(err.to_string().contains(".tif"));
    assert_eq!(err.path(), Some(asc.as_path()));
}

#[test]
fn test_crs_check() {
    let ws = Workspace::new();
    let shp = ws.shapefile();
    let mut grid = Grid::three_by_three();
    grid.epsg = Some(25833);
    grid.write(&ws.raster());

    let unchecked = ws.kit(shp.to_str().unwrap(), |_| {});
    assert!(unchecked.run().is_ok());

    let checked = ws.kit(shp.to_str().unwrap(), |c| c.check_crs = true);
    assert_eq!(checked.run().unwrap_err().kind(), "CrsMismatch");
}

#[test]
fn test_overwrite_refused() {
    let ws = Workspace::new();
    let shp = ws.shapefile();
    ws.kit(shp.to_str().unwrap(), |_| {}).run().unwrap();

    let refusing = ws.kit(shp.to_str().unwrap(), |c| c.overwrite_existing = false);
    assert_eq!(refusing.run().unwrap_err().kind(), "AlreadyExists");
}

#[test]
fn test_unsupported_point_format() {
    let ws = Workspace::new();
    let err = ws.kit(ws.path("wells.geojson").to_str().unwrap(), |_| {}).run().unwrap_err();
    assert_eq!(err.kind(), "UnsupportedFormat");
}

#[cfg(not(feature = "filegdb"))]
#[test]
fn test_geodatabase_layer_names_the_cargo_feature() {
    let ws = Workspace::new();
    let gdb = ws.path("survey.gdb");
    fs::create_dir(&gdb).unwrap();

    let err = ws.kit(&layer_path(&gdb, "wells"), |_| {}).run().unwrap_err();
    assert_eq!(err.kind(), "UnsupportedFormat");
    assert!(err.to_string().contains("--features filegdb"));
    assert_eq!(err.path(), Some(gdb.as_path()));
}

#[cfg(feature = "filegdb")]
#[test]
fn test_geodatabase_new_file_round_trip() {
    let ws = Workspace::new();
    let gdb = ws.path("survey.gdb");
    let points = as_layer(labelled_points(&COORDS), "wells");
    vector::filegdb::write(&gdb, "wells", &points, &ProgressTracker::hidden()).unwrap();

    let report = ws.kit(&layer_path(&gdb, "wells"), |_| {}).run().unwrap();
    assert_eq!(report.output.to_string(), layer_path(&ws.path("survey_with_elevations.gdb"), "wells"));

    let (written, tag) = vector::load(&report.output.to_string()).unwrap();
    assert_eq!(tag.format_name(), "ESRI File Geodatabase");
    let elevations = reals(&written, "DTM_Elev");
    assert_abs_diff_eq!(elevations[0], 70.0, epsilon = 1e-6);
    assert_abs_diff_eq!(elevations[2], -9999.0, epsilon = 1e-6);
    assert_eq!(written.epsg(), Some(32633));
}

#[test]
fn test_info_describes_both_datasets() {
    let ws = Workspace::new();
    let shp = ws.shapefile();
    let kit = ws.kit(shp.to_str().unwrap(), |_| {});

    let summary = kit.info(Some(shp.to_str().unwrap()), Some(&ws.raster())).unwrap();
    assert!(summary.contains("Size: 3 x 3 cells"));
    assert!(summary.contains("Nodata: -9999"));
    assert!(summary.contains("Features: 3"));
    assert!(summary.contains("ESRI Shapefile"));
}
