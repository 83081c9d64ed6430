//! Coordinate Reference System handling
//!
//! Rasters identify their CRS by EPSG code through GeoKeys. Vector
//! datasets carry a full spatial reference (a `.prj` WKT or a GeoPackage
//! `gpkg_spatial_ref_sys` row) that is written back untouched; only its
//! EPSG identity is used for comparisons.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Matches WKT1 `AUTHORITY["EPSG","4326"]` and WKT2 `ID["EPSG",4326]`
    static ref EPSG_AUTHORITY: Regex =
        Regex::new(r#"(?i)(?:AUTHORITY|ID)\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#)
            .expect("valid EPSG authority pattern");
}

/// Identifier for common coordinate systems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    /// WGS 84 (EPSG:4326)
    WGS84,
    /// Web Mercator (EPSG:3857)
    WebMercator,
    /// UTM Zone (EPSG:326xx for northern hemisphere, 327xx for southern)
    UTM(u8, bool),
    /// Other EPSG code
    Other(u32),
}

impl CoordinateSystem {
    /// Get the EPSG code for this coordinate system
    pub fn epsg_code(&self) -> u32 {
        match self {
            CoordinateSystem::WGS84 => 4326,
            CoordinateSystem::WebMercator => 3857,
            CoordinateSystem::UTM(zone, is_northern) => {
                if *is_northern {
                    32600 + *zone as u32
                } else {
                    32700 + *zone as u32
                }
            },
            CoordinateSystem::Other(code) => *code,
        }
    }

    /// Get a description of this coordinate system
    pub fn description(&self) -> String {
        match self {
            CoordinateSystem::WGS84 => "WGS 84 (EPSG:4326)".to_string(),
            CoordinateSystem::WebMercator => "Web Mercator (EPSG:3857)".to_string(),
            CoordinateSystem::UTM(zone, is_northern) => {
                format!("UTM Zone {}{} (EPSG:{})", zone, if *is_northern { "N" } else { "S" }, self.epsg_code())
            },
            CoordinateSystem::Other(code) => format!("EPSG:{}", code),
        }
    }
}

/// Factory for creating coordinate systems
pub struct CoordinateSystemFactory;

impl CoordinateSystemFactory {
    /// Create a coordinate system from an EPSG code
    pub fn from_epsg(epsg: u32) -> CoordinateSystem {
        match epsg {
            4326 => CoordinateSystem::WGS84,
            3857 => CoordinateSystem::WebMercator,
            32601..=32660 => CoordinateSystem::UTM((epsg - 32600) as u8, true),
            32701..=32760 => CoordinateSystem::UTM((epsg - 32700) as u8, false),
            _ => CoordinateSystem::Other(epsg),
        }
    }

    /// Extract the EPSG code of the outermost authority in a WKT string
    ///
    /// In both WKT1 and WKT2 the top-level authority closes the definition,
    /// so the last match wins over those of nested datums and units.
    pub fn epsg_from_wkt(wkt: &str) -> Option<u32> {
        EPSG_AUTHORITY.captures_iter(wkt)
            .last()
            .and_then(|caps| caps[1].parse().ok())
    }
}

/// Spatial reference of a vector dataset, kept verbatim for writing back
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpatialReference {
    /// GeoPackage `srs_id`
    pub srs_id: Option<i64>,
    /// GeoPackage `srs_name`
    pub name: Option<String>,
    /// Defining organization, usually "EPSG"
    pub organization: Option<String>,
    /// Code assigned by the organization
    pub organization_code: Option<i64>,
    /// WKT definition (`.prj` contents or GeoPackage `definition`)
    pub definition: Option<String>,
    /// GeoPackage `description`
    pub description: Option<String>,
}

impl SpatialReference {
    /// A spatial reference known only by its WKT, as in a `.prj` file
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        SpatialReference {
            definition: Some(wkt.into()),
            ..Default::default()
        }
    }

    /// EPSG code, from the organization fields or else from the WKT
    pub fn epsg_code(&self) -> Option<u32> {
        let by_organization = match (&self.organization, self.organization_code) {
            (Some(org), Some(code)) if org.eq_ignore_ascii_case("EPSG") && code > 0 => u32::try_from(code).ok(),
            _ => None,
        };

        by_organization.or_else(|| {
            self.definition.as_deref().and_then(CoordinateSystemFactory::epsg_from_wkt)
        })
    }

    /// The coordinate system, when it has an EPSG identity
    pub fn coordinate_system(&self) -> Option<CoordinateSystem> {
        self.epsg_code().map(CoordinateSystemFactory::from_epsg)
    }

    /// Human-readable summary
    pub fn describe(&self) -> String {
        match (self.coordinate_system(), &self.name) {
            (Some(cs), _) => cs.description(),
            (None, Some(name)) => name.clone(),
            (None, None) => "Unknown coordinate system".to_string(),
        }
    }
}
