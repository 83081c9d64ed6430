//! GeoTIFF metadata and GeoKey parsing
//!
//! Pulls out the pieces of GeoTIFF metadata the sampler needs: the model
//! tags linking pixels to map coordinates, the EPSG code of the raster's
//! CRS, and whether pixel values describe areas or points.

use log::debug;

use crate::io::seekable::SeekableReader;
use crate::tiff::constants::{geo_keys, raster_type, tags, GEOKEY_USER_DEFINED};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::IFD;
use crate::tiff::reader::TiffReader;

/// One key of the GeoKey directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoKeyEntry {
    pub key_id: u16,
    /// 0 when the value is stored in `value_offset`, otherwise the tag holding it
    pub tiff_tag_location: u16,
    pub count: u16,
    pub value_offset: u16,
}

impl GeoKeyEntry {
    pub fn new(key_id: u16, tiff_tag_location: u16, count: u16, value_offset: u16) -> Self {
        Self { key_id, tiff_tag_location, count, value_offset }
    }

    /// The key's value when it is stored directly in the directory
    pub fn inline_value(&self) -> Option<u16> {
        (self.tiff_tag_location == 0).then_some(self.value_offset)
    }
}

/// Returns a human-readable name for a GeoKey
pub fn get_key_name(key_id: u16) -> &'static str {
    match key_id {
        geo_keys::GT_MODEL_TYPE => "GTModelType",
        geo_keys::GT_RASTER_TYPE => "GTRasterType",
        geo_keys::GEOGRAPHIC_TYPE => "GeographicType",
        geo_keys::PROJECTED_CS_TYPE => "ProjectedCSType",
        geo_keys::VERTICAL_CS_TYPE => "VerticalCSType",
        _ => "Unknown",
    }
}

/// Parser for GeoTIFF geographic metadata
pub struct GeoKeyParser;

impl GeoKeyParser {
    /// Parse the GeoKey directory from an IFD
    ///
    /// The directory is an array of SHORTs: a four value header
    /// (version, revision, minor revision, key count) followed by four
    /// values per key. A missing directory yields no keys.
    pub fn parse_geo_key_directory(
        reader: &mut dyn SeekableReader,
        tiff_reader: &TiffReader,
        ifd: &IFD,
    ) -> TiffResult<Vec<GeoKeyEntry>> {
        if !ifd.has_tag(tags::GEO_KEY_DIRECTORY_TAG) {
            return Ok(Vec::new());
        }

        let values = tiff_reader.read_tag_values(reader, ifd, tags::GEO_KEY_DIRECTORY_TAG)?;
        if values.len() < 4 {
            return Err(TiffError::GenericError("Invalid GeoKey directory header".to_string()));
        }

        let num_keys = values[3] as usize;
        debug!("GeoKey directory: version={}, revision={}.{}, keys={}",
               values[0], values[1], values[2], num_keys);

        let geo_keys = values[4..]
            .chunks_exact(4)
            .take(num_keys)
            .map(|k| GeoKeyEntry::new(k[0] as u16, k[1] as u16, k[2] as u16, k[3] as u16))
            .inspect(|k| debug!("GeoKey: id={} ({}), location={}, count={}, value={}",
                                k.key_id, get_key_name(k.key_id), k.tiff_tag_location, k.count, k.value_offset))
            .collect();

        Ok(geo_keys)
    }

    /// Extract geospatial information from a TIFF IFD
    pub fn extract_geo_info(
        reader: &mut dyn SeekableReader,
        tiff_reader: &TiffReader,
        ifd: &IFD,
    ) -> TiffResult<GeoInfo> {
        let mut geo_info = GeoInfo::new();

        for key in Self::parse_geo_key_directory(reader, tiff_reader, ifd)? {
            let value = match key.inline_value() {
                Some(v) => v,
                None => continue,
            };
            match key.key_id {
                geo_keys::GT_MODEL_TYPE => geo_info.model_type = Some(value),
                geo_keys::GT_RASTER_TYPE => geo_info.raster_type = value,
                geo_keys::PROJECTED_CS_TYPE => geo_info.projected_cs_code = Some(value),
                geo_keys::GEOGRAPHIC_TYPE => geo_info.geographic_cs_code = Some(value),
                _ => {}
            }
        }

        geo_info.pixel_scale = Self::read_optional_doubles(reader, tiff_reader, ifd, tags::MODEL_PIXEL_SCALE_TAG)?;
        geo_info.tiepoints = Self::read_optional_doubles(reader, tiff_reader, ifd, tags::MODEL_TIEPOINT_TAG)?;
        geo_info.model_transformation =
            Self::read_optional_doubles(reader, tiff_reader, ifd, tags::MODEL_TRANSFORMATION_TAG)?;

        Ok(geo_info)
    }

    fn read_optional_doubles(
        reader: &mut dyn SeekableReader,
        tiff_reader: &TiffReader,
        ifd: &IFD,
        tag: u16,
    ) -> TiffResult<Option<Vec<f64>>> {
        if !ifd.has_tag(tag) {
            return Ok(None);
        }
        tiff_reader.read_tag_f64_values(reader, ifd, tag).map(Some)
    }

    /// Format a human-readable description of the raster CRS
    pub fn format_projection_string(geo_info: &GeoInfo) -> String {
        match (geo_info.epsg_code(), geo_info.projected_cs_code, geo_info.geographic_cs_code) {
            (Some(3857), _, _) => "Web Mercator (EPSG:3857)".to_string(),
            (Some(4326), _, _) => "WGS84 Geographic (EPSG:4326)".to_string(),
            (Some(code), _, _) => format!("EPSG:{}", code),
            (None, Some(_), _) | (None, _, Some(_)) => "User-defined coordinate system".to_string(),
            (None, None, None) => "Unknown projection".to_string(),
        }
    }
}

/// Geospatial information extracted from a GeoTIFF
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    /// GTModelTypeGeoKey (1 projected, 2 geographic)
    pub model_type: Option<u16>,
    /// GTRasterTypeGeoKey, PixelIsArea when absent
    pub raster_type: u16,
    /// ProjectedCSTypeGeoKey
    pub projected_cs_code: Option<u16>,
    /// GeographicTypeGeoKey
    pub geographic_cs_code: Option<u16>,
    /// ModelPixelScaleTag values
    pub pixel_scale: Option<Vec<f64>>,
    /// ModelTiepointTag values, six per tiepoint
    pub tiepoints: Option<Vec<f64>>,
    /// ModelTransformationTag, a row-major 4x4 matrix
    pub model_transformation: Option<Vec<f64>>,
}

impl GeoInfo {
    /// Creates a new empty GeoInfo structure
    pub fn new() -> Self {
        GeoInfo {
            model_type: None,
            raster_type: raster_type::PIXEL_IS_AREA,
            projected_cs_code: None,
            geographic_cs_code: None,
            pixel_scale: None,
            tiepoints: None,
            model_transformation: None,
        }
    }

    /// EPSG code of the raster CRS
    ///
    /// The projected code wins over the geographic one; user-defined
    /// codes carry no EPSG identity.
    pub fn epsg_code(&self) -> Option<u32> {
        let usable = |code: Option<u16>| code.filter(|&c| c != 0 && c != GEOKEY_USER_DEFINED);
        usable(self.projected_cs_code)
            .or_else(|| usable(self.geographic_cs_code))
            .map(u32::from)
    }

    /// Whether pixel values refer to the pixel center rather than its area
    pub fn is_pixel_is_point(&self) -> bool {
        self.raster_type == raster_type::PIXEL_IS_POINT
    }
}

impl Default for GeoInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsg_prefers_projected_code() {
        let mut info = GeoInfo::new();
        info.geographic_cs_code = Some(4326);
        assert_eq!(info.epsg_code(), Some(4326));

        info.projected_cs_code = Some(32633);
        assert_eq!(info.epsg_code(), Some(32633));
    }

    #[test]
    fn test_user_defined_code_is_not_epsg() {
        let mut info = GeoInfo::new();
        info.projected_cs_code = Some(GEOKEY_USER_DEFINED);
        assert_eq!(info.epsg_code(), None);
        assert_eq!(GeoKeyParser::format_projection_string(&info), "User-defined coordinate system");
    }

    #[test]
    fn test_raster_type_default() {
        let info = GeoInfo::new();
        assert!(!info.is_pixel_is_point());
    }
}
