//! Affine geotransformation for rasters

use log::debug;

use crate::coordinate::BoundingBox;
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::geo_key_parser::GeoInfo;

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and map coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// The origin is the outer top-left corner of the top-left cell. For
/// north-up images the rotations are 0 and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Create from GDAL-style array [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to GDAL-style array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Build the transform from GeoTIFF model tags
    ///
    /// ModelTransformation wins when present; otherwise the first tiepoint
    /// and the pixel scale define a north-up grid. PixelIsPoint rasters
    /// anchor values at cell centers, so their origin moves half a cell up
    /// and left to describe cell corners.
    pub fn from_geo_info(geo_info: &GeoInfo) -> TiffResult<Self> {
        let mut transform = match (&geo_info.model_transformation, &geo_info.pixel_scale, &geo_info.tiepoints) {
            (Some(m), _, _) if m.len() >= 16 => {
                GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]])
            },
            (_, Some(scale), Some(tp)) if scale.len() >= 2 && tp.len() >= 6 => {
                let pixel_width = scale[0];
                let pixel_height = -scale[1];
                let origin_x = tp[3] - tp[0] * pixel_width;
                let origin_y = tp[4] - tp[1] * pixel_height;
                GeoTransform::new(origin_x, origin_y, pixel_width, pixel_height)
            },
            _ => return Err(TiffError::MissingGeoreference),
        };

        if transform.determinant().abs() < 1e-15 || !transform.determinant().is_finite() {
            return Err(TiffError::GenericError(format!(
                "Degenerate geotransform: {:?}", transform.to_gdal())));
        }

        if geo_info.is_pixel_is_point() {
            transform.origin_x -= 0.5 * transform.pixel_width + 0.5 * transform.row_rotation;
            transform.origin_y -= 0.5 * transform.col_rotation + 0.5 * transform.pixel_height;
        }

        debug!("Geotransform: {:?}", transform.to_gdal());
        Ok(transform)
    }

    fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation
    }

    /// Convert pixel coordinates to map coordinates (top-left corner)
    pub fn pixel_to_geo_corner(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Convert map coordinates to fractional pixel coordinates (col, row)
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.determinant();
        if det == 0.0 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;

        (col, row)
    }

    /// The (row, col) of the cell containing a map coordinate
    ///
    /// Cells are half-open, so a point on the right or bottom outer edge
    /// falls outside. NaN coordinates never resolve to a cell.
    pub fn cell_for(&self, x: f64, y: f64, width: u32, height: u32) -> Option<(u32, u32)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() {
            return None;
        }

        let (col, row) = (col.floor(), row.floor());
        if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
            return None;
        }
        Some((row as u32, col as u32))
    }

    /// Calculate the bounding box for a raster of given dimensions
    pub fn bounds(&self, width: u32, height: u32) -> BoundingBox {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.pixel_to_geo_corner(0.0, 0.0),
            self.pixel_to_geo_corner(w, 0.0),
            self.pixel_to_geo_corner(0.0, h),
            self.pixel_to_geo_corner(w, h),
        ];

        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

        BoundingBox::new(min_x, min_y, max_x, max_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::tiff::constants::raster_type;

    fn tiepoint_info(origin_x: f64, origin_y: f64, cell: f64) -> GeoInfo {
        let mut info = GeoInfo::new();
        info.pixel_scale = Some(vec![cell, cell, 0.0]);
        info.tiepoints = Some(vec![0.0, 0.0, 0.0, origin_x, origin_y, 0.0]);
        info
    }

    #[test]
    fn test_from_tiepoint_and_scale() {
        let gt = GeoTransform::from_geo_info(&tiepoint_info(0.0, 3.0, 1.0)).unwrap();
        assert_eq!(gt.to_gdal(), [0.0, 1.0, 0.0, 3.0, 0.0, -1.0]);
    }

    #[test]
    fn test_tiepoint_not_at_origin() {
        let mut info = tiepoint_info(0.0, 0.0, 2.0);
        // Raster position (1, 2) pinned to map (10, 20)
        info.tiepoints = Some(vec![1.0, 2.0, 0.0, 10.0, 20.0, 0.0]);
        let gt = GeoTransform::from_geo_info(&info).unwrap();
        assert_relative_eq!(gt.origin_x, 8.0);
        assert_relative_eq!(gt.origin_y, 24.0);
    }

    #[test]
    fn test_model_transformation_wins() {
        let mut info = tiepoint_info(0.0, 3.0, 1.0);
        info.model_transformation = Some(vec![
            2.0, 0.0, 0.0, 100.0,
            0.0, -2.0, 0.0, 200.0,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]);
        let gt = GeoTransform::from_geo_info(&info).unwrap();
        assert_eq!(gt.to_gdal(), [100.0, 2.0, 0.0, 200.0, 0.0, -2.0]);
    }

    #[test]
    fn test_pixel_is_point_shift() {
        let mut info = tiepoint_info(0.5, 2.5, 1.0);
        info.raster_type = raster_type::PIXEL_IS_POINT;
        let gt = GeoTransform::from_geo_info(&info).unwrap();
        assert_relative_eq!(gt.origin_x, 0.0);
        assert_relative_eq!(gt.origin_y, 3.0);
    }

    #[test]
    fn test_missing_georeference() {
        assert!(matches!(GeoTransform::from_geo_info(&GeoInfo::new()), Err(TiffError::MissingGeoreference)));
    }

    #[test]
    fn test_zero_scale_rejected() {
        assert!(GeoTransform::from_geo_info(&tiepoint_info(0.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn test_cell_for_is_half_open() {
        let gt = GeoTransform::new(0.0, 3.0, 1.0, -1.0);
        assert_eq!(gt.cell_for(0.5, 0.5, 3, 3), Some((2, 0)));
        assert_eq!(gt.cell_for(0.0, 3.0, 3, 3), Some((0, 0)));
        assert_eq!(gt.cell_for(2.999, 0.001, 3, 3), Some((2, 2)));
        assert_eq!(gt.cell_for(3.0, 1.5, 3, 3), None);
        assert_eq!(gt.cell_for(1.5, 0.0, 3, 3), None);
        assert_eq!(gt.cell_for(-0.001, 1.5, 3, 3), None);
        assert_eq!(gt.cell_for(f64::NAN, 1.5, 3, 3), None);
    }

    #[test]
    fn test_rotated_roundtrip() {
        let gt = GeoTransform::from_gdal([100.0, 10.0, 2.0, 200.0, 1.5, -10.0]);
        let (x, y) = gt.pixel_to_geo_corner(5.5, 10.5);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let bbox = gt.bounds(100, 100);

        assert_relative_eq!(bbox.min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(bbox.min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(bbox.max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(bbox.max_y, 100.0, epsilon = 1e-10);
    }
}
