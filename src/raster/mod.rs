//! Raster accessor for single-band GeoTIFF DTMs
//!
//! A [`RasterHandle`] keeps the GeoTIFF open for its whole lifetime and
//! answers batched point lookups with nearest-cell values from the first
//! band. Dropping the handle closes the file.

mod block;
mod layout;
pub mod transform;

use log::{debug, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::coordinate::{BoundingBox, CoordinateSystem, CoordinateSystemFactory};
use crate::errors::{ElevError, ElevResult};
use crate::io::seekable::SeekableReader;
use crate::tiff::constants::tags;
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::geo_key_parser::{GeoInfo, GeoKeyParser};
use crate::tiff::ifd::IFD;
use crate::tiff::reader::TiffReader;
use crate::tiff::validation;

use self::block::BlockDecoder;
use self::layout::BlockLayout;
pub use self::transform::GeoTransform;

/// Extensions accepted for raster paths
const TIFF_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

/// An open GeoTIFF raster
pub struct RasterHandle {
    path: PathBuf,
    reader: Box<dyn SeekableReader>,
    file_size: u64,
    layout: BlockLayout,
    decoder: BlockDecoder,
    transform: GeoTransform,
    nodata: f64,
    geo_info: GeoInfo,
    is_big_tiff: bool,
    image_count: usize,
    overview_count: usize,
}

/// Whether a path names a GeoTIFF by its extension
pub fn has_tiff_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TIFF_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

impl RasterHandle {
    /// Opens a GeoTIFF read-only
    ///
    /// `fallback_nodata` is used when the file carries no GDAL nodata tag.
    pub fn open(path: impl AsRef<Path>, fallback_nodata: f64) -> ElevResult<Self> {
        let path = path.as_ref();
        if !has_tiff_extension(path) {
            return Err(ElevError::invalid_format(
                path, "raster must be a GeoTIFF file with a .tif or .tiff extension"));
        }

        let file = File::open(path).map_err(|e| ElevError::io(path, e))?;
        info!("Opening raster {}", path.display());
        Self::from_reader(path, Box::new(BufReader::new(file)), fallback_nodata)
    }

    /// Reads the raster from an already open source
    ///
    /// `path` is only used to label errors.
    pub fn from_reader(
        path: impl AsRef<Path>,
        mut reader: Box<dyn SeekableReader>,
        fallback_nodata: f64,
    ) -> ElevResult<Self> {
        let path = path.as_ref().to_path_buf();
        let parts = Self::read_structure(reader.as_mut(), fallback_nodata)
            .map_err(|e| ElevError::from_tiff(&path, e))?;

        let handle = RasterHandle {
            path,
            reader,
            file_size: parts.file_size,
            decoder: parts.decoder,
            layout: parts.layout,
            transform: parts.transform,
            nodata: parts.nodata,
            geo_info: parts.geo_info,
            is_big_tiff: parts.is_big_tiff,
            image_count: parts.image_count,
            overview_count: parts.overview_count,
        };

        info!("Raster {}x{}, nodata {}, CRS {}", handle.width(), handle.height(), handle.nodata,
              GeoKeyParser::format_projection_string(&handle.geo_info));
        Ok(handle)
    }

    fn read_structure(reader: &mut dyn SeekableReader, fallback_nodata: f64) -> TiffResult<RasterParts> {
        let mut tiff_reader = TiffReader::new();
        let tiff = tiff_reader.read(reader)?;
        let ifd = tiff.main_ifd()
            .ok_or_else(|| TiffError::GenericError("File contains no images".to_string()))?;

        let layout = BlockLayout::from_ifd(reader, &tiff_reader, ifd)?;
        let decoder = BlockDecoder::new(&layout, tiff_reader.handler()?.byte_order())?;
        let geo_info = GeoKeyParser::extract_geo_info(reader, &tiff_reader, ifd)?;
        let transform = GeoTransform::from_geo_info(&geo_info)?;
        let nodata = read_nodata(reader, &tiff_reader, ifd, fallback_nodata)?;
        let file_size = validation::get_file_size(reader)?;

        debug!("Block compression: {}", decoder.compression_name());

        Ok(RasterParts {
            file_size,
            layout,
            decoder,
            transform,
            nodata,
            geo_info,
            is_big_tiff: tiff.is_big_tiff,
            image_count: tiff.ifd_count(),
            overview_count: tiff.overviews().len(),
        })
    }

    /// Samples the first band at each map coordinate
    ///
    /// Returns one value per coordinate in input order. Coordinates off
    /// the grid, NaN included, yield the nodata value. Every block needed
    /// is decoded exactly once per call.
    pub fn sample(&mut self, coords: &[(f64, f64)]) -> ElevResult<Vec<f64>> {
        let mut values = vec![self.nodata; coords.len()];

        let mut lookups: Vec<(usize, usize, usize)> = coords.iter()
            .enumerate()
            .filter_map(|(index, &(x, y))| {
                let (row, col) = self.transform.cell_for(x, y, self.layout.width, self.layout.height)?;
                let (block, sample) = self.layout.locate(row, col);
                Some((block, sample, index))
            })
            .collect();
        lookups.sort_unstable();

        let outside = coords.len() - lookups.len();
        let mut current: Option<(usize, Vec<u8>)> = None;
        let mut blocks_decoded = 0;

        for (block, sample, index) in lookups {
            if current.as_ref().map(|(cached, _)| *cached) != Some(block) {
                let data = self.decoder.decode(self.reader.as_mut(), &self.layout, block, self.file_size)
                    .map_err(|e| ElevError::from_tiff(&self.path, e))?;
                blocks_decoded += 1;
                current = Some((block, data));
            }
            if let Some((_, data)) = &current {
                values[index] = self.decoder.sample_at(data, &self.layout, sample)
                    .map_err(|e| ElevError::from_tiff(&self.path, e))?;
            }
        }

        debug!("Sampled {} coordinates from {} blocks, {} outside the grid",
               coords.len(), blocks_decoded, outside);
        Ok(values)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    /// EPSG code of the raster CRS, when the GeoKeys declare one
    pub fn epsg(&self) -> Option<u32> {
        self.geo_info.epsg_code()
    }

    pub fn crs(&self) -> Option<CoordinateSystem> {
        self.epsg().map(CoordinateSystemFactory::from_epsg)
    }

    /// Map extent of the grid
    pub fn bounds(&self) -> BoundingBox {
        let mut bounds = self.transform.bounds(self.width(), self.height());
        if let Some(epsg) = self.epsg() {
            bounds.epsg = Some(epsg);
        }
        bounds
    }

    /// Multi-line summary for the info command
    pub fn describe(&self) -> String {
        let bounds = self.bounds();
        let mut lines = vec![
            format!("Raster: {}", self.path.display()),
            format!("  Format: {}", if self.is_big_tiff { "BigTIFF" } else { "TIFF" }),
            format!("  Size: {} x {} cells", self.width(), self.height()),
            format!("  Layout: {} {}x{}, compression {}",
                    if self.layout.tiled { "tiles" } else { "strips" },
                    self.layout.block_width, self.layout.block_height, self.decoder.compression_name()),
            format!("  Samples: {} bit, format {}", self.layout.bits_per_sample, self.layout.sample_format),
            format!("  Transform: {:?}", self.transform.to_gdal()),
            format!("  Bounds: ({}, {}) - ({}, {})", bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y),
            format!("  Nodata: {}", self.nodata),
            format!("  CRS: {}", GeoKeyParser::format_projection_string(&self.geo_info)),
        ];
        if self.image_count > 1 {
            lines.push(format!("  Images: {} ({} overviews)", self.image_count, self.overview_count));
        }
        lines.join("\n")
    }
}

/// Everything read from the file before the handle is assembled
struct RasterParts {
    file_size: u64,
    layout: BlockLayout,
    decoder: BlockDecoder,
    transform: GeoTransform,
    nodata: f64,
    geo_info: GeoInfo,
    is_big_tiff: bool,
    image_count: usize,
    overview_count: usize,
}

/// Nodata from the GDAL_NODATA tag, or the fallback
fn read_nodata(reader: &mut dyn SeekableReader, tiff_reader: &TiffReader, ifd: &IFD, fallback: f64) -> TiffResult<f64> {
    if !ifd.has_tag(tags::GDAL_NODATA) {
        debug!("No GDAL_NODATA tag, using fallback nodata {}", fallback);
        return Ok(fallback);
    }

    let text = tiff_reader.read_tag_ascii(reader, ifd, tags::GDAL_NODATA)?;
    match text.trim().parse::<f64>() {
        Ok(value) => Ok(value),
        Err(_) => {
            warn!("Unparseable GDAL_NODATA value {:?}, using {}", text, fallback);
            Ok(fallback)
        }
    }
}
