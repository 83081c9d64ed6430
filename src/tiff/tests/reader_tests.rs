//! Tests for the TIFF reader and GeoKey parsing

extern crate std;

use crate::tiff::constants::{geo_keys, tags};
use crate::tiff::geo_key_parser::GeoKeyParser;
use crate::tiff::reader::TiffReader;
use crate::tiff::tests::test_utils::{create_test_bigtiff_buffer, float_geotiff, TiffFixture};

#[test]
fn test_read_classic_tiff() {
    let mut cursor = float_geotiff(3, 2, &[1.0; 6], 10.0, 20.0, 1.0).build_cursor();
    let mut reader = TiffReader::new();

    let tiff = reader.read(&mut cursor).unwrap();
    std::assert!(!tiff.is_big_tiff);
    std::assert_eq!(tiff.ifd_count(), 1);
    std::assert_eq!(tiff.main_ifd().unwrap().get_dimensions(), Some((3, 2)));
}

#[test]
fn test_read_big_endian_tiff() {
    // Single SHORT values are left-justified in big-endian value fields
    let mut cursor = TiffFixture::new(true)
        .shorts(tags::IMAGE_WIDTH, &[5])
        .longs(tags::IMAGE_LENGTH, &[4])
        .shorts(tags::BITS_PER_SAMPLE, &[16, 16])
        .build_cursor();
    let mut reader = TiffReader::new();

    let tiff = reader.read(&mut cursor).unwrap();
    let ifd = tiff.main_ifd().unwrap();
    std::assert_eq!(ifd.get_dimensions(), Some((5, 4)));

    let bits = reader.read_tag_values(&mut cursor, ifd, tags::BITS_PER_SAMPLE).unwrap();
    std::assert_eq!(bits, vec![16, 16]);
    std::assert_eq!(reader.read_tag_scalar(&mut cursor, ifd, tags::IMAGE_WIDTH).unwrap(), Some(5));
    std::assert_eq!(reader.read_tag_scalar(&mut cursor, ifd, tags::PREDICTOR).unwrap(), None);
}

#[test]
fn test_read_bigtiff() {
    let mut cursor = create_test_bigtiff_buffer();
    let mut reader = TiffReader::new();

    let tiff = reader.read(&mut cursor).unwrap();
    std::assert!(tiff.is_big_tiff);
    let ifd = tiff.main_ifd().unwrap();
    std::assert_eq!(ifd.get_dimensions(), Some((1024, 768)));

    let scale = reader.read_tag_f64_values(&mut cursor, ifd, tags::MODEL_PIXEL_SCALE_TAG).unwrap();
    std::assert_eq!(scale, vec![2.5, 2.5, 0.0]);
}

#[test]
fn test_read_ascii_tags() {
    let mut cursor = float_geotiff(1, 1, &[0.0], 0.0, 0.0, 1.0)
        .ascii(tags::GDAL_NODATA, "-9999")
        .ascii(tags::GEO_ASCII_PARAMS_TAG, "a|")
        .build_cursor();
    let mut reader = TiffReader::new();
    let tiff = reader.read(&mut cursor).unwrap();
    let ifd = tiff.main_ifd().unwrap();

    std::assert_eq!(reader.read_tag_ascii(&mut cursor, ifd, tags::GDAL_NODATA).unwrap(), "-9999");
    // Three bytes including the terminator, stored inline
    std::assert_eq!(reader.read_tag_ascii(&mut cursor, ifd, tags::GEO_ASCII_PARAMS_TAG).unwrap(), "a|");
}

#[test]
fn test_missing_tag() {
    let mut cursor = float_geotiff(1, 1, &[0.0], 0.0, 0.0, 1.0).build_cursor();
    let mut reader = TiffReader::new();
    let tiff = reader.read(&mut cursor).unwrap();

    let result = reader.read_tag_ascii(&mut cursor, tiff.main_ifd().unwrap(), tags::GDAL_NODATA);
    std::assert!(result.is_err());
}

#[test]
fn test_extract_geo_info() {
    let mut cursor = float_geotiff(3, 3, &[0.0; 9], 0.0, 3.0, 1.0)
        .shorts(tags::GEO_KEY_DIRECTORY_TAG, &[
            1, 1, 0, 3,
            geo_keys::GT_MODEL_TYPE, 0, 1, 1,
            geo_keys::GT_RASTER_TYPE, 0, 1, 2,
            geo_keys::PROJECTED_CS_TYPE, 0, 1, 32633,
        ])
        .build_cursor();
    let mut reader = TiffReader::new();
    let tiff = reader.read(&mut cursor).unwrap();
    let ifd = tiff.main_ifd().unwrap();

    let info = GeoKeyParser::extract_geo_info(&mut cursor, &reader, ifd).unwrap();
    std::assert_eq!(info.epsg_code(), Some(32633));
    std::assert!(info.is_pixel_is_point());
    std::assert_eq!(info.pixel_scale, Some(vec![1.0, 1.0, 0.0]));
    std::assert_eq!(info.tiepoints, Some(vec![0.0, 0.0, 0.0, 0.0, 3.0, 0.0]));
    std::assert!(info.model_transformation.is_none());
}

#[test]
fn test_not_a_tiff() {
    let mut cursor = std::io::Cursor::new(b"PK\x03\x04 not a tiff".to_vec());
    let mut reader = TiffReader::new();
    std::assert!(reader.read(&mut cursor).is_err());
}
