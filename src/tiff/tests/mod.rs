//! Unit tests for the TIFF reader

pub(crate) mod test_utils;
mod reader_tests;
