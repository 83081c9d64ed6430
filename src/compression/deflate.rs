//! Handler for Adobe Deflate compressed data

use std::io::Read;
use flate2::read::ZlibDecoder;
use crate::tiff::errors::{TiffError, TiffResult};
use super::handler::CompressionHandler;

/// Deflate (Zlib) compression handler
///
/// Serves both the Adobe code 8 and the legacy code 32946, which share
/// the same stream format.
pub struct AdobeDeflateHandler {
    code: u64,
}

impl AdobeDeflateHandler {
    pub fn new(code: u64) -> Self {
        AdobeDeflateHandler { code }
    }
}

impl CompressionHandler for AdobeDeflateHandler {
    fn decompress(&self, data: &[u8]) -> TiffResult<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut decompressed_data = Vec::new();
        decoder.read_to_end(&mut decompressed_data)
            .map_err(|e| TiffError::GenericError(format!("Deflate decompression error: {}", e)))?;
        Ok(decompressed_data)
    }

    fn name(&self) -> &'static str {
        "Adobe Deflate"
    }

    fn code(&self) -> u64 {
        self.code
    }
}
