//! Handler for LZW compressed data

use crate::tiff::errors::{TiffError, TiffResult};
use super::handler::CompressionHandler;
use log::debug;

/// LZW compression handler (compression code 5)
///
/// TIFF LZW is MSB-first with 8-bit symbols and switches code size one
/// code early.
pub struct LzwHandler;

impl CompressionHandler for LzwHandler {
    fn decompress(&self, data: &[u8]) -> TiffResult<Vec<u8>> {
        let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
        let decompressed = decoder.decode(data)
            .map_err(|e| TiffError::GenericError(format!("LZW decompression error: {}", e)))?;
        debug!("LZW decompressed {} bytes to {}", data.len(), decompressed.len());
        Ok(decompressed)
    }

    fn name(&self) -> &'static str {
        "LZW"
    }

    fn code(&self) -> u64 {
        5
    }
}
