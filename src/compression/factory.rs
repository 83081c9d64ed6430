//! Factory for creating compression handlers

use crate::tiff::constants::compression;
use crate::tiff::errors::{TiffError, TiffResult};
use super::handler::CompressionHandler;
use super::uncompressed::UncompressedHandler;
use super::deflate::AdobeDeflateHandler;
use super::lzw::LzwHandler;
use super::zstd::ZstdHandler;

/// Factory for creating compression handlers
pub struct CompressionFactory;

impl CompressionFactory {
    /// Create a compression handler for the given compression code
    pub fn create_handler(code: u64) -> TiffResult<Box<dyn CompressionHandler>> {
        let code16 = u16::try_from(code).map_err(|_| TiffError::UnsupportedCompression(code))?;
        match code16 {
            compression::NONE => Ok(Box::new(UncompressedHandler)),
            compression::LZW => Ok(Box::new(LzwHandler)),
            compression::DEFLATE | compression::DEFLATE_OLD => Ok(Box::new(AdobeDeflateHandler::new(code))),
            compression::ZSTD => Ok(Box::new(ZstdHandler)),
            _ => Err(TiffError::UnsupportedCompression(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(CompressionFactory::create_handler(1).unwrap().name(), "Uncompressed");
        assert_eq!(CompressionFactory::create_handler(5).unwrap().name(), "LZW");
        assert_eq!(CompressionFactory::create_handler(8).unwrap().code(), 8);
        assert_eq!(CompressionFactory::create_handler(32946).unwrap().code(), 32946);
        assert_eq!(CompressionFactory::create_handler(14).unwrap().name(), "ZSTD");
    }

    #[test]
    fn test_unsupported_code() {
        // JPEG is lossy and never used for elevation
        assert!(matches!(CompressionFactory::create_handler(7), Err(TiffError::UnsupportedCompression(7))));
        assert!(CompressionFactory::create_handler(1 << 20).is_err());
    }
}
