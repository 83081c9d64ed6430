//! I/O utilities for file handling
//!
//! Byte-order strategies and the seekable reader abstraction shared by
//! the GeoTIFF reader and the vector codecs.

pub mod seekable;
pub mod byte_order;
