//! Error types for raster encoding and decoding.

use raster_common::{PixelType, RasterError};
use thiserror::Error;

/// Errors raised while reading or writing GeoTIFF files.
#[derive(Error, Debug)]
pub enum RasterIoError {
    /// Failure inside the TIFF codec.
    #[error("TIFF codec error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Decoded samples do not form a consistent raster.
    #[error("invalid raster: {0}")]
    Raster(#[from] RasterError),

    /// The file carries no usable pixel-to-world mapping.
    #[error("missing georeference: {0}")]
    MissingGeoreference(String),

    /// Sample layout the codec does not handle (multi-sample pixels, tiles of mixed types).
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("unsupported pixel type: {0}")]
    UnsupportedPixelType(PixelType),
}

impl RasterIoError {
    pub fn missing_georeference(msg: impl Into<String>) -> Self {
        Self::MissingGeoreference(msg.into())
    }

    pub fn unsupported_layout(msg: impl Into<String>) -> Self {
        Self::UnsupportedLayout(msg.into())
    }
}

/// Result type for raster I/O operations.
pub type Result<T> = std::result::Result<T, RasterIoError>;
