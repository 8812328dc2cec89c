//! Error types for raster types.

use thiserror::Error;

use crate::profile::PixelType;

/// Result type alias using RasterError.
pub type RasterResult<T> = Result<T, RasterError>;

/// Errors raised when a raster profile or buffer is inconsistent.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("invalid raster profile: {0}")]
    InvalidProfile(String),

    #[error("sample buffer holds {actual} values, profile requires {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("nodata value {nodata} cannot be represented as {pixel_type}")]
    NodataNotRepresentable { nodata: f64, pixel_type: PixelType },

    #[error("pixel ({band}, {row}, {col}) is outside the raster")]
    OutOfBounds { band: usize, row: usize, col: usize },
}
