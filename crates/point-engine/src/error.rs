//! Error types for point-cloud engines.

use std::path::PathBuf;

use raster_common::RasterError;
use raster_io::RasterIoError;
use thiserror::Error;

/// Errors raised by a point-cloud engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine program could not be started.
    #[error("failed to launch {program}: {message}")]
    Launch { program: String, message: String },

    /// The engine ran but reported failure.
    #[error("{program} exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Metadata output could not be interpreted.
    #[error("invalid metadata for {path}: {message}")]
    InvalidMetadata { path: PathBuf, message: String },

    /// The tile could not be decoded.
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("dimension '{0}' is not supported by this engine")]
    UnsupportedDimension(String),

    #[error("invalid grid job: {0}")]
    InvalidJob(String),

    /// The tile's filtered extent needs more cells than allowed.
    #[error("grid of {width}x{height} cells exceeds the limit of {max_cells} cells")]
    GridTooLarge {
        width: usize,
        height: usize,
        max_cells: usize,
    },

    /// Per-flightline grids could not be combined.
    #[error("flightline grids do not align: {0}")]
    MisalignedLayers(String),

    #[error("raster output error: {0}")]
    RasterIo(#[from] RasterIoError),

    #[error("raster error: {0}")]
    Raster(#[from] RasterError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking worker panicked or was cancelled.
    #[error("engine worker failed: {0}")]
    Worker(String),
}

impl EngineError {
    pub fn read(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Read {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(err.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
