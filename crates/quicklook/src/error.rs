//! Error types for the quick-look pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::TileId;

/// Errors raised by the pipeline.
///
/// Per-tile kinds (`MetadataQueryFailed`, `UnknownFormatVersion`,
/// `TileRasterizationFailed`) are captured as [`TileFailure`] records by the
/// executor; only discovery and mosaic-write failures end a batch.
#[derive(Error, Debug)]
pub enum QuickLookError {
    /// The input directory could not be enumerated.
    #[error("failed to discover tiles in {path}: {message}")]
    TileDiscoveryFailed { path: PathBuf, message: String },

    #[error("metadata query failed for tile {tile}: {message}")]
    MetadataQueryFailed { tile: TileId, message: String },

    #[error("tile {tile}: unknown format version '{version}'")]
    UnknownFormatVersion { tile: TileId, version: String },

    #[error("rasterization failed for tile {tile}: {message}")]
    TileRasterizationFailed { tile: TileId, message: String },

    /// No tile produced a non-empty raster.
    #[error("no tiles were generated")]
    NoTilesGenerated,

    #[error("failed to write mosaic {path}: {message}")]
    MosaicWriteFailed { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A second result was stored for the same tile.
    #[error("result for tile {0} already stored")]
    DuplicateResult(TileId),

    /// A result arrived after the store was handed to the assembler.
    #[error("result store is frozen")]
    StoreFrozen,

    /// Inputs to the mosaic are inconsistent.
    #[error("cannot assemble mosaic: {0}")]
    MosaicAssembly(String),
}

impl QuickLookError {
    pub fn discovery(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::TileDiscoveryFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn mosaic_write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::MosaicWriteFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// The per-tile failure record for this error, if it is a per-tile kind.
    pub fn to_tile_failure(&self) -> Option<TileFailure> {
        let (tile, stage) = match self {
            Self::MetadataQueryFailed { tile, .. } => (tile, FailureStage::Metadata),
            Self::UnknownFormatVersion { tile, .. } => (tile, FailureStage::Classification),
            Self::TileRasterizationFailed { tile, .. } => (tile, FailureStage::Rasterization),
            _ => return None,
        };
        Some(TileFailure::new(tile.clone(), stage, self.to_string()))
    }
}

/// Pipeline stage at which a tile failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Metadata,
    Classification,
    Rasterization,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Metadata => "metadata",
            FailureStage::Classification => "classification",
            FailureStage::Rasterization => "rasterization",
        })
    }
}

/// Final record of a tile that did not contribute to the mosaic because of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileFailure {
    pub tile: TileId,
    pub stage: FailureStage,
    pub message: String,
}

impl TileFailure {
    pub fn new(tile: TileId, stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            tile,
            stage,
            message: message.into(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, QuickLookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_failure_conversion() {
        let err = QuickLookError::UnknownFormatVersion {
            tile: TileId::new("tile_07.las"),
            version: "1.3".to_string(),
        };
        let failure = err.to_tile_failure().unwrap();
        assert_eq!(failure.stage, FailureStage::Classification);
        assert_eq!(failure.tile.as_str(), "tile_07.las");
        assert!(failure.message.contains("1.3"));

        assert!(QuickLookError::NoTilesGenerated.to_tile_failure().is_none());
    }
}
