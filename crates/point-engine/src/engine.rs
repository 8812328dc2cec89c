//! The engine trait and engine selection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use raster_common::RasterBuffer;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::job::{GridJob, TileMetadata};
use crate::native::NativeLasEngine;
use crate::pdal::PdalEngine;

/// A point-cloud processing engine.
///
/// Implementations must be safe to call concurrently; each call is an
/// independent unit of work on one tile.
#[async_trait]
pub trait PointCloudEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Read header-level metadata of a tile.
    async fn query_metadata(&self, path: &Path) -> EngineResult<TileMetadata>;

    /// Filter and grid one tile.
    ///
    /// # Returns
    /// * `Ok(Some(raster))` - the gridded tile, empty cells set to the engine's nodata
    /// * `Ok(None)` - no point passed the filters
    async fn rasterize(&self, job: &GridJob) -> EngineResult<Option<RasterBuffer>>;
}

/// Available engine implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process LAS/LAZ decoding and binning.
    #[default]
    Native,
    /// The PDAL command-line application, one process per call.
    Pdal,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Native => "native",
            EngineKind::Pdal => "pdal",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "las" => Ok(EngineKind::Native),
            "pdal" => Ok(EngineKind::Pdal),
            other => Err(format!("unknown engine '{}', expected native or pdal", other)),
        }
    }
}

/// Build the selected engine. `pdal_path` is only used by [`EngineKind::Pdal`].
pub fn create_engine(kind: EngineKind, pdal_path: impl Into<PathBuf>) -> Arc<dyn PointCloudEngine> {
    match kind {
        EngineKind::Native => Arc::new(NativeLasEngine::new()),
        EngineKind::Pdal => Arc::new(PdalEngine::new(pdal_path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind() {
        assert_eq!("PDAL".parse::<EngineKind>(), Ok(EngineKind::Pdal));
        assert_eq!(EngineKind::default(), EngineKind::Native);
        assert!("gdal".parse::<EngineKind>().is_err());
        assert_eq!(create_engine(EngineKind::Pdal, "pdal").name(), "pdal");
        assert_eq!(create_engine(EngineKind::Native, "pdal").name(), "native");
    }
}
