//! Machine-readable batch summary.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use point_engine::Statistic;
use raster_common::{BoundingBox, PixelType, RasterBuffer};
use serde::{Deserialize, Serialize};

use crate::config::FailurePolicy;
use crate::error::{QuickLookError, Result, TileFailure};
use crate::executor::TileReport;

/// How a batch ended when no batch-terminating error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    MosaicWritten,
    /// The input directory held no matching tile; nothing was attempted.
    NoInputTiles,
    /// Tiles were attempted but none produced data; nothing was written.
    NoTilesGenerated,
}

/// Shape of the written mosaic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicSummary {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
    pub bounds: BoundingBox,
    pub pixel_type: PixelType,
    pub nodata: Option<f64>,
    pub crs: Option<String>,
    pub valid_cells: usize,
}

impl MosaicSummary {
    pub fn new(path: &Path, mosaic: &RasterBuffer) -> Self {
        Self {
            path: path.to_path_buf(),
            width: mosaic.width(),
            height: mosaic.height(),
            resolution: mosaic.profile.transform.resolution().0,
            bounds: mosaic.bounds(),
            pixel_type: mosaic.profile.pixel_type,
            nodata: mosaic.nodata(),
            crs: mosaic.profile.crs.as_ref().map(|c| c.short_name()),
            valid_cells: mosaic.valid_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub statistic: Statistic,
    pub engine: String,
    pub input_dir: PathBuf,
    pub failure_policy: FailurePolicy,
    pub discovered: usize,
    pub rasterized: usize,
    pub empty: usize,
    pub failed: usize,
    pub failures: Vec<TileFailure>,
    pub tiles: Vec<TileReport>,
    pub mosaic: Option<MosaicSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

impl BatchReport {
    /// Tiles that finished without error, with or without data.
    pub fn succeeded(&self) -> usize {
        self.rasterized + self.empty
    }

    /// False only when the failure policy is strict and some tile failed.
    pub fn is_success(&self) -> bool {
        !(self.failure_policy == FailurePolicy::Strict && self.failed > 0)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| QuickLookError::MosaicAssembly(format!("report serialization: {}", e)))
    }

    /// Write the report as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let body = self.to_json()?;
        std::fs::write(path, body).map_err(|e| QuickLookError::mosaic_write(path, e))
    }
}
