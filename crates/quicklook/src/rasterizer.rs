//! Single-tile rasterization.

use std::sync::Arc;

use point_engine::{
    ClassSet, Dimension, GridJob, PointCloudEngine, ReturnGroup, Statistic, DEFAULT_MAX_GRID_CELLS,
};
use raster_common::RasterBuffer;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::catalog::Tile;
use crate::error::{QuickLookError, Result};

/// What to grid and how.
///
/// Built once per batch with `classification = None`; the executor fills in
/// each tile's codes from the classification policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRequest {
    pub statistic: Statistic,
    /// Cell size in the tiles' horizontal units.
    pub resolution: f64,
    pub classification: Option<ClassSet>,
    #[serde(default)]
    pub dimension: Dimension,
    #[serde(default)]
    pub returns: Vec<ReturnGroup>,
    /// Largest per-tile grid, in cells.
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,
}

fn default_max_cells() -> usize {
    DEFAULT_MAX_GRID_CELLS
}

impl Default for GridRequest {
    fn default() -> Self {
        Self::new(Statistic::Mean, 1.0)
    }
}

impl GridRequest {
    pub fn new(statistic: Statistic, resolution: f64) -> Self {
        Self {
            statistic,
            resolution,
            classification: None,
            dimension: Dimension::z(),
            returns: Vec::new(),
            max_cells: DEFAULT_MAX_GRID_CELLS,
        }
    }

    /// Copy of this request for one tile's classification codes.
    pub fn for_classification(&self, codes: ClassSet) -> Self {
        Self {
            classification: Some(codes),
            ..self.clone()
        }
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_returns(mut self, returns: Vec<ReturnGroup>) -> Self {
        self.returns = returns;
        self
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    /// Return groups handed to the engine.
    ///
    /// Flightline spread compares last and single returns unless the
    /// request names its own groups.
    pub fn engine_returns(&self) -> Vec<ReturnGroup> {
        if self.returns.is_empty() && self.statistic.is_per_flightline() {
            vec![ReturnGroup::Last, ReturnGroup::Only]
        } else {
            self.returns.clone()
        }
    }
}

/// Runs the point-cloud engine for one tile at a time.
#[derive(Clone)]
pub struct TileRasterizer {
    engine: Arc<dyn PointCloudEngine>,
}

impl TileRasterizer {
    pub fn new(engine: Arc<dyn PointCloudEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn PointCloudEngine> {
        &self.engine
    }

    /// Filter and grid one tile in memory.
    ///
    /// # Returns
    /// * `Ok(Some(raster))` - at least one cell holds data; the raster carries
    ///   the tile's spatial reference when one was resolved
    /// * `Ok(None)` - no point matched, or every cell is nodata
    /// * `Err(TileRasterizationFailed)` - any engine failure, with its message
    #[instrument(skip(self, tile, request), fields(tile = %tile.id, statistic = %request.statistic))]
    pub async fn rasterize(
        &self,
        tile: &Tile,
        request: &GridRequest,
    ) -> Result<Option<RasterBuffer>> {
        let failed = |message: String| QuickLookError::TileRasterizationFailed {
            tile: tile.id.clone(),
            message,
        };

        let classes = request
            .classification
            .clone()
            .ok_or_else(|| failed("no classification code resolved".to_string()))?;

        let job = GridJob::new(&tile.path, classes.clone(), request.statistic)
            .with_resolution(request.resolution)
            .with_dimension(request.dimension.clone())
            .with_returns(request.engine_returns())
            .with_max_cells(request.max_cells);

        let raster = self
            .engine
            .rasterize(&job)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let Some(mut raster) = raster else {
            debug!(classes = %classes, "No points matched");
            return Ok(None);
        };
        if raster.is_empty() {
            debug!(classes = %classes, "Engine returned an all-nodata raster");
            return Ok(None);
        }

        if tile.srs.is_some() {
            raster.profile.crs = tile.srs.clone();
        }
        Ok(Some(raster))
    }
}
