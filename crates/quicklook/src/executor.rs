//! Bounded parallel rasterization of a tile set.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use raster_common::RasterBuffer;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::catalog::{CatalogEntry, Tile, TileId};
use crate::classification::ClassificationPolicy;
use crate::error::{FailureStage, QuickLookError, TileFailure};
use crate::progress::{rasterize_phase, ProgressSink};
use crate::rasterizer::{GridRequest, TileRasterizer};
use crate::store::ResultStore;

/// Half the available hardware parallelism, at least 1.
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / 2).max(1)
}

/// Final state of one attempted tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TileOutcome {
    /// Non-empty raster stored.
    Rasterized,
    /// Rasterization succeeded but no point matched.
    Empty,
    Failed(TileFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileReport {
    pub tile: TileId,
    pub ordinal: usize,
    pub outcome: TileOutcome,
}

/// Everything the executor learned about a batch.
#[derive(Debug, Default)]
pub struct ExecutionSummary {
    /// One report per input entry, in discovery order.
    pub tiles: Vec<TileReport>,
    /// Tile identities in the order their attempts completed.
    pub completion_order: Vec<TileId>,
    /// Frozen store contents, in discovery order.
    pub rasters: Vec<RasterBuffer>,
}

impl ExecutionSummary {
    pub fn attempted(&self) -> usize {
        self.tiles.len()
    }

    pub fn rasterized(&self) -> usize {
        self.count(|o| matches!(o, TileOutcome::Rasterized))
    }

    pub fn empty(&self) -> usize {
        self.count(|o| matches!(o, TileOutcome::Empty))
    }

    /// Tiles whose attempt finished without error, empty or not.
    pub fn succeeded(&self) -> usize {
        self.rasterized() + self.empty()
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TileOutcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &TileFailure> {
        self.tiles.iter().filter_map(|t| match &t.outcome {
            TileOutcome::Failed(f) => Some(f),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&TileOutcome) -> bool) -> usize {
        self.tiles.iter().filter(|t| pred(&t.outcome)).count()
    }
}

/// Runs one rasterization per tile with at most `workers` in flight.
///
/// Every tile runs in its own task, so a panicking engine call is reported as
/// that tile's failure. Per-tile errors never stop other tiles and nothing is
/// retried. Progress is reported from the coordinating task after each
/// completion.
#[derive(Debug, Clone, Copy)]
pub struct ParallelExecutor {
    workers: usize,
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new(default_workers())
    }
}

impl ParallelExecutor {
    /// Executor with `workers` slots; 0 is raised to 1.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Attempt every entry exactly once and return when all have finished.
    ///
    /// Entries that already failed metadata resolution are recorded as
    /// failures without dispatch. Tiles whose version has no classification
    /// code fail before reaching the rasterizer.
    #[instrument(skip_all, fields(tiles = entries.len(), workers = self.workers, statistic = %request.statistic))]
    pub async fn run(
        &self,
        entries: Vec<CatalogEntry>,
        request: &GridRequest,
        rasterizer: &TileRasterizer,
        policy: &ClassificationPolicy,
        progress: &dyn ProgressSink,
    ) -> ExecutionSummary {
        let total = entries.len();
        let phase = rasterize_phase(request.statistic);
        let store = Arc::new(ResultStore::new());

        progress.update(0, total, &phase);

        let mut completions = stream::iter(entries)
            .map(|entry| {
                let store = store.clone();
                async move {
                    match entry {
                        CatalogEntry::Failed { ordinal, failure } => TileReport {
                            tile: failure.tile.clone(),
                            ordinal,
                            outcome: TileOutcome::Failed(failure),
                        },
                        CatalogEntry::Resolved(tile) => {
                            dispatch(tile, request, rasterizer, policy, store).await
                        }
                    }
                }
            })
            .buffer_unordered(self.workers);

        let mut tiles = Vec::with_capacity(total);
        let mut completion_order = Vec::with_capacity(total);
        while let Some(report) = completions.next().await {
            log_outcome(&report);
            completion_order.push(report.tile.clone());
            tiles.push(report);
            progress.update(tiles.len(), total, &phase);
        }
        drop(completions);
        progress.finish(&phase);

        tiles.sort_by_key(|t| t.ordinal);
        let rasters = store.freeze().await;

        let summary = ExecutionSummary {
            tiles,
            completion_order,
            rasters,
        };
        info!(
            attempted = summary.attempted(),
            rasterized = summary.rasterized(),
            empty = summary.empty(),
            failed = summary.failed(),
            "Rasterization finished"
        );
        summary
    }
}

async fn dispatch(
    tile: Tile,
    request: &GridRequest,
    rasterizer: &TileRasterizer,
    policy: &ClassificationPolicy,
    store: Arc<ResultStore>,
) -> TileReport {
    let id = tile.id.clone();
    let ordinal = tile.ordinal;
    let report = |outcome| TileReport {
        tile: id.clone(),
        ordinal,
        outcome,
    };

    let codes = match policy.resolve(&tile.id, &tile.version) {
        Ok(codes) => codes,
        Err(e) => return report(TileOutcome::Failed(failure_of(&tile.id, e))),
    };

    let request = request.for_classification(codes);
    let rasterizer = rasterizer.clone();
    let task = tokio::spawn(async move { rasterize_tile(tile, request, rasterizer, store).await });

    match task.await {
        Ok(outcome) => report(outcome),
        Err(e) => report(TileOutcome::Failed(TileFailure::new(
            id.clone(),
            FailureStage::Rasterization,
            format!("worker task failed: {}", e),
        ))),
    }
}

#[instrument(name = "rasterize_tile", skip_all, fields(tile = %tile.id))]
async fn rasterize_tile(
    tile: Tile,
    request: GridRequest,
    rasterizer: TileRasterizer,
    store: Arc<ResultStore>,
) -> TileOutcome {
    let raster = match rasterizer.rasterize(&tile, &request).await {
        Ok(Some(raster)) => raster,
        Ok(None) => return TileOutcome::Empty,
        Err(e) => return TileOutcome::Failed(failure_of(&tile.id, e)),
    };

    match store.insert(tile.id.clone(), tile.ordinal, raster).await {
        Ok(()) => TileOutcome::Rasterized,
        Err(e) => TileOutcome::Failed(TileFailure::new(
            tile.id,
            FailureStage::Rasterization,
            e.to_string(),
        )),
    }
}

fn failure_of(tile: &TileId, err: QuickLookError) -> TileFailure {
    err.to_tile_failure().unwrap_or_else(|| {
        TileFailure::new(tile.clone(), FailureStage::Rasterization, err.to_string())
    })
}

fn log_outcome(report: &TileReport) {
    match &report.outcome {
        TileOutcome::Rasterized => info!(tile = %report.tile, "Tile rasterized"),
        TileOutcome::Empty => info!(tile = %report.tile, "Tile produced no data"),
        TileOutcome::Failed(f) => warn!(
            tile = %report.tile,
            stage = %f.stage,
            error = %f.message,
            "Tile failed"
        ),
    }
}
