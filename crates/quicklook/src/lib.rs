//! Quick-look raster pipeline for point-cloud surveys.
//!
//! Turns a directory of survey tiles into one mosaic of a per-cell statistic:
//!
//! 1. [`TileCatalog`] finds tiles and reads their headers
//! 2. [`ClassificationPolicy`] picks the point class for each tile's version
//! 3. [`ParallelExecutor`] runs a [`TileRasterizer`] per tile on a bounded pool,
//!    collecting rasters in a [`ResultStore`]
//! 4. [`MosaicAssembler`] merges the rasters and writes the GeoTIFF
//!
//! [`run_batch`] chains the steps and returns a [`BatchReport`].

pub mod batch;
pub mod catalog;
pub mod classification;
pub mod config;
pub mod error;
pub mod executor;
pub mod mosaic;
pub mod progress;
pub mod rasterizer;
pub mod report;
pub mod store;

pub use batch::{mosaic_file_name, mosaic_path, report_file_name, run_batch};
pub use catalog::{CatalogEntry, DiscoveredTile, Tile, TileCatalog, TileId, METADATA_PHASE};
pub use classification::{default_table, ClassificationPolicy};
pub use config::{load_config, parse_config, FailurePolicy, QuickLookConfig};
pub use error::{FailureStage, QuickLookError, Result, TileFailure};
pub use executor::{default_workers, ExecutionSummary, ParallelExecutor, TileOutcome, TileReport};
pub use mosaic::{MosaicAssembler, DEFAULT_MAX_MOSAIC_CELLS};
pub use progress::{
    rasterize_phase, ChannelProgress, ConsoleProgress, NoProgress, ProgressSink, ProgressUpdate,
    TracingProgress,
};
pub use rasterizer::{GridRequest, TileRasterizer};
pub use report::{BatchOutcome, BatchReport, MosaicSummary};
pub use store::ResultStore;
