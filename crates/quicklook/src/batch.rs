//! End-to-end batch: discover, resolve, rasterize, merge, write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use point_engine::{PointCloudEngine, Statistic};
use tracing::{info, instrument, warn};

use crate::catalog::TileCatalog;
use crate::config::QuickLookConfig;
use crate::error::{QuickLookError, Result};
use crate::executor::{ExecutionSummary, ParallelExecutor};
use crate::mosaic::MosaicAssembler;
use crate::progress::ProgressSink;
use crate::rasterizer::TileRasterizer;
use crate::report::{BatchOutcome, BatchReport, MosaicSummary};

/// `QUICK_LOOK_<stat>.tif`
pub fn mosaic_file_name(statistic: Statistic) -> String {
    format!("QUICK_LOOK_{}.tif", statistic)
}

/// `QUICK_LOOK_<stat>.json`
pub fn report_file_name(statistic: Statistic) -> String {
    format!("QUICK_LOOK_{}.json", statistic)
}

/// Mosaic target for `output`: used as-is when it names a `.tif`/`.tiff`
/// file, otherwise treated as a directory.
pub fn mosaic_path(output: &Path, statistic: Statistic) -> PathBuf {
    let is_tiff = output
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| e == "tif" || e == "tiff");
    if is_tiff {
        output.to_path_buf()
    } else {
        output.join(mosaic_file_name(statistic))
    }
}

/// Run one quick-look batch.
///
/// Per-tile failures are recorded in the report and never abort the batch.
/// Only an invalid configuration, an unreadable input directory, a mosaic
/// too large to assemble, and a failed mosaic write are returned as errors.
#[instrument(
    name = "batch",
    skip_all,
    fields(input = %input_dir.display(), statistic = %config.statistic, engine = engine.name())
)]
pub async fn run_batch(
    config: &QuickLookConfig,
    input_dir: &Path,
    output: &Path,
    engine: Arc<dyn PointCloudEngine>,
    progress: &dyn ProgressSink,
) -> Result<BatchReport> {
    config.validate().map_err(QuickLookError::InvalidConfig)?;
    let started_at = Utc::now();

    let catalog = TileCatalog::new(&config.tile_extensions);
    let discovered = catalog.discover(input_dir)?;

    let finish = |outcome: BatchOutcome,
                  summary: ExecutionSummary,
                  discovered: usize,
                  mosaic: Option<MosaicSummary>| {
        let finished_at = Utc::now();
        let failures = summary.failures().cloned().collect();
        BatchReport {
            outcome,
            statistic: config.statistic,
            engine: engine.name().to_string(),
            input_dir: input_dir.to_path_buf(),
            failure_policy: config.failure_policy,
            discovered,
            rasterized: summary.rasterized(),
            empty: summary.empty(),
            failed: summary.failed(),
            failures,
            tiles: summary.tiles,
            mosaic,
            started_at,
            finished_at,
            elapsed_ms: (finished_at - started_at).num_milliseconds(),
        }
    };

    if discovered.is_empty() {
        warn!(extensions = ?catalog.extensions(), "No input tiles found");
        return Ok(finish(
            BatchOutcome::NoInputTiles,
            ExecutionSummary::default(),
            0,
            None,
        ));
    }
    let discovered_count = discovered.len();

    let entries = catalog
        .resolve_all(discovered, engine.clone(), config.workers, progress)
        .await;

    let mut summary = ParallelExecutor::new(config.workers)
        .run(
            entries,
            &config.grid_request(),
            &TileRasterizer::new(engine.clone()),
            &config.classification_policy(),
            progress,
        )
        .await;

    let target = mosaic_path(output, config.statistic);
    let rasters = std::mem::take(&mut summary.rasters);
    let statistic = config.statistic;
    let compression = config.compression;
    let max_mosaic_cells = config.max_mosaic_cells;
    let write_target = target.clone();

    let written = tokio::task::spawn_blocking(move || -> Result<Option<MosaicSummary>> {
        let assembler = MosaicAssembler::new().with_max_cells(max_mosaic_cells);
        let mosaic = match assembler.assemble(&rasters, statistic) {
            Ok(mosaic) => mosaic,
            Err(QuickLookError::NoTilesGenerated) => return Ok(None),
            Err(e) => return Err(e),
        };
        drop(rasters);
        assembler.write(&mosaic, &write_target, compression)?;
        Ok(Some(MosaicSummary::new(&write_target, &mosaic)))
    })
    .await
    .map_err(|e| QuickLookError::mosaic_write(&target, e))??;

    let Some(mosaic) = written else {
        warn!(
            attempted = summary.attempted(),
            failed = summary.failed(),
            "No tiles generated, no mosaic written"
        );
        return Ok(finish(
            BatchOutcome::NoTilesGenerated,
            summary,
            discovered_count,
            None,
        ));
    };

    let report = finish(
        BatchOutcome::MosaicWritten,
        summary,
        discovered_count,
        Some(mosaic),
    );

    if config.write_report {
        let report_path = target.with_file_name(report_file_name(config.statistic));
        match report.write(&report_path) {
            Ok(()) => info!(path = %report_path.display(), "Wrote batch report"),
            Err(e) => warn!(error = %e, "Failed to write batch report"),
        }
    }

    info!(
        discovered = report.discovered,
        succeeded = report.succeeded(),
        failed = report.failed,
        elapsed_ms = report.elapsed_ms,
        "Batch complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(mosaic_file_name(Statistic::Mean), "QUICK_LOOK_mean.tif");
        assert_eq!(mosaic_file_name(Statistic::Count), "QUICK_LOOK_count.tif");
        assert_eq!(report_file_name(Statistic::Stdev), "QUICK_LOOK_stdev.json");
    }

    #[test]
    fn test_mosaic_path() {
        assert_eq!(
            mosaic_path(Path::new("/out"), Statistic::Mean),
            PathBuf::from("/out/QUICK_LOOK_mean.tif")
        );
        assert_eq!(
            mosaic_path(Path::new("/out/survey.TIF"), Statistic::Mean),
            PathBuf::from("/out/survey.TIF")
        );
    }
}
