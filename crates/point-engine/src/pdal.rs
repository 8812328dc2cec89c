//! Engine driving the PDAL command-line application.
//!
//! Every call runs its own `pdal` process, so concurrent calls never share
//! engine state. Rasters are written by `writers.gdal` into a scratch
//! directory and decoded back into memory; the directory is removed when the
//! call returns, on success and on failure.
//!
//! A dz job splits the points by `PointSourceId` with `filters.groupby`,
//! writes one mean grid per flightline over the tile's header bounds and
//! combines them in-process.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use raster_common::{BoundingBox, RasterBuffer, ELEVATION_NODATA};
use raster_io::{read_geotiff_path, GeoTiffWriter};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::engine::PointCloudEngine;
use crate::error::{EngineError, EngineResult};
use crate::grid::{flightline_spread, GridSpec};
use crate::job::{GridJob, OutputTarget, TileMetadata};

/// File name prefix of per-flightline grids in the scratch directory.
const LINE_PREFIX: &str = "line_";

/// Engine backed by the `pdal` executable.
#[derive(Debug, Clone)]
pub struct PdalEngine {
    program: PathBuf,
}

impl Default for PdalEngine {
    fn default() -> Self {
        Self::new("pdal")
    }
}

impl PdalEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run<I, S>(&self, args: I) -> EngineResult<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::Launch {
                program: self.program.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Run a pipeline file; `Ok(false)` when the engine found no points.
    async fn run_pipeline(&self, pipeline: &Value, scratch: &Path) -> EngineResult<bool> {
        let pipeline_path = scratch.join("pipeline.json");
        let body = serde_json::to_vec_pretty(pipeline)
            .map_err(|e| EngineError::InvalidJob(e.to_string()))?;
        tokio::fs::write(&pipeline_path, body).await?;

        let output = self
            .run([OsStr::new("pipeline"), pipeline_path.as_os_str()])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if reports_no_points(&stderr) {
                debug!("Engine reported no points after filtering");
                return Ok(false);
            }
            return Err(self.failure(&output));
        }
        Ok(true)
    }

    async fn rasterize_flightlines(
        &self,
        job: &GridJob,
        scratch: &Path,
    ) -> EngineResult<Option<RasterBuffer>> {
        let bounds = self
            .query_metadata(&job.input)
            .await?
            .bounds
            .ok_or_else(|| EngineError::invalid_metadata(&job.input, "header has no bounds"))?;
        let spec = GridSpec::covering(&bounds, job.resolution);
        let cells = spec.check_size(job.max_cells)?;

        let pattern = scratch.join(format!("{}#.tif", LINE_PREFIX));
        let pipeline = build_flightline_pipeline(job, &pattern, &bounds);
        if !self.run_pipeline(&pipeline, scratch).await? {
            return Ok(None);
        }

        let layer_paths = flightline_layers(scratch).await?;
        if cells
            .checked_mul(layer_paths.len())
            .map_or(true, |n| n > job.max_cells)
        {
            return Err(EngineError::GridTooLarge {
                width: spec.width,
                height: spec.height.saturating_mul(layer_paths.len()),
                max_cells: job.max_cells,
            });
        }
        debug!(lines = layer_paths.len(), "Combining flightline grids");

        let output = job.output.clone();
        tokio::task::spawn_blocking(move || -> EngineResult<Option<RasterBuffer>> {
            let layers = layer_paths
                .iter()
                .map(|p| read_geotiff_path(p))
                .collect::<Result<Vec<_>, _>>()?;
            let Some(spread) = flightline_spread(&layers)? else {
                return Ok(None);
            };
            if spread.valid_count() == 0 {
                return Ok(None);
            }
            if let OutputTarget::Path(out) = &output {
                GeoTiffWriter::new().write_to_path(&spread, out)?;
            }
            Ok(Some(spread))
        })
        .await?
    }

    fn failure(&self, output: &Output) -> EngineError {
        EngineError::ProcessFailed {
            program: self.program.display().to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

#[async_trait]
impl PointCloudEngine for PdalEngine {
    fn name(&self) -> &str {
        "pdal"
    }

    async fn query_metadata(&self, path: &Path) -> EngineResult<TileMetadata> {
        let output = self
            .run([OsStr::new("info"), OsStr::new("--metadata"), path.as_os_str()])
            .await?;
        if !output.status.success() {
            return Err(self.failure(&output));
        }
        parse_info(path, &String::from_utf8_lossy(&output.stdout))
    }

    #[instrument(skip(self, job), fields(tile = %job.input.display(), classes = %job.classes))]
    async fn rasterize(&self, job: &GridJob) -> EngineResult<Option<RasterBuffer>> {
        job.validate().map_err(EngineError::InvalidJob)?;

        let scratch = tempfile::Builder::new().prefix("quicklook-pdal-").tempdir()?;
        if job.statistic.is_per_flightline() {
            return self.rasterize_flightlines(job, scratch.path()).await;
        }

        let raster_path = match &job.output {
            OutputTarget::Memory => scratch.path().join("tile.tif"),
            OutputTarget::Path(p) => p.clone(),
        };
        let pipeline = build_pipeline(job, &raster_path);
        if !self.run_pipeline(&pipeline, scratch.path()).await? {
            return Ok(None);
        }

        if !tokio::fs::try_exists(&raster_path).await.unwrap_or(false) {
            debug!("Engine wrote no raster");
            return Ok(None);
        }

        let read_path = raster_path.clone();
        let raster = tokio::task::spawn_blocking(move || read_geotiff_path(&read_path)).await??;
        drop(scratch);
        Ok(Some(raster))
    }
}

/// Per-flightline grids written into `scratch`, in name order.
async fn flightline_layers(scratch: &Path) -> EngineResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(scratch).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(LINE_PREFIX) && name.ends_with(".tif") {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Reader and point filters shared by every pipeline.
fn filter_stages(job: &GridJob) -> Vec<Value> {
    let limits: Vec<String> = job
        .classes
        .codes()
        .map(|c| format!("Classification[{0}:{0}]", c))
        .collect();
    let mut stages = vec![
        json!({
            "type": "readers.las",
            "filename": job.input.display().to_string(),
        }),
        json!({
            "type": "filters.range",
            "limits": limits.join(","),
        }),
    ];

    if !job.returns.is_empty() {
        let groups: Vec<&str> = job.returns.iter().map(|g| g.as_str()).collect();
        stages.push(json!({
            "type": "filters.returns",
            "groups": groups.join(","),
        }));
    }
    stages
}

/// Pipeline reading one tile, keeping its classes, and gridding one statistic.
pub fn build_pipeline(job: &GridJob, raster_path: &Path) -> Value {
    let mut stages = filter_stages(job);
    stages.push(json!({
        "type": "writers.gdal",
        "filename": raster_path.display().to_string(),
        "gdaldriver": "GTiff",
        "output_type": job.statistic.as_str(),
        "dimension": job.dimension.as_str(),
        "resolution": job.resolution,
        "data_type": "float64",
        "nodata": ELEVATION_NODATA,
    }));

    json!({ "pipeline": stages })
}

/// Pipeline writing one mean grid per `PointSourceId` over `bounds`.
///
/// `pattern` must contain `#`, which the writer replaces with a running
/// number per flightline.
pub fn build_flightline_pipeline(job: &GridJob, pattern: &Path, bounds: &BoundingBox) -> Value {
    let mut stages = filter_stages(job);
    stages.push(json!({
        "type": "filters.groupby",
        "dimension": "PointSourceId",
    }));
    stages.push(json!({
        "type": "writers.gdal",
        "filename": pattern.display().to_string(),
        "gdaldriver": "GTiff",
        "output_type": "mean",
        "dimension": job.dimension.as_str(),
        "resolution": job.resolution,
        "bounds": format!(
            "([{}, {}], [{}, {}])",
            bounds.min_x, bounds.max_x, bounds.min_y, bounds.max_y
        ),
        "data_type": "float64",
        "nodata": ELEVATION_NODATA,
    }));

    json!({ "pipeline": stages })
}

/// Interpret `pdal info --metadata` output.
pub fn parse_info(path: &Path, text: &str) -> EngineResult<TileMetadata> {
    let root: Value = serde_json::from_str(text)
        .map_err(|e| EngineError::invalid_metadata(path, e.to_string()))?;
    let meta = root.get("metadata").unwrap_or(&root);

    let major = meta.get("major_version").and_then(Value::as_u64);
    let minor = meta.get("minor_version").and_then(Value::as_u64);
    let version = match (major, minor) {
        (Some(major), Some(minor)) => format!("{}.{}", major, minor),
        _ => {
            return Err(EngineError::invalid_metadata(
                path,
                "missing major_version/minor_version",
            ))
        }
    };

    let srs = [
        meta.pointer("/srs/horizontal"),
        meta.pointer("/srs/wkt"),
        meta.get("comp_spatialreference"),
        meta.get("spatialreference"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::trim)
    .find(|s| !s.is_empty())
    .map(str::to_string);

    let bound = |key: &str| meta.get(key).and_then(Value::as_f64);
    let bounds = match (bound("minx"), bound("miny"), bound("maxx"), bound("maxy")) {
        (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
            Some(BoundingBox::new(min_x, min_y, max_x, max_y))
        }
        _ => None,
    };

    Ok(TileMetadata {
        version,
        srs,
        point_count: meta.get("count").and_then(Value::as_u64).unwrap_or(0),
        bounds,
    })
}

fn reports_no_points(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no points")
}
