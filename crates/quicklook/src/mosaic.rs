//! Merging per-tile rasters into one output surface.

use std::path::Path;

use point_engine::Statistic;
use raster_common::{
    avoid_sentinel, is_nodata, BoundingBox, GeoTransform, PixelType, RasterBuffer, RasterProfile,
    SpatialRef, COUNT_NODATA, ELEVATION_NODATA,
};
use raster_io::{GeoTiffWriter, RasterCompression};
use tracing::{debug, info, instrument, warn};

use crate::error::{QuickLookError, Result};

/// Default cap on mosaic cells: 10000 x 10000.
pub const DEFAULT_MAX_MOSAIC_CELLS: usize = 100_000_000;

/// Builds the mosaic from the frozen result list.
///
/// The output grid uses the first raster's resolution and covers the union of
/// all input extents. Each output cell takes its value from the first raster,
/// in list order, that holds data at the cell centre.
#[derive(Debug, Clone, Copy)]
pub struct MosaicAssembler {
    max_cells: usize,
}

impl Default for MosaicAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl MosaicAssembler {
    pub fn new() -> Self {
        Self {
            max_cells: DEFAULT_MAX_MOSAIC_CELLS,
        }
    }

    /// Refuse output grids of more than `max_cells` cells.
    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    /// Merge `rasters` and normalise nodata and pixel type for `statistic`.
    ///
    /// Elevation-like statistics produce `Float32` with the `-9999` sentinel.
    /// Counts produce `UInt32` with uncovered and engine-nodata cells set to 0.
    ///
    /// Fails with `NoTilesGenerated` when `rasters` is empty, and with
    /// `MosaicAssembly` when the union grid exceeds the cell cap or cannot
    /// be allocated.
    #[instrument(skip_all, fields(rasters = rasters.len(), statistic = %statistic))]
    pub fn assemble(&self, rasters: &[RasterBuffer], statistic: Statistic) -> Result<RasterBuffer> {
        let first = rasters.first().ok_or(QuickLookError::NoTilesGenerated)?;

        let (res_x, res_y) = first.profile.transform.resolution();
        if !(res_x.is_finite() && res_y.is_finite() && res_x > 0.0 && res_y > 0.0) {
            return Err(QuickLookError::MosaicAssembly(format!(
                "invalid resolution {} x {}",
                res_x, res_y
            )));
        }

        let extents: Vec<BoundingBox> = rasters.iter().map(RasterBuffer::bounds).collect();
        let extent = BoundingBox::union_all(&extents).ok_or(QuickLookError::NoTilesGenerated)?;
        let width = ((extent.width() / res_x).round() as usize).max(1);
        let height = ((extent.height() / res_y).round() as usize).max(1);
        let transform = GeoTransform::from_origin(extent.min_x, extent.max_y, res_x, res_y);

        let cells = width
            .checked_mul(height)
            .filter(|n| *n <= self.max_cells)
            .ok_or_else(|| {
                QuickLookError::MosaicAssembly(format!(
                    "{}x{} cell mosaic exceeds the limit of {} cells",
                    width, height, self.max_cells
                ))
            })?;
        let mut merged: Vec<Option<f64>> = Vec::new();
        merged.try_reserve_exact(cells).map_err(|e| {
            QuickLookError::MosaicAssembly(format!("{}x{} cell mosaic: {}", width, height, e))
        })?;
        merged.resize(cells, None);
        for (raster, bounds) in rasters.iter().zip(&extents) {
            paint_first_wins(&mut merged, width, height, &transform, raster, bounds);
        }

        let crs = common_crs(rasters);
        let (pixel_type, nodata) = if statistic.is_count() {
            (PixelType::UInt32, COUNT_NODATA)
        } else {
            (PixelType::Float32, ELEVATION_NODATA)
        };

        let data: Vec<f64> = merged
            .into_iter()
            .map(|cell| match cell {
                None => nodata,
                Some(v) if statistic.is_count() => pixel_type.coerce(v),
                Some(v) => avoid_sentinel(v as f32 as f64, nodata),
            })
            .collect();

        let profile =
            RasterProfile::new(width, height, transform, pixel_type, Some(nodata)).with_crs(crs);
        let mosaic = RasterBuffer::new(profile, data)
            .map_err(|e| QuickLookError::MosaicAssembly(e.to_string()))?;

        info!(
            width,
            height,
            valid = mosaic.valid_count(),
            min_x = extent.min_x,
            max_y = extent.max_y,
            "Assembled mosaic"
        );
        Ok(mosaic)
    }

    /// Encode `mosaic` as a GeoTIFF at `path`.
    ///
    /// Missing parent directories are created. Any failure is reported as
    /// `MosaicWriteFailed` with the target path.
    pub fn write(
        &self,
        mosaic: &RasterBuffer,
        path: &Path,
        compression: RasterCompression,
    ) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| QuickLookError::mosaic_write(path, e))?;
        }
        GeoTiffWriter::new()
            .with_compression(compression)
            .write_to_path(mosaic, path)
            .map_err(|e| QuickLookError::mosaic_write(path, e))?;
        info!(path = %path.display(), compression = %compression, "Wrote mosaic");
        Ok(())
    }
}

/// Fill still-empty cells of `merged` from `raster` by nearest-cell sampling
/// at each output cell centre.
fn paint_first_wins(
    merged: &mut [Option<f64>],
    width: usize,
    height: usize,
    transform: &GeoTransform,
    raster: &RasterBuffer,
    bounds: &BoundingBox,
) {
    let Some(band) = raster.band(0) else {
        return;
    };
    let src = &raster.profile.transform;
    let (src_w, src_h) = (raster.width(), raster.height());
    let nodata = raster.nodata();

    // Output window touching the source extent.
    let (c0, r0) = transform.world_to_pixel(bounds.min_x, bounds.max_y);
    let (c1, r1) = transform.world_to_pixel(bounds.max_x, bounds.min_y);
    let col_start = c0.floor().max(0.0) as usize;
    let row_start = r0.floor().max(0.0) as usize;
    let col_end = (c1.ceil().max(0.0) as usize).min(width);
    let row_end = (r1.ceil().max(0.0) as usize).min(height);

    let mut painted = 0usize;
    for row in row_start..row_end {
        for col in col_start..col_end {
            let idx = row * width + col;
            if merged[idx].is_some() {
                continue;
            }
            let (x, y) = transform.pixel_center(col, row);
            let (sc, sr) = src.world_to_pixel(x, y);
            if sc < 0.0 || sr < 0.0 {
                continue;
            }
            let (sc, sr) = (sc.floor() as usize, sr.floor() as usize);
            if sc >= src_w || sr >= src_h {
                continue;
            }
            let value = band[sr * src_w + sc];
            if is_nodata(value, nodata) {
                continue;
            }
            merged[idx] = Some(value);
            painted += 1;
        }
    }
    debug!(painted, "Merged raster");
}

/// First declared CRS; later rasters that disagree are logged.
fn common_crs(rasters: &[RasterBuffer]) -> Option<SpatialRef> {
    let mut crs: Option<&SpatialRef> = None;
    for raster in rasters {
        let Some(other) = raster.profile.crs.as_ref() else {
            continue;
        };
        match crs {
            None => crs = Some(other),
            Some(first) if !first.is_equivalent(other) => warn!(
                expected = %first.short_name(),
                found = %other.short_name(),
                "Rasters declare different spatial references; keeping the first"
            ),
            Some(_) => {}
        }
    }
    crs.cloned()
}
