//! In-process engine built on the `las` crate.
//!
//! Reads LAS and LAZ tiles directly and bins the filtered points with
//! [`GridAccumulator`]. Decoding is CPU-bound, so every call runs on the
//! blocking thread pool.
//!
//! Besides `Z` and `Intensity`, any attribute declared in the tile's
//! extra-bytes records can be gridded by name.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use las::{Header, Point, Reader, Vlr};
use raster_common::{BoundingBox, RasterBuffer, SpatialRef};
use raster_io::GeoTiffWriter;
use tracing::{debug, instrument};

use crate::engine::PointCloudEngine;
use crate::error::{EngineError, EngineResult};
use crate::extra_bytes::{extra_bytes_fields, ExtraBytesField};
use crate::grid::{flightline_spread, GridAccumulator, GridSpec};
use crate::job::{Dimension, GridJob, OutputTarget, Statistic, TileMetadata};

const PROJECTION_USER_ID: &str = "LASF_Projection";
const WKT_RECORD_ID: u16 = 2112;
const GEOKEY_RECORD_ID: u16 = 34735;

/// Engine decoding tiles in-process.
#[derive(Debug, Clone, Default)]
pub struct NativeLasEngine;

impl NativeLasEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PointCloudEngine for NativeLasEngine {
    fn name(&self) -> &str {
        "native"
    }

    async fn query_metadata(&self, path: &Path) -> EngineResult<TileMetadata> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> EngineResult<TileMetadata> {
            let reader = Reader::from_path(&path).map_err(|e| EngineError::read(&path, e))?;
            Ok(header_metadata(reader.header()))
        })
        .await?
    }

    #[instrument(skip(self, job), fields(tile = %job.input.display(), classes = %job.classes))]
    async fn rasterize(&self, job: &GridJob) -> EngineResult<Option<RasterBuffer>> {
        job.validate().map_err(EngineError::InvalidJob)?;

        let job = job.clone();
        tokio::task::spawn_blocking(move || rasterize_blocking(&job)).await?
    }
}

fn header_metadata(header: &Header) -> TileMetadata {
    let version = header.version();
    let bounds = header.bounds();
    TileMetadata {
        version: format!("{}.{}", version.major, version.minor),
        srs: header_srs(header),
        point_count: header.number_of_points(),
        bounds: Some(BoundingBox::new(
            bounds.min.x,
            bounds.min.y,
            bounds.max.x,
            bounds.max.y,
        )),
    }
}

/// Spatial reference declared by the projection records of a header.
///
/// OGC WKT is preferred; a GeoKey directory with an EPSG code is the fallback.
fn header_srs(header: &Header) -> Option<String> {
    let records: Vec<&Vlr> = header
        .vlrs()
        .iter()
        .chain(header.evlrs().iter())
        .filter(|v| v.user_id.trim_end_matches('\0') == PROJECTION_USER_ID)
        .collect();

    let wkt = records
        .iter()
        .find(|v| v.record_id == WKT_RECORD_ID)
        .map(|v| String::from_utf8_lossy(&v.data).trim_end_matches('\0').trim().to_string())
        .filter(|s| !s.is_empty());
    if wkt.is_some() {
        return wkt;
    }

    records
        .iter()
        .find(|v| v.record_id == GEOKEY_RECORD_ID)
        .and_then(|v| geokey_epsg(&v.data))
        .map(|code| format!("EPSG:{}", code))
}

/// EPSG code from a little-endian GeoKey directory record.
fn geokey_epsg(data: &[u8]) -> Option<u32> {
    let keys: Vec<u16> = data
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        match (entry[0], entry[1], entry[3]) {
            (3072, 0, code) if code != 32767 => return Some(code as u32),
            (2048, 0, code) if code != 32767 => geographic = Some(code as u32),
            _ => {}
        }
    }
    geographic
}

/// Where a point's gridded value comes from.
#[derive(Debug, Clone)]
enum ValueSource {
    Z,
    Intensity,
    Extra(ExtraBytesField),
}

impl ValueSource {
    /// Resolve `dimension` against the tile header. Names match
    /// case-insensitively.
    fn resolve(header: &Header, dimension: &Dimension) -> EngineResult<Self> {
        let name = dimension.as_str();
        if name.eq_ignore_ascii_case("z") {
            return Ok(Self::Z);
        }
        if name.eq_ignore_ascii_case("intensity") {
            return Ok(Self::Intensity);
        }
        extra_bytes_fields(header.vlrs().iter().chain(header.evlrs().iter()))
            .into_iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(Self::Extra)
            .ok_or_else(|| EngineError::UnsupportedDimension(name.to_string()))
    }

    fn value(&self, point: &Point) -> Option<f64> {
        match self {
            Self::Z => Some(point.z),
            Self::Intensity => Some(point.intensity as f64),
            Self::Extra(field) => field.value(&point.extra_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    x: f64,
    y: f64,
    value: f64,
    line: u16,
}

fn rasterize_blocking(job: &GridJob) -> EngineResult<Option<RasterBuffer>> {
    let path = job.input.as_path();
    let mut reader = Reader::from_path(path).map_err(|e| EngineError::read(path, e))?;
    let srs = header_srs(reader.header());
    let source = ValueSource::resolve(reader.header(), &job.dimension)?;

    let mut samples: Vec<Sample> = Vec::new();
    let mut bounds: Option<BoundingBox> = None;
    let mut total: u64 = 0;

    for point in reader.points() {
        let point = point.map_err(|e| EngineError::read(path, e))?;
        total += 1;
        if !job.classes.contains(u8::from(point.classification)) {
            continue;
        }
        if !job.keeps_return(point.return_number, point.number_of_returns) {
            continue;
        }
        let Some(value) = source.value(&point) else {
            continue;
        };

        let here = BoundingBox::new(point.x, point.y, point.x, point.y);
        bounds = Some(match bounds {
            Some(b) => b.union(&here),
            None => here,
        });
        samples.push(Sample {
            x: point.x,
            y: point.y,
            value,
            line: point.point_source_id,
        });
    }

    let Some(bounds) = bounds else {
        debug!(points = total, "No points matched the filters");
        return Ok(None);
    };
    let spec = GridSpec::covering(&bounds, job.resolution);

    let mut raster = if job.statistic.is_per_flightline() {
        match grid_flightlines(spec, &samples, job.max_cells)? {
            Some(raster) if raster.valid_count() > 0 => raster,
            _ => {
                debug!(points = total, "No cell is covered by two flightlines");
                return Ok(None);
            }
        }
    } else {
        let mut grid = GridAccumulator::try_new(spec, job.max_cells)?;
        for s in &samples {
            grid.add(s.x, s.y, s.value);
        }
        debug!(
            points = total,
            kept = grid.points(),
            width = spec.width,
            height = spec.height,
            "Gridded tile"
        );
        grid.finish(job.statistic)?
    };
    raster.profile.crs = srs.and_then(|s| SpatialRef::parse(&s).ok());

    if let OutputTarget::Path(out) = &job.output {
        GeoTiffWriter::new().write_to_path(&raster, out)?;
    }

    Ok(Some(raster))
}

/// Mean grid of every flightline over one shared grid, combined into dz.
fn grid_flightlines(
    spec: GridSpec,
    samples: &[Sample],
    max_cells: usize,
) -> EngineResult<Option<RasterBuffer>> {
    let lines: BTreeSet<u16> = samples.iter().map(|s| s.line).collect();
    let cells = spec.check_size(max_cells)?;
    // Every flightline holds a full layer
    if cells.checked_mul(lines.len()).map_or(true, |n| n > max_cells) {
        return Err(EngineError::GridTooLarge {
            width: spec.width,
            height: spec.height.saturating_mul(lines.len()),
            max_cells,
        });
    }

    let mut layers = BTreeMap::new();
    for line in &lines {
        layers.insert(*line, GridAccumulator::try_new(spec, max_cells)?);
    }
    for s in samples {
        if let Some(grid) = layers.get_mut(&s.line) {
            grid.add(s.x, s.y, s.value);
        }
    }
    debug!(
        lines = lines.len(),
        width = spec.width,
        height = spec.height,
        "Gridded flightlines"
    );

    let layers = layers
        .into_values()
        .map(|grid| grid.finish(Statistic::Dz))
        .collect::<EngineResult<Vec<_>>>()?;
    flightline_spread(&layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geokey_epsg() {
        let keys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 26918];
        let data: Vec<u8> = keys.iter().flat_map(|k| k.to_le_bytes()).collect();
        assert_eq!(geokey_epsg(&data), Some(26918));

        let user_defined: [u16; 8] = [1, 1, 0, 1, 3072, 0, 1, 32767];
        let data: Vec<u8> = user_defined.iter().flat_map(|k| k.to_le_bytes()).collect();
        assert_eq!(geokey_epsg(&data), None);
        assert_eq!(geokey_epsg(&[]), None);
    }
}
