//! Binning of points into a regular grid.

use raster_common::{
    avoid_sentinel, is_nodata, BoundingBox, GeoTransform, PixelType, RasterBuffer, RasterProfile,
    ELEVATION_NODATA,
};

use crate::error::{EngineError, EngineResult};
use crate::job::Statistic;

/// Grid geometry anchored at the lower-left corner of the point extent.
///
/// The grid always has at least one cell per axis; a point lying exactly on
/// the maximum edge falls into the last cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub min_x: f64,
    pub min_y: f64,
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
}

impl GridSpec {
    pub fn covering(bounds: &BoundingBox, resolution: f64) -> Self {
        let cells = |extent: f64| ((extent / resolution).floor() as usize).saturating_add(1);
        let width = cells(bounds.width());
        let height = cells(bounds.height());
        Self {
            min_x: bounds.min_x,
            min_y: bounds.min_y,
            width,
            height,
            resolution,
        }
    }

    /// `width * height`, or `None` when it overflows.
    pub fn cell_count(&self) -> Option<usize> {
        self.width.checked_mul(self.height)
    }

    /// Fails with [`EngineError::GridTooLarge`] when the grid exceeds `max_cells`.
    pub fn check_size(&self, max_cells: usize) -> EngineResult<usize> {
        match self.cell_count() {
            Some(n) if n <= max_cells => Ok(n),
            _ => Err(EngineError::GridTooLarge {
                width: self.width,
                height: self.height,
                max_cells,
            }),
        }
    }

    /// Row-major index (row 0 at the top) of the cell holding `(x, y)`.
    pub fn cell_index(&self, x: f64, y: f64) -> Option<usize> {
        let col = ((x - self.min_x) / self.resolution).floor();
        let row_up = ((y - self.min_y) / self.resolution).floor();
        if col < 0.0 || row_up < 0.0 {
            return None;
        }
        let (col, row_up) = (col as usize, row_up as usize);
        if col >= self.width || row_up >= self.height {
            return None;
        }
        let row = self.height - 1 - row_up;
        Some(row * self.width + col)
    }

    pub fn transform(&self) -> GeoTransform {
        let top = self.min_y + self.height as f64 * self.resolution;
        GeoTransform::from_origin(self.min_x, top, self.resolution, self.resolution)
    }
}

/// Running statistics of one cell (Welford).
#[derive(Debug, Clone, Copy)]
struct CellStats {
    count: u32,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for CellStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl CellStats {
    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn value(&self, statistic: Statistic) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let v = match statistic {
            Statistic::Mean => self.mean,
            Statistic::Count => self.count as f64,
            Statistic::Min => self.min,
            Statistic::Max => self.max,
            Statistic::Stdev => (self.m2 / self.count as f64).sqrt(),
            // One flightline's layer of a dz grid
            Statistic::Dz => self.mean,
        };
        Some(v)
    }
}

/// Accumulates point values into a [`GridSpec`].
#[derive(Debug, Clone)]
pub struct GridAccumulator {
    spec: GridSpec,
    cells: Vec<CellStats>,
    points: u64,
}

impl GridAccumulator {
    /// Allocate the cells of `spec`, refusing grids over `max_cells` and
    /// reporting an allocation failure as an error.
    pub fn try_new(spec: GridSpec, max_cells: usize) -> EngineResult<Self> {
        let n = spec.check_size(max_cells)?;
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(n)
            .map_err(|_| EngineError::GridTooLarge {
                width: spec.width,
                height: spec.height,
                max_cells,
            })?;
        cells.resize(n, CellStats::default());
        Ok(Self {
            spec,
            cells,
            points: 0,
        })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    /// Points accepted so far.
    pub fn points(&self) -> u64 {
        self.points
    }

    /// Add one sample; points outside the grid are ignored.
    pub fn add(&mut self, x: f64, y: f64, value: f64) {
        if let Some(idx) = self.spec.cell_index(x, y) {
            self.cells[idx].push(value);
            self.points += 1;
        }
    }

    /// Finish into a `Float64` raster with [`ELEVATION_NODATA`] in empty cells.
    ///
    /// Real values equal to the sentinel are nudged off it.
    pub fn finish(self, statistic: Statistic) -> EngineResult<RasterBuffer> {
        let data = self
            .cells
            .iter()
            .map(|c| match c.value(statistic) {
                Some(v) => avoid_sentinel(v, ELEVATION_NODATA),
                None => ELEVATION_NODATA,
            })
            .collect();
        let profile = RasterProfile::new(
            self.spec.width,
            self.spec.height,
            self.spec.transform(),
            PixelType::Float64,
            Some(ELEVATION_NODATA),
        );
        Ok(RasterBuffer::new(profile, data)?)
    }
}

/// Combine per-flightline mean grids into a dz grid.
///
/// Each cell becomes the highest minus the lowest value any layer holds
/// there. Cells with no spread (one layer only, or identical means) are
/// nodata. Layers must share one grid. Returns `None` for no layers.
pub fn flightline_spread(layers: &[RasterBuffer]) -> EngineResult<Option<RasterBuffer>> {
    let Some(first) = layers.first() else {
        return Ok(None);
    };
    let mut profile = first.profile.clone();
    for layer in &layers[1..] {
        let p = &layer.profile;
        if p.width != profile.width || p.height != profile.height || p.transform != profile.transform
        {
            return Err(EngineError::MisalignedLayers(format!(
                "{}x{} grid does not match {}x{}",
                p.width, p.height, profile.width, profile.height
            )));
        }
    }

    let n = profile.width * profile.height;
    let mut low = vec![f64::INFINITY; n];
    let mut high = vec![f64::NEG_INFINITY; n];
    for layer in layers {
        let nodata = layer.nodata();
        for (i, v) in layer.data()[..n].iter().enumerate() {
            if is_nodata(*v, nodata) {
                continue;
            }
            low[i] = low[i].min(*v);
            high[i] = high[i].max(*v);
        }
    }

    let data = low
        .iter()
        .zip(&high)
        .map(|(lo, hi)| {
            let dz = hi - lo;
            if dz.is_finite() && dz != 0.0 {
                avoid_sentinel(dz, ELEVATION_NODATA)
            } else {
                ELEVATION_NODATA
            }
        })
        .collect();

    profile.pixel_type = PixelType::Float64;
    profile.nodata = Some(ELEVATION_NODATA);
    profile.band_count = 1;
    Ok(Some(RasterBuffer::new(profile, data)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_covering() {
        let spec = GridSpec::covering(&BoundingBox::new(0.0, 0.0, 2.5, 1.0), 1.0);
        assert_eq!((spec.width, spec.height), (3, 2));
        assert_eq!(spec.transform().origin_y, 2.0);
        // Top-left cell holds the highest y
        assert_eq!(spec.cell_index(0.1, 1.0), Some(0));
        assert_eq!(spec.cell_index(0.1, 0.1), Some(3));
        assert_eq!(spec.cell_index(2.5, 0.0), Some(5));
        assert_eq!(spec.cell_index(-0.1, 0.0), None);
    }

    #[test]
    fn test_statistics() {
        let spec = GridSpec::covering(&BoundingBox::new(0.0, 0.0, 1.5, 0.5), 1.0);
        let mut acc = GridAccumulator::try_new(spec, 100).unwrap();
        for z in [1.0, 2.0, 3.0, 6.0] {
            acc.add(0.25, 0.25, z);
        }
        assert_eq!(acc.points(), 4);

        let mean = acc.clone().finish(Statistic::Mean).unwrap();
        assert_eq!(mean.data(), &[3.0, ELEVATION_NODATA]);

        let count = acc.clone().finish(Statistic::Count).unwrap();
        assert_eq!(count.data(), &[4.0, ELEVATION_NODATA]);

        let min = acc.clone().finish(Statistic::Min).unwrap();
        let max = acc.clone().finish(Statistic::Max).unwrap();
        assert_eq!((min.data()[0], max.data()[0]), (1.0, 6.0));

        let stdev = acc.finish(Statistic::Stdev).unwrap();
        assert!((stdev.data()[0] - 3.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_real_value_never_equals_sentinel() {
        let spec = GridSpec::covering(&BoundingBox::new(0.0, 0.0, 0.5, 0.5), 1.0);
        let mut acc = GridAccumulator::try_new(spec, 100).unwrap();
        acc.add(0.1, 0.1, ELEVATION_NODATA);
        let raster = acc.finish(Statistic::Mean).unwrap();
        assert_ne!(raster.data()[0], ELEVATION_NODATA);
        assert_eq!(raster.valid_count(), 1);
    }

    #[test]
    fn test_oversized_grid_is_refused() {
        // One stray point two thousand kilometres away
        let bounds = BoundingBox::new(0.0, 0.0, 2.0e6, 2.0e6);
        let spec = GridSpec::covering(&bounds, 1.0);
        assert!(matches!(
            GridAccumulator::try_new(spec, 16_000_000),
            Err(EngineError::GridTooLarge { width: 2_000_001, .. })
        ));

        let absurd = GridSpec::covering(&BoundingBox::new(0.0, 0.0, 1.0e300, 1.0e300), 1.0);
        assert_eq!(absurd.cell_count(), None);
        assert!(absurd.check_size(usize::MAX).is_err());

        let fits = GridSpec::covering(&BoundingBox::new(0.0, 0.0, 9.5, 9.5), 1.0);
        assert_eq!(fits.check_size(100).unwrap(), 100);
        assert!(fits.check_size(99).is_err());
    }

    #[test]
    fn test_flightline_spread() {
        let spec = GridSpec::covering(&BoundingBox::new(0.0, 0.0, 2.5, 0.5), 1.0);
        let layer = |values: &[(f64, f64)]| {
            let mut acc = GridAccumulator::try_new(spec, 100).unwrap();
            for (x, z) in values {
                acc.add(*x, 0.2, *z);
            }
            acc.finish(Statistic::Dz).unwrap()
        };
        // Cell 0 seen by both lines, cell 1 by one line, cell 2 equal in both
        let a = layer(&[(0.5, 1.0), (0.5, 3.0), (1.5, 7.0), (2.5, 4.0)]);
        let b = layer(&[(0.5, 10.0), (2.5, 4.0)]);

        let dz = flightline_spread(&[a.clone(), b]).unwrap().unwrap();
        assert_eq!(dz.data(), &[8.0, ELEVATION_NODATA, ELEVATION_NODATA]);
        assert_eq!(dz.nodata(), Some(ELEVATION_NODATA));

        assert!(flightline_spread(&[]).unwrap().is_none());

        let other = GridSpec::covering(&BoundingBox::new(0.0, 0.0, 0.5, 0.5), 1.0);
        let small = GridAccumulator::try_new(other, 100).unwrap().finish(Statistic::Dz).unwrap();
        assert!(matches!(
            flightline_spread(&[a, small]),
            Err(EngineError::MisalignedLayers(_))
        ));
    }
}
