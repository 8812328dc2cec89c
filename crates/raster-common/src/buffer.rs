//! In-memory raster with its profile.

use crate::{is_nodata, BoundingBox, RasterError, RasterProfile, RasterResult};

/// A raster held in memory.
///
/// Samples are stored band-sequential, row-major, as `f64` regardless of the
/// on-disk [`PixelType`](crate::PixelType); codecs convert on the way in and out.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    pub profile: RasterProfile,
    data: Vec<f64>,
}

impl RasterBuffer {
    /// Wrap existing samples, checking the length against the profile.
    pub fn new(profile: RasterProfile, data: Vec<f64>) -> RasterResult<Self> {
        profile.validate()?;
        let expected = profile.sample_count();
        if data.len() != expected {
            return Err(RasterError::DimensionMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { profile, data })
    }

    /// Raster with every sample set to `value`.
    pub fn filled(profile: RasterProfile, value: f64) -> RasterResult<Self> {
        let len = profile.sample_count();
        Self::new(profile, vec![value; len])
    }

    /// Raster initialised to the profile's nodata value (or NaN when unset).
    pub fn empty(profile: RasterProfile) -> RasterResult<Self> {
        let fill = profile.nodata.unwrap_or(f64::NAN);
        Self::filled(profile, fill)
    }

    pub fn width(&self) -> usize {
        self.profile.width
    }

    pub fn height(&self) -> usize {
        self.profile.height
    }

    pub fn nodata(&self) -> Option<f64> {
        self.profile.nodata
    }

    pub fn bounds(&self) -> BoundingBox {
        self.profile.bounds()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    fn index(&self, band: usize, row: usize, col: usize) -> RasterResult<usize> {
        if band >= self.profile.band_count || row >= self.profile.height || col >= self.profile.width
        {
            return Err(RasterError::OutOfBounds { band, row, col });
        }
        Ok(band * self.profile.band_len() + row * self.profile.width + col)
    }

    pub fn get(&self, band: usize, row: usize, col: usize) -> RasterResult<f64> {
        let idx = self.index(band, row, col)?;
        Ok(self.data[idx])
    }

    pub fn set(&mut self, band: usize, row: usize, col: usize, value: f64) -> RasterResult<()> {
        let idx = self.index(band, row, col)?;
        self.data[idx] = value;
        Ok(())
    }

    /// Samples of one band.
    pub fn band(&self, band: usize) -> Option<&[f64]> {
        if band >= self.profile.band_count {
            return None;
        }
        let len = self.profile.band_len();
        Some(&self.data[band * len..(band + 1) * len])
    }

    /// Number of samples in band 0 that hold data.
    pub fn valid_count(&self) -> usize {
        let nodata = self.profile.nodata;
        self.band(0)
            .map(|b| b.iter().filter(|v| !is_nodata(**v, nodata)).count())
            .unwrap_or(0)
    }

    /// True when no sample in band 0 holds data.
    pub fn is_empty(&self) -> bool {
        self.valid_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeoTransform, PixelType};

    fn profile() -> RasterProfile {
        RasterProfile::new(
            3,
            2,
            GeoTransform::from_origin(0.0, 2.0, 1.0, 1.0),
            PixelType::Float32,
            Some(-9999.0),
        )
    }

    #[test]
    fn test_length_checked() {
        assert!(matches!(
            RasterBuffer::new(profile(), vec![0.0; 5]),
            Err(RasterError::DimensionMismatch { expected: 6, actual: 5 })
        ));
        assert!(RasterBuffer::new(profile(), vec![0.0; 6]).is_ok());
    }

    #[test]
    fn test_get_set_and_valid_count() {
        let mut raster = RasterBuffer::empty(profile()).unwrap();
        assert!(raster.is_empty());

        raster.set(0, 1, 2, 4.5).unwrap();
        assert_eq!(raster.get(0, 1, 2).unwrap(), 4.5);
        assert_eq!(raster.data()[5], 4.5);
        assert_eq!(raster.valid_count(), 1);
        assert!(!raster.is_empty());

        assert!(raster.set(0, 2, 0, 1.0).is_err());
        assert!(raster.get(1, 0, 0).is_err());
    }

    #[test]
    fn test_band_slices() {
        let mut p = profile();
        p.band_count = 2;
        let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let raster = RasterBuffer::new(p, data).unwrap();
        assert_eq!(raster.band(1).unwrap()[0], 6.0);
        assert!(raster.band(2).is_none());
    }
}
