//! Raster profile: the geospatial metadata that travels with every buffer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BoundingBox, GeoTransform, RasterError, RasterResult, SpatialRef};

/// Storage type of a raster's samples on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    UInt8,
    UInt16,
    UInt32,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl PixelType {
    /// Size of one sample in bits.
    pub fn bits(&self) -> u16 {
        match self {
            PixelType::UInt8 => 8,
            PixelType::UInt16 | PixelType::Int16 => 16,
            PixelType::UInt32 | PixelType::Int32 | PixelType::Float32 => 32,
            PixelType::Float64 => 64,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PixelType::Float32 | PixelType::Float64)
    }

    /// Inclusive range of finite values the type stores exactly (integers)
    /// or without overflow (floats).
    pub fn range(&self) -> (f64, f64) {
        match self {
            PixelType::UInt8 => (0.0, u8::MAX as f64),
            PixelType::UInt16 => (0.0, u16::MAX as f64),
            PixelType::UInt32 => (0.0, u32::MAX as f64),
            PixelType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            PixelType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            PixelType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            PixelType::Float64 => (f64::MIN, f64::MAX),
        }
    }

    /// Whether `value` survives a round trip through this type unchanged.
    pub fn can_represent(&self, value: f64) -> bool {
        if value.is_nan() {
            return self.is_float();
        }
        let (lo, hi) = self.range();
        if value < lo || value > hi {
            return false;
        }
        match self {
            PixelType::Float64 => true,
            PixelType::Float32 => (value as f32) as f64 == value,
            _ => value.fract() == 0.0,
        }
    }

    /// Convert a sample to this type's value domain (round and clamp for
    /// integers, narrow for `Float32`).
    pub fn coerce(&self, value: f64) -> f64 {
        match self {
            PixelType::Float64 => value,
            PixelType::Float32 => (value as f32) as f64,
            _ => {
                if value.is_nan() {
                    return 0.0;
                }
                let (lo, hi) = self.range();
                value.round().clamp(lo, hi)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelType::UInt8 => "uint8",
            PixelType::UInt16 => "uint16",
            PixelType::UInt32 => "uint32",
            PixelType::Int16 => "int16",
            PixelType::Int32 => "int32",
            PixelType::Float32 => "float32",
            PixelType::Float64 => "float64",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Geospatial metadata for a raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterProfile {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    pub transform: GeoTransform,
    /// Horizontal spatial reference, `None` when unknown.
    pub crs: Option<SpatialRef>,
    pub nodata: Option<f64>,
    pub pixel_type: PixelType,
    pub band_count: usize,
}

impl RasterProfile {
    /// Single-band north-up profile.
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        pixel_type: PixelType,
        nodata: Option<f64>,
    ) -> Self {
        Self {
            width,
            height,
            transform,
            crs: None,
            nodata,
            pixel_type,
            band_count: 1,
        }
    }

    pub fn with_crs(mut self, crs: Option<SpatialRef>) -> Self {
        self.crs = crs;
        self
    }

    /// Number of samples per band.
    pub fn band_len(&self) -> usize {
        self.width * self.height
    }

    /// Total number of samples across all bands.
    pub fn sample_count(&self) -> usize {
        self.band_len() * self.band_count
    }

    /// Extent covered by the raster.
    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    /// Check internal consistency.
    ///
    /// The transform must be north-up with non-zero cell sizes and the pixel
    /// type must be able to hold the nodata value.
    pub fn validate(&self) -> RasterResult<()> {
        if self.band_count == 0 {
            return Err(RasterError::InvalidProfile("band_count must be > 0".to_string()));
        }

        if !self.transform.is_north_up() {
            return Err(RasterError::InvalidProfile(format!(
                "transform must be north-up with positive width and negative height, got {:?}",
                self.transform.to_gdal()
            )));
        }

        let (rx, ry) = self.transform.resolution();
        if !rx.is_finite() || !ry.is_finite() {
            return Err(RasterError::InvalidProfile("non-finite resolution".to_string()));
        }

        if let Some(nodata) = self.nodata {
            if !self.pixel_type.can_represent(nodata) {
                return Err(RasterError::NodataNotRepresentable {
                    nodata,
                    pixel_type: self.pixel_type,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(pixel_type: PixelType, nodata: Option<f64>) -> RasterProfile {
        RasterProfile::new(
            4,
            3,
            GeoTransform::from_origin(0.0, 3.0, 1.0, 1.0),
            pixel_type,
            nodata,
        )
    }

    #[test]
    fn test_can_represent() {
        assert!(PixelType::Float32.can_represent(-9999.0));
        assert!(!PixelType::UInt32.can_represent(-9999.0));
        assert!(PixelType::UInt32.can_represent(0.0));
        assert!(!PixelType::UInt8.can_represent(256.0));
        assert!(!PixelType::Int16.can_represent(1.5));
        assert!(!PixelType::Float32.can_represent(0.1));
        assert!(PixelType::Float64.can_represent(0.1));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(PixelType::UInt32.coerce(-5.0), 0.0);
        assert_eq!(PixelType::UInt32.coerce(3.6), 4.0);
        assert_eq!(PixelType::UInt8.coerce(300.0), 255.0);
        assert_eq!(PixelType::Float64.coerce(0.1), 0.1);
    }

    #[test]
    fn test_validate() {
        assert!(profile(PixelType::Float32, Some(-9999.0)).validate().is_ok());
        assert!(matches!(
            profile(PixelType::UInt32, Some(-9999.0)).validate(),
            Err(RasterError::NodataNotRepresentable { .. })
        ));

        let mut south_up = profile(PixelType::Float32, None);
        south_up.transform.pixel_height = 1.0;
        assert!(south_up.validate().is_err());

        let mut no_bands = profile(PixelType::Float32, None);
        no_bands.band_count = 0;
        assert!(no_bands.validate().is_err());
    }

    #[test]
    fn test_bounds_and_lengths() {
        let p = profile(PixelType::Float64, None);
        assert_eq!(p.band_len(), 12);
        assert_eq!(p.sample_count(), 12);
        assert_eq!(p.bounds(), BoundingBox::new(0.0, 0.0, 4.0, 3.0));
    }
}
