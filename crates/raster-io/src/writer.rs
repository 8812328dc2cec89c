//! GeoTIFF writer.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use raster_common::{PixelType, RasterBuffer};
use tiff::encoder::colortype::{ColorType, Gray16, Gray32, Gray32Float, Gray64Float, Gray8};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tracing::debug;

use crate::compression::RasterCompression;
use crate::error::{RasterIoError, Result};
use crate::geokeys::{
    tag, GeoKeyDirectory, GDAL_NODATA, GEO_ASCII_PARAMS, GEO_KEY_DIRECTORY, MODEL_PIXEL_SCALE,
    MODEL_TIEPOINT,
};

/// Writes single-band rasters as GeoTIFF.
///
/// ```ignore
/// let writer = GeoTiffWriter::new().with_compression(RasterCompression::Lzw);
/// writer.write_to_path(&raster, "QUICK_LOOK_mean.tif")?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffWriter {
    compression: RasterCompression,
}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compression: RasterCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn compression(&self) -> RasterCompression {
        self.compression
    }

    /// Encode to an in-memory buffer.
    pub fn to_bytes(&self, raster: &RasterBuffer) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(raster, &mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Encode to a file, replacing it if it exists.
    pub fn write_to_path(&self, raster: &RasterBuffer, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        self.write(raster, &mut out)?;
        out.flush()?;
        debug!(
            path = %path.display(),
            width = raster.width(),
            height = raster.height(),
            pixel_type = %raster.profile.pixel_type,
            compression = %self.compression,
            "Wrote GeoTIFF"
        );
        Ok(())
    }

    /// Encode to any seekable sink.
    pub fn write<W: Write + Seek>(&self, raster: &RasterBuffer, sink: W) -> Result<()> {
        let profile = &raster.profile;
        profile.validate()?;
        if profile.band_count != 1 {
            return Err(RasterIoError::unsupported_layout(format!(
                "only single-band rasters can be written, got {} bands",
                profile.band_count
            )));
        }

        let mut encoder = TiffEncoder::new(sink)?.with_compression(self.compression.to_tiff());
        let fill = profile.nodata.unwrap_or(0.0);
        let data = raster.data();

        match profile.pixel_type {
            PixelType::Float32 => {
                let samples: Vec<f32> = data.iter().map(|v| *v as f32).collect();
                write_image::<_, Gray32Float>(&mut encoder, raster, &samples)
            }
            PixelType::Float64 => write_image::<_, Gray64Float>(&mut encoder, raster, data),
            PixelType::UInt8 => {
                let samples: Vec<u8> = integer_samples(data, fill, PixelType::UInt8)
                    .map(|v| v as u8)
                    .collect();
                write_image::<_, Gray8>(&mut encoder, raster, &samples)
            }
            PixelType::UInt16 => {
                let samples: Vec<u16> = integer_samples(data, fill, PixelType::UInt16)
                    .map(|v| v as u16)
                    .collect();
                write_image::<_, Gray16>(&mut encoder, raster, &samples)
            }
            PixelType::UInt32 => {
                let samples: Vec<u32> = integer_samples(data, fill, PixelType::UInt32)
                    .map(|v| v as u32)
                    .collect();
                write_image::<_, Gray32>(&mut encoder, raster, &samples)
            }
            other => Err(RasterIoError::UnsupportedPixelType(other)),
        }
    }
}

/// Integer samples with NaN replaced by the fill value, rounded and clamped.
fn integer_samples(
    data: &[f64],
    fill: f64,
    pixel_type: PixelType,
) -> impl Iterator<Item = f64> + '_ {
    data.iter().map(move |v| {
        let v = if v.is_nan() { fill } else { *v };
        pixel_type.coerce(v)
    })
}

fn write_image<W, C>(
    encoder: &mut TiffEncoder<W>,
    raster: &RasterBuffer,
    samples: &[C::Inner],
) -> Result<()>
where
    W: Write + Seek,
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let mut image = encoder.new_image::<C>(raster.width() as u32, raster.height() as u32)?;
    write_geo_tags(image.encoder(), raster)?;
    image.write_data(samples)?;
    Ok(())
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<W, K>,
    raster: &RasterBuffer,
) -> Result<()> {
    let transform = &raster.profile.transform;
    let (res_x, res_y) = transform.resolution();

    // ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
    let pixel_scale = [res_x, res_y, 0.0];
    dir.write_tag(tag(MODEL_PIXEL_SCALE), pixel_scale.as_slice())?;

    // ModelTiepoint: raster (0, 0) to the top-left world corner
    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    dir.write_tag(tag(MODEL_TIEPOINT), tiepoint.as_slice())?;

    let geokeys = GeoKeyDirectory::for_crs(raster.profile.crs.as_ref());
    dir.write_tag(tag(GEO_KEY_DIRECTORY), geokeys.keys.as_slice())?;
    if let Some(ascii) = geokeys.ascii.as_deref() {
        dir.write_tag(tag(GEO_ASCII_PARAMS), ascii)?;
    }

    if let Some(nodata) = raster.profile.nodata {
        let text = format_nodata(nodata);
        dir.write_tag(tag(GDAL_NODATA), text.as_str())?;
    }

    Ok(())
}

fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", nodata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_common::{GeoTransform, RasterProfile};

    fn raster(pixel_type: PixelType, nodata: Option<f64>) -> RasterBuffer {
        let profile = RasterProfile::new(
            4,
            2,
            GeoTransform::from_origin(0.0, 2.0, 1.0, 1.0),
            pixel_type,
            nodata,
        );
        RasterBuffer::new(profile, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap()
    }

    #[test]
    fn test_writes_tiff_magic() {
        let bytes = GeoTiffWriter::new()
            .to_bytes(&raster(PixelType::Float32, Some(-9999.0)))
            .unwrap();
        assert!(bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*"));
    }

    #[test]
    fn test_rejects_signed_integers() {
        let result = GeoTiffWriter::new().to_bytes(&raster(PixelType::Int16, None));
        assert!(matches!(
            result,
            Err(RasterIoError::UnsupportedPixelType(PixelType::Int16))
        ));
    }

    #[test]
    fn test_rejects_multi_band() {
        let mut profile = raster(PixelType::Float32, None).profile;
        profile.band_count = 2;
        let multi = RasterBuffer::filled(profile, 1.0).unwrap();
        assert!(matches!(
            GeoTiffWriter::new().to_bytes(&multi),
            Err(RasterIoError::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn test_nodata_formatting() {
        assert_eq!(format_nodata(-9999.0), "-9999");
        assert_eq!(format_nodata(0.0), "0");
        assert_eq!(format_nodata(f64::NAN), "nan");
    }
}
