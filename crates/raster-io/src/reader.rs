//! GeoTIFF reader.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use raster_common::{GeoTransform, PixelType, RasterBuffer, RasterProfile};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use crate::error::{RasterIoError, Result};
use crate::geokeys::{
    self, tag, GDAL_NODATA, GEO_ASCII_PARAMS, GEO_KEY_DIRECTORY, MODEL_PIXEL_SCALE,
    MODEL_TIEPOINT,
};

/// Read a single-band GeoTIFF from a file.
pub fn read_geotiff_path(path: impl AsRef<Path>) -> Result<RasterBuffer> {
    let file = File::open(path.as_ref())?;
    read_geotiff(BufReader::new(file))
}

/// Decode a single-band GeoTIFF.
///
/// The georeference must be given as pixel scale plus tiepoint. Rasters
/// declared pixel-is-point are shifted by half a cell so the transform always
/// addresses cell corners.
pub fn read_geotiff<R: Read + Seek>(reader: R) -> Result<RasterBuffer> {
    let mut decoder = Decoder::new(reader)?;

    let (width, height) = decoder.dimensions()?;
    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(RasterIoError::unsupported_layout(format!(
                "expected one sample per pixel, got {:?}",
                other
            )))
        }
    }

    let scale = decoder
        .find_tag(tag(MODEL_PIXEL_SCALE))?
        .map(|v| v.into_f64_vec())
        .transpose()?
        .ok_or_else(|| RasterIoError::missing_georeference("no ModelPixelScale tag"))?;
    let tiepoint = decoder
        .find_tag(tag(MODEL_TIEPOINT))?
        .map(|v| v.into_f64_vec())
        .transpose()?
        .ok_or_else(|| RasterIoError::missing_georeference("no ModelTiepoint tag"))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(RasterIoError::missing_georeference(
            "truncated pixel scale or tiepoint",
        ));
    }

    let keys = decoder
        .find_tag(tag(GEO_KEY_DIRECTORY))?
        .map(|v| v.into_u16_vec())
        .transpose()?
        .unwrap_or_default();
    let ascii = decoder
        .find_tag(tag(GEO_ASCII_PARAMS))?
        .map(|v| v.into_string())
        .transpose()?;
    let decoded = geokeys::decode(&keys, ascii.as_deref());

    let nodata = decoder
        .find_tag(tag(GDAL_NODATA))?
        .map(|v| v.into_string())
        .transpose()?
        .and_then(|s| parse_nodata(&s));

    let (res_x, res_y) = (scale[0], scale[1]);
    let mut origin_x = tiepoint[3] - tiepoint[0] * res_x;
    let mut origin_y = tiepoint[4] + tiepoint[1] * res_y;
    if decoded.pixel_is_point {
        origin_x -= res_x / 2.0;
        origin_y += res_y / 2.0;
    }
    let transform = GeoTransform::from_origin(origin_x, origin_y, res_x, res_y);

    let (pixel_type, data) = match decoder.read_image()? {
        DecodingResult::U8(v) => (PixelType::UInt8, widen(v)),
        DecodingResult::U16(v) => (PixelType::UInt16, widen(v)),
        DecodingResult::U32(v) => (PixelType::UInt32, widen(v)),
        DecodingResult::I16(v) => (PixelType::Int16, widen(v)),
        DecodingResult::I32(v) => (PixelType::Int32, widen(v)),
        DecodingResult::F32(v) => (PixelType::Float32, widen(v)),
        DecodingResult::F64(v) => (PixelType::Float64, v),
        _ => {
            return Err(RasterIoError::unsupported_layout(
                "sample type has no raster equivalent",
            ))
        }
    };

    let profile = RasterProfile::new(width as usize, height as usize, transform, pixel_type, nodata)
        .with_crs(decoded.crs);
    Ok(RasterBuffer::new(profile, data)?)
}

fn widen<T: Into<f64>>(values: Vec<T>) -> Vec<f64> {
    values.into_iter().map(Into::into).collect()
}

fn parse_nodata(text: &str) -> Option<f64> {
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if trimmed.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    trimmed.parse().ok()
}
