//! Small in-memory raster fixtures.

use raster_common::{
    GeoTransform, PixelType, RasterBuffer, RasterProfile, SpatialRef, ELEVATION_NODATA,
};

/// `Float64` raster with top-left corner `(origin_x, origin_y)` and the
/// engine nodata sentinel.
///
/// # Panics
/// When `values.len() != width * height`.
pub fn float_raster(
    origin_x: f64,
    origin_y: f64,
    width: usize,
    height: usize,
    resolution: f64,
    values: Vec<f64>,
) -> RasterBuffer {
    let profile = RasterProfile::new(
        width,
        height,
        GeoTransform::from_origin(origin_x, origin_y, resolution, resolution),
        PixelType::Float64,
        Some(ELEVATION_NODATA),
    )
    .with_crs(Some(SpatialRef::from_epsg(6347)));
    RasterBuffer::new(profile, values).expect("fixture dimensions")
}

/// Raster with every cell set to `value`.
pub fn constant_raster(
    origin_x: f64,
    origin_y: f64,
    width: usize,
    height: usize,
    resolution: f64,
    value: f64,
) -> RasterBuffer {
    float_raster(
        origin_x,
        origin_y,
        width,
        height,
        resolution,
        vec![value; width * height],
    )
}
