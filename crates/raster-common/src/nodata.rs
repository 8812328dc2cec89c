//! Nodata sentinels and comparisons.

/// Sentinel for elevation-like statistics (mean, min, max, stdev).
///
/// Matches the value the point-cloud engine writes for empty cells.
pub const ELEVATION_NODATA: f64 = -9999.0;

/// Sentinel for count statistics after normalisation.
pub const COUNT_NODATA: f64 = 0.0;

/// Whether `value` denotes "no sample" under the given nodata declaration.
///
/// NaN is always treated as missing.
pub fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) if nd.is_nan() => false,
        Some(nd) => value == nd,
        None => false,
    }
}

/// Move a real sample off the sentinel so it cannot be mistaken for nodata.
///
/// The replacement is the nearest `f32` toward zero, so the nudge survives
/// a cast to single precision. A zero sentinel is left untouched.
pub fn avoid_sentinel(value: f64, sentinel: f64) -> f64 {
    if value != sentinel || sentinel == 0.0 || !sentinel.is_finite() {
        return value;
    }
    let narrowed = sentinel as f32;
    f32::from_bits(narrowed.to_bits() - 1) as f64
}
