//! Shared test utilities for the quicklook workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic LAS tile writers for both header versions the pipeline handles
//! - Point generators laid out on regular grids
//! - Small raster fixtures
//! - Approximate-equality assertion macros
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{write_las_tile, grid_points, LasVersion};
//! ```

pub mod fixtures;
pub mod generators;
pub mod rasters;

pub use fixtures::*;
pub use generators::*;
pub use rasters::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Asserts every sample of two slices is within `epsilon`, reporting the first offender.
///
/// ```ignore
/// assert_samples_approx_eq!(raster.data(), &[1.0, 2.0], 1e-6);
/// ```
#[macro_export]
macro_rules! assert_samples_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: &[f64] = $left;
        let right: &[f64] = $right;
        assert_eq!(left.len(), right.len(), "sample counts differ");
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            if (l - r).abs() > $epsilon {
                panic!(
                    "assertion failed: sample {} differs\n  left: `{:?}`,\n right: `{:?}`",
                    i, l, r
                );
            }
        }
    }};
}
