//! Common raster types shared across all quicklook crates.
//!
//! A raster here is always a north-up grid of `f64` samples described by a
//! [`RasterProfile`]. Codecs convert to and from the declared
//! [`PixelType`] at the edges.

pub mod bbox;
pub mod buffer;
pub mod crs;
pub mod error;
pub mod nodata;
pub mod profile;
pub mod transform;

pub use bbox::BoundingBox;
pub use buffer::RasterBuffer;
pub use crs::{SpatialRef, SrsFormat};
pub use error::{RasterError, RasterResult};
pub use nodata::{avoid_sentinel, is_nodata, COUNT_NODATA, ELEVATION_NODATA};
pub use profile::{PixelType, RasterProfile};
pub use transform::GeoTransform;
