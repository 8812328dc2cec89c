//! GeoTIFF codec for quicklook rasters.
//!
//! The writer produces single-band, strip-organised GeoTIFFs carrying a
//! pixel-scale/tiepoint georeference, a GeoKey directory for the horizontal
//! CRS and the GDAL nodata tag. The reader understands the same subset, which
//! is also what GDAL-based tools emit for north-up grids.

pub mod compression;
pub mod error;
mod geokeys;
pub mod reader;
pub mod writer;

pub use compression::RasterCompression;
pub use error::{RasterIoError, Result};
pub use reader::{read_geotiff, read_geotiff_path};
pub use writer::GeoTiffWriter;
