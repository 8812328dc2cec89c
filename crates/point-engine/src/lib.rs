//! Point-cloud engines for quicklook.
//!
//! An engine answers two questions about a tile: what its header declares
//! ([`TileMetadata`]) and what a filtered, gridded view of its points looks
//! like ([`GridJob`] in, [`RasterBuffer`](raster_common::RasterBuffer) out).
//!
//! Two implementations are provided:
//! - [`NativeLasEngine`] decodes LAS/LAZ in-process with the `las` crate
//! - [`PdalEngine`] runs one `pdal` process per call

pub mod engine;
pub mod error;
pub mod extra_bytes;
pub mod grid;
pub mod job;
pub mod native;
pub mod pdal;

pub use engine::{create_engine, EngineKind, PointCloudEngine};
pub use error::{EngineError, EngineResult};
pub use extra_bytes::{extra_bytes_fields, ExtraBytesField};
pub use grid::{flightline_spread, GridAccumulator, GridSpec};
pub use job::{
    ClassSet, Dimension, GridJob, OutputTarget, ReturnGroup, Statistic, TileMetadata,
    DEFAULT_MAX_GRID_CELLS,
};
pub use native::NativeLasEngine;
pub use pdal::PdalEngine;
