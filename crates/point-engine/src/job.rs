//! Declarative description of a tile rasterization job.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use raster_common::BoundingBox;
use serde::{Deserialize, Deserializer, Serialize};

/// Default cap on the cells of one tile grid: 4000 x 4000.
pub const DEFAULT_MAX_GRID_CELLS: usize = 16_000_000;

/// Per-cell statistic computed over the points falling in a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    #[default]
    Mean,
    Count,
    Min,
    Max,
    Stdev,
    /// Spread between flightlines: per-cell max minus min of the mean of
    /// each `PointSourceId`. Cells seen by fewer than two lines, or with no
    /// spread, are nodata.
    Dz,
}

impl Statistic {
    pub const ALL: [Statistic; 6] = [
        Statistic::Mean,
        Statistic::Count,
        Statistic::Min,
        Statistic::Max,
        Statistic::Stdev,
        Statistic::Dz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Count => "count",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Stdev => "stdev",
            Statistic::Dz => "dz",
        }
    }

    /// Gridded separately for every flightline before combining.
    pub fn is_per_flightline(&self) -> bool {
        matches!(self, Statistic::Dz)
    }

    /// Point counts rather than values of the gridded dimension.
    pub fn is_count(&self) -> bool {
        matches!(self, Statistic::Count)
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" => Ok(Statistic::Mean),
            "count" | "density" => Ok(Statistic::Count),
            "min" => Ok(Statistic::Min),
            "max" => Ok(Statistic::Max),
            "stdev" | "std" => Ok(Statistic::Stdev),
            "dz" => Ok(Statistic::Dz),
            other => Err(format!(
                "unknown statistic '{}', expected one of mean, count, min, max, stdev, dz",
                other
            )),
        }
    }
}

/// Classification codes a job keeps.
///
/// Written as a single code (`26`) or a list (`[2, 26]`) in configuration
/// and as `2,26` on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct ClassSet(BTreeSet<u8>);

impl ClassSet {
    pub fn new(codes: impl IntoIterator<Item = u8>) -> Self {
        Self(codes.into_iter().collect())
    }

    pub fn contains(&self, code: u8) -> bool {
        self.0.contains(&code)
    }

    /// Codes in ascending order.
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<u8> for ClassSet {
    fn from(code: u8) -> Self {
        Self::new([code])
    }
}

impl<const N: usize> From<[u8; N]> for ClassSet {
    fn from(codes: [u8; N]) -> Self {
        Self::new(codes)
    }
}

impl fmt::Display for ClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.codes().map(|c| c.to_string()).collect();
        f.write_str(&codes.join(","))
    }
}

impl FromStr for ClassSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let codes = s
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| {
                c.parse::<u8>()
                    .map_err(|_| format!("invalid classification code '{}'", c))
            })
            .collect::<Result<BTreeSet<u8>, String>>()?;
        if codes.is_empty() {
            return Err("no classification code given".to_string());
        }
        Ok(Self(codes))
    }
}

impl<'de> Deserialize<'de> for ClassSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(u8),
            Many(Vec<u8>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::One(code) => Self::from(code),
            Repr::Many(codes) => Self::new(codes),
        })
    }
}

/// Name of the point dimension a statistic is computed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimension(String);

impl Dimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Elevation.
    pub fn z() -> Self {
        Self("Z".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Self::z()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Return-number groups a point may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnGroup {
    First,
    Last,
    Only,
    Intermediate,
}

impl ReturnGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnGroup::First => "first",
            ReturnGroup::Last => "last",
            ReturnGroup::Only => "only",
            ReturnGroup::Intermediate => "intermediate",
        }
    }

    /// Whether a point with this return number out of `returns` belongs to the group.
    ///
    /// Single-return pulses are "only", never "first" or "last".
    pub fn contains(&self, return_number: u8, returns: u8) -> bool {
        match self {
            ReturnGroup::Only => returns <= 1,
            ReturnGroup::First => returns > 1 && return_number == 1,
            ReturnGroup::Last => returns > 1 && return_number == returns,
            ReturnGroup::Intermediate => returns > 2 && return_number > 1 && return_number < returns,
        }
    }
}

impl FromStr for ReturnGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(ReturnGroup::First),
            "last" => Ok(ReturnGroup::Last),
            "only" => Ok(ReturnGroup::Only),
            "intermediate" => Ok(ReturnGroup::Intermediate),
            other => Err(format!("unknown return group '{}'", other)),
        }
    }
}

/// Where the engine materializes its raster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// Only in memory; any scratch file is removed before the call returns.
    #[default]
    Memory,
    /// Also keep a GeoTIFF at this path.
    Path(PathBuf),
}

/// One tile rasterization request.
#[derive(Debug, Clone, PartialEq)]
pub struct GridJob {
    pub input: PathBuf,
    /// Only points with one of these classification codes are gridded.
    pub classes: ClassSet,
    pub statistic: Statistic,
    /// Cell size in the tile's horizontal units.
    pub resolution: f64,
    pub dimension: Dimension,
    /// Return groups to keep; empty keeps every return.
    pub returns: Vec<ReturnGroup>,
    pub output: OutputTarget,
    /// Largest grid, in cells, the engine may allocate for this tile.
    pub max_cells: usize,
}

impl GridJob {
    pub fn new(input: impl Into<PathBuf>, classes: impl Into<ClassSet>, statistic: Statistic) -> Self {
        Self {
            input: input.into(),
            classes: classes.into(),
            statistic,
            resolution: 1.0,
            dimension: Dimension::z(),
            returns: Vec::new(),
            output: OutputTarget::Memory,
            max_cells: DEFAULT_MAX_GRID_CELLS,
        }
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_returns(mut self, returns: Vec<ReturnGroup>) -> Self {
        self.returns = returns;
        self
    }

    pub fn with_output(mut self, output: OutputTarget) -> Self {
        self.output = output;
        self
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    /// Whether a point passes the return filter.
    pub fn keeps_return(&self, return_number: u8, returns: u8) -> bool {
        self.returns.is_empty()
            || self
                .returns
                .iter()
                .any(|g| g.contains(return_number, returns))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(format!("resolution must be positive, got {}", self.resolution));
        }
        if self.dimension.as_str().is_empty() {
            return Err("dimension must not be empty".to_string());
        }
        if self.classes.is_empty() {
            return Err("at least one classification code is required".to_string());
        }
        if self.max_cells == 0 {
            return Err("max_cells must be positive".to_string());
        }
        Ok(())
    }
}

/// Header-level facts about a tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMetadata {
    /// Encoding version as `major.minor`, e.g. `"1.4"`.
    pub version: String,
    /// Horizontal spatial reference as reported by the file, if any.
    pub srs: Option<String>,
    pub point_count: u64,
    pub bounds: Option<BoundingBox>,
}
