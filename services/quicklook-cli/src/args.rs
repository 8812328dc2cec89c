//! Command-line arguments and their merge onto the loaded configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use point_engine::{ClassSet, Dimension, EngineKind, ReturnGroup, Statistic};
use quicklook::{load_config, FailurePolicy, QuickLookConfig};
use raster_io::RasterCompression;
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "quicklook")]
#[command(about = "Build a quick-look raster mosaic from a directory of point-cloud tiles")]
pub struct Args {
    /// Directory holding the input tiles
    pub input_dir: PathBuf,

    /// Output directory, or a .tif path for the mosaic
    pub output: PathBuf,

    /// Statistic to grid: mean, count, min, max, stdev or dz
    #[arg(short, long)]
    pub statistic: Option<Statistic>,

    /// Output cell size in the tiles' horizontal units
    #[arg(short, long)]
    pub resolution: Option<f64>,

    /// Concurrent tile workers (default: half the available cores)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Fixed classification codes for every tile, e.g. 26 or 2,26,
    /// bypassing the version table
    #[arg(short, long)]
    pub classification: Option<ClassSet>,

    /// Point dimension to grid: Z, Intensity or an extra-bytes attribute
    /// such as total_thu
    #[arg(long)]
    pub dimension: Option<String>,

    /// Return groups to keep (first, last, only, intermediate)
    #[arg(long, value_delimiter = ',')]
    pub returns: Vec<ReturnGroup>,

    /// Tile file extensions
    #[arg(long, value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Point-cloud engine: native or pdal
    #[arg(long)]
    pub engine: Option<EngineKind>,

    /// Path to the pdal executable
    #[arg(long)]
    pub pdal_path: Option<PathBuf>,

    /// Whether tile failures fail the batch: tolerate or strict
    #[arg(long)]
    pub failure_policy: Option<FailurePolicy>,

    /// Mosaic compression: none, lzw or deflate
    #[arg(long)]
    pub compression: Option<RasterCompression>,

    /// Largest per-tile grid, in cells
    #[arg(long)]
    pub max_grid_cells: Option<usize>,

    /// YAML configuration file
    #[arg(long, env = "QUICKLOOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip the JSON batch report
    #[arg(long)]
    pub no_report: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    pub fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// File (or environment) configuration with command-line flags on top.
    pub fn resolve_config(&self) -> Result<QuickLookConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => QuickLookConfig::from_env(),
        };

        if let Some(statistic) = self.statistic {
            config.statistic = statistic;
        }
        if let Some(resolution) = self.resolution {
            config.resolution = resolution;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.classification.is_some() {
            config.classification_override = self.classification.clone();
        }
        if let Some(dimension) = &self.dimension {
            config.dimension = Dimension::new(dimension.as_str());
        }
        if !self.returns.is_empty() {
            config.returns = self.returns.clone();
        }
        if !self.extensions.is_empty() {
            config.tile_extensions = self.extensions.clone();
        }
        if let Some(engine) = self.engine {
            config.engine = engine;
        }
        if let Some(path) = &self.pdal_path {
            config.pdal_path = path.clone();
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if let Some(compression) = self.compression {
            config.compression = compression;
        }
        if let Some(cells) = self.max_grid_cells {
            config.max_grid_cells = cells;
        }
        if self.no_report {
            config.write_report = false;
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["quicklook", "/data/tiles", "/data/out"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "-s", "count", "-r", "2", "-w", "3", "-c", "2,40", "--returns", "last,only",
            "--engine", "pdal", "--failure-policy", "strict", "--compression", "lzw",
            "--max-grid-cells", "5000", "--no-report",
        ]);
        let config = args.resolve_config().unwrap();

        assert_eq!(config.statistic, Statistic::Count);
        assert_eq!(config.resolution, 2.0);
        assert_eq!(config.workers, 3);
        assert_eq!(config.classification_override, Some(ClassSet::from([2, 40])));
        assert_eq!(config.max_grid_cells, 5000);
        assert_eq!(config.returns, vec![ReturnGroup::Last, ReturnGroup::Only]);
        assert_eq!(config.engine, EngineKind::Pdal);
        assert_eq!(config.failure_policy, FailurePolicy::Strict);
        assert_eq!(config.compression, RasterCompression::Lzw);
        assert!(!config.write_report);
    }

    #[test]
    fn test_yaml_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quicklook.yaml");
        std::fs::write(&path, "statistic: max\nresolution: 5\nworkers: 2\n").unwrap();

        let path_arg = path.display().to_string();
        let config = parse(&["--config", &path_arg, "-r", "0.5"])
            .resolve_config()
            .unwrap();
        assert_eq!(config.statistic, Statistic::Max);
        assert_eq!(config.workers, 2);
        assert_eq!(config.resolution, 0.5);
    }

    #[test]
    fn test_invalid_values() {
        assert!(Args::try_parse_from(["quicklook", "a", "b", "-s", "median"]).is_err());
        assert!(parse(&["-r", "0"]).resolve_config().is_err());
        assert!(parse(&["-w", "0"]).resolve_config().is_err());
        assert!(Args::try_parse_from(["quicklook", "a", "b", "-c", "2,x"]).is_err());
        assert!(parse(&["-c", "0"]).resolve_config().is_err());
        assert_eq!(parse(&["-s", "dz"]).statistic, Some(Statistic::Dz));
    }

    #[test]
    fn test_log_level() {
        assert_eq!(parse(&["--log-level", "DEBUG"]).level(), Level::DEBUG);
        assert_eq!(parse(&["--log-level", "loud"]).level(), Level::INFO);
        assert_eq!(parse(&[]).log_format, LogFormat::Text);
        assert_eq!(parse(&["--log-format", "json"]).log_format, LogFormat::Json);
    }
}
