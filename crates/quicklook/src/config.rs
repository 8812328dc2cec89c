//! Batch configuration.
//!
//! Values come from, in increasing priority: built-in defaults, `QUICKLOOK_*`
//! environment variables, a YAML file, and finally command-line flags applied
//! by the caller. YAML values may reference the environment with `${VAR}` or
//! `${VAR:-default}`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use point_engine::{
    ClassSet, Dimension, EngineKind, ReturnGroup, Statistic, DEFAULT_MAX_GRID_CELLS,
};
use raster_io::RasterCompression;
use serde::{Deserialize, Serialize};

use crate::classification::{default_table, ClassificationPolicy};
use crate::error::{QuickLookError, Result};
use crate::executor::default_workers;
use crate::mosaic::DEFAULT_MAX_MOSAIC_CELLS;
use crate::rasterizer::GridRequest;

/// Whether per-tile failures make the batch unsuccessful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Failed tiles are excluded; partial coverage is success.
    #[default]
    Tolerate,
    /// The mosaic is still written, but any failed tile fails the batch.
    Strict,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::Tolerate => "tolerate",
            FailurePolicy::Strict => "strict",
        })
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tolerate" | "lenient" => Ok(FailurePolicy::Tolerate),
            "strict" => Ok(FailurePolicy::Strict),
            other => Err(format!(
                "unknown failure policy '{}', expected tolerate or strict",
                other
            )),
        }
    }
}

/// Settings for one quick-look batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default = "QuickLookConfig::from_env")]
pub struct QuickLookConfig {
    pub statistic: Statistic,
    /// Output cell size in the tiles' horizontal units.
    pub resolution: f64,
    /// Maximum concurrent tile rasterizations.
    pub workers: usize,
    /// Fixed classification codes for every tile, bypassing the version table.
    pub classification_override: Option<ClassSet>,
    /// Encoding version to classification codes.
    pub classification_table: BTreeMap<String, ClassSet>,
    /// Tile file extensions, without the dot.
    pub tile_extensions: Vec<String>,
    pub dimension: Dimension,
    /// Return groups to keep; empty keeps every return.
    pub returns: Vec<ReturnGroup>,
    pub engine: EngineKind,
    /// `pdal` executable used by the PDAL engine.
    pub pdal_path: PathBuf,
    pub failure_policy: FailurePolicy,
    pub compression: RasterCompression,
    /// Write `QUICK_LOOK_<stat>.json` next to the mosaic.
    pub write_report: bool,
    /// Largest per-tile grid, in cells. Larger tiles fail on their own.
    pub max_grid_cells: usize,
    /// Largest mosaic, in cells.
    pub max_mosaic_cells: usize,
}

impl Default for QuickLookConfig {
    fn default() -> Self {
        Self {
            statistic: Statistic::Mean,
            resolution: 1.0,
            workers: default_workers(),
            classification_override: None,
            classification_table: default_table(),
            tile_extensions: vec!["las".to_string()],
            dimension: Dimension::z(),
            returns: Vec::new(),
            engine: EngineKind::Native,
            pdal_path: PathBuf::from("pdal"),
            failure_policy: FailurePolicy::Tolerate,
            compression: RasterCompression::Deflate,
            write_report: true,
            max_grid_cells: DEFAULT_MAX_GRID_CELLS,
            max_mosaic_cells: DEFAULT_MAX_MOSAIC_CELLS,
        }
    }
}

impl QuickLookConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("QUICKLOOK_STATISTIC") {
            if let Ok(stat) = val.parse() {
                config.statistic = stat;
            }
        }

        if let Some(val) = lookup("QUICKLOOK_RESOLUTION") {
            if let Ok(res) = val.trim().parse() {
                config.resolution = res;
            }
        }

        if let Some(val) = lookup("QUICKLOOK_WORKERS") {
            if let Ok(workers) = val.trim().parse() {
                config.workers = workers;
            }
        }

        if let Some(val) = lookup("QUICKLOOK_CLASSIFICATION") {
            if let Ok(codes) = val.parse() {
                config.classification_override = Some(codes);
            }
        }

        if let Some(val) = lookup("QUICKLOOK_EXTENSIONS") {
            config.tile_extensions = val
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
        }

        if let Some(val) = lookup("QUICKLOOK_DIMENSION") {
            if !val.trim().is_empty() {
                config.dimension = Dimension::new(val.trim());
            }
        }

        if let Some(val) = lookup("QUICKLOOK_ENGINE") {
            if let Ok(engine) = val.parse() {
                config.engine = engine;
            }
        }

        if let Some(val) = lookup("PDAL_PATH") {
            config.pdal_path = PathBuf::from(val);
        }

        if let Some(val) = lookup("QUICKLOOK_FAILURE_POLICY") {
            if let Ok(policy) = val.parse() {
                config.failure_policy = policy;
            }
        }

        if let Some(val) = lookup("QUICKLOOK_MAX_GRID_CELLS") {
            if let Ok(cells) = val.trim().parse() {
                config.max_grid_cells = cells;
            }
        }

        if let Some(val) = lookup("QUICKLOOK_MAX_MOSAIC_CELLS") {
            if let Ok(cells) = val.trim().parse() {
                config.max_mosaic_cells = cells;
            }
        }

        config
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(format!("resolution must be > 0, got {}", self.resolution));
        }

        if self.workers == 0 {
            return Err("workers must be >= 1".to_string());
        }

        if let Some(codes) = &self.classification_override {
            if codes.is_empty() || codes.contains(0) {
                return Err("classification_override codes must be 1-255".to_string());
            }
        }

        if let Some((version, _)) = self
            .classification_table
            .iter()
            .find(|(_, c)| c.is_empty() || c.contains(0))
        {
            return Err(format!(
                "classification codes for version {} must be 1-255",
                version
            ));
        }

        if self.max_grid_cells == 0 || self.max_mosaic_cells == 0 {
            return Err("max_grid_cells and max_mosaic_cells must be >= 1".to_string());
        }

        if self.tile_extensions.is_empty() {
            return Err("tile_extensions must not be empty".to_string());
        }

        if self.dimension.as_str().trim().is_empty() {
            return Err("dimension must not be empty".to_string());
        }

        Ok(())
    }

    /// Per-batch grid request; the classification codes are filled in per tile.
    pub fn grid_request(&self) -> GridRequest {
        GridRequest::new(self.statistic, self.resolution)
            .with_dimension(self.dimension.clone())
            .with_returns(self.returns.clone())
            .with_max_cells(self.max_grid_cells)
    }

    pub fn classification_policy(&self) -> ClassificationPolicy {
        ClassificationPolicy::from_map(self.classification_table.clone())
            .with_override(self.classification_override.clone())
    }
}

/// Load a YAML configuration file.
///
/// Keys missing from the file keep their environment or default value.
pub fn load_config(path: impl AsRef<Path>) -> Result<QuickLookConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        QuickLookError::invalid_config(format!("failed to read {}: {}", path.display(), e))
    })?;
    parse_config(&content)
        .map_err(|e| QuickLookError::invalid_config(format!("{}: {}", path.display(), e)))
}

/// Parse and validate YAML configuration text.
pub fn parse_config(content: &str) -> std::result::Result<QuickLookConfig, String> {
    let expanded = expand_env_vars(content)?;
    let config: QuickLookConfig = serde_yaml::from_str(&expanded).map_err(|e| e.to_string())?;
    config.validate()?;
    Ok(config)
}

/// Substitute `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> std::result::Result<String, String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut expr = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(c) => expr.push(c),
                None => return Err(format!("unclosed variable substitution: ${{{}", expr)),
            }
        }
        result.push_str(&resolve_var_expr(&expr)?);
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> std::result::Result<String, String> {
    if let Some((name, default)) = expr.split_once(":-") {
        Ok(std::env::var(name.trim()).unwrap_or_else(|_| default.to_string()))
    } else {
        std::env::var(expr.trim())
            .map_err(|_| format!("environment variable {} is not set", expr.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = QuickLookConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.statistic, Statistic::Mean);
        assert_eq!(config.resolution, 1.0);
        assert!(config.workers >= 1);
        assert_eq!(config.classification_table.get("1.4"), Some(&ClassSet::from(40)));
        assert_eq!(config.max_grid_cells, DEFAULT_MAX_GRID_CELLS);
        assert_eq!(config.failure_policy, FailurePolicy::Tolerate);
    }

    #[test]
    fn test_lookup_overrides() {
        let env: BTreeMap<&str, &str> = BTreeMap::from([
            ("QUICKLOOK_STATISTIC", "count"),
            ("QUICKLOOK_RESOLUTION", "2.5"),
            ("QUICKLOOK_WORKERS", "not-a-number"),
            ("QUICKLOOK_CLASSIFICATION", "2, 26"),
            ("QUICKLOOK_MAX_GRID_CELLS", "1000"),
            ("QUICKLOOK_EXTENSIONS", "las, laz"),
            ("QUICKLOOK_ENGINE", "pdal"),
            ("QUICKLOOK_FAILURE_POLICY", "strict"),
        ]);
        let config = QuickLookConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.statistic, Statistic::Count);
        assert_eq!(config.resolution, 2.5);
        assert_eq!(config.workers, QuickLookConfig::default().workers);
        assert_eq!(config.classification_override, Some(ClassSet::from([2, 26])));
        assert_eq!(config.max_grid_cells, 1000);
        assert_eq!(config.grid_request().max_cells, 1000);
        assert_eq!(config.tile_extensions, vec!["las", "laz"]);
        assert_eq!(config.engine, EngineKind::Pdal);
        assert_eq!(config.failure_policy, FailurePolicy::Strict);
    }

    #[test]
    fn test_validation() {
        let mut config = QuickLookConfig::default();
        config.resolution = 0.0;
        assert!(config.validate().is_err());

        let mut config = QuickLookConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = QuickLookConfig::default();
        config
            .classification_table
            .insert("1.3".to_string(), ClassSet::from([0, 26]));
        assert!(config.validate().unwrap_err().contains("1.3"));

        let mut config = QuickLookConfig::default();
        config.classification_override = Some(ClassSet::default());
        assert!(config.validate().is_err());

        let mut config = QuickLookConfig::default();
        config.max_grid_cells = 0;
        assert!(config.validate().is_err());

        let mut config = QuickLookConfig::default();
        config.tile_extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
statistic: stdev
resolution: 4
returns: [last, only]
classification_table:
  "1.2": 2
  "1.4": [2, 40]
compression: lzw
max_mosaic_cells: 5000
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.statistic, Statistic::Stdev);
        assert_eq!(config.resolution, 4.0);
        assert_eq!(config.returns, vec![ReturnGroup::Last, ReturnGroup::Only]);
        assert_eq!(config.compression, RasterCompression::Lzw);
        assert_eq!(config.classification_policy().lookup("1.2"), Some(ClassSet::from(2)));
        assert_eq!(
            config.classification_policy().lookup("1.4"),
            Some(ClassSet::from([2, 40]))
        );
        assert_eq!(config.max_mosaic_cells, 5000);
        assert!(config.write_report);

        let request = config.grid_request();
        assert_eq!(request.statistic, Statistic::Stdev);
        assert_eq!(request.classification, None);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(parse_config("resolution: -1").is_err());
        assert!(parse_config("statistic: median").is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("QUICKLOOK_TEST_PDAL", "/opt/pdal/bin/pdal");
        let out = expand_env_vars("pdal_path: ${QUICKLOOK_TEST_PDAL}").unwrap();
        assert_eq!(out, "pdal_path: /opt/pdal/bin/pdal");

        let out = expand_env_vars("workers: ${QUICKLOOK_TEST_UNSET_VAR:-3}").unwrap();
        assert_eq!(out, "workers: 3");

        assert!(expand_env_vars("${QUICKLOOK_TEST_UNSET_VAR}").is_err());
        assert!(expand_env_vars("${OPEN").is_err());
        assert_eq!(expand_env_vars("cost: $5").unwrap(), "cost: $5");
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/quicklook.yaml"),
            Err(QuickLookError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = parse_config(include_str!("../../../config/quicklook.yaml")).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.tile_extensions, vec!["las", "laz"]);
        assert_eq!(config.classification_table, default_table());
        assert_eq!(config.engine, EngineKind::Native);
    }
}
