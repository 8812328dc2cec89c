//! Tile discovery and metadata resolution.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use point_engine::PointCloudEngine;
use raster_common::SpatialRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{FailureStage, QuickLookError, Result, TileFailure};
use crate::progress::ProgressSink;

/// Phase label reported while tile headers are read.
pub const METADATA_PHASE: &str = "Reading tile metadata";

/// Identity of a tile: its file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(String);

impl TileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.display().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tile file found on disk, before its header has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTile {
    pub id: TileId,
    pub path: PathBuf,
    /// File name without extension.
    pub stem: String,
    /// Position in discovery order.
    pub ordinal: usize,
}

impl DiscoveredTile {
    pub fn new(path: PathBuf, ordinal: usize) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: TileId::from_path(&path),
            path,
            stem,
            ordinal,
        }
    }
}

/// A tile with resolved metadata. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub id: TileId,
    pub path: PathBuf,
    pub stem: String,
    pub ordinal: usize,
    /// Horizontal spatial reference, `None` when absent or unparseable.
    pub srs: Option<SpatialRef>,
    /// Encoding version, e.g. `"1.4"`.
    pub version: String,
}

/// Outcome of resolving one discovered tile.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntry {
    Resolved(Tile),
    Failed {
        ordinal: usize,
        failure: TileFailure,
    },
}

impl CatalogEntry {
    pub fn ordinal(&self) -> usize {
        match self {
            CatalogEntry::Resolved(tile) => tile.ordinal,
            CatalogEntry::Failed { ordinal, .. } => *ordinal,
        }
    }
}

/// Finds tiles in a directory and resolves their metadata through an engine.
#[derive(Debug, Clone)]
pub struct TileCatalog {
    extensions: Vec<String>,
}

impl Default for TileCatalog {
    fn default() -> Self {
        Self::new(["las"])
    }
}

impl TileCatalog {
    /// Catalog matching the given file extensions (case-insensitive, without the dot).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|x| *x == e))
    }

    /// List matching files directly inside `dir`, sorted by path.
    ///
    /// Fails with `TileDiscoveryFailed` when `dir` cannot be read.
    pub fn discover(&self, dir: &Path) -> Result<Vec<DiscoveredTile>> {
        if !dir.is_dir() {
            return Err(QuickLookError::discovery(dir, "not a directory"));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| QuickLookError::discovery(dir, e))?;
            if entry.file_type().is_file() && self.matches(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        let tiles: Vec<DiscoveredTile> = paths
            .into_iter()
            .enumerate()
            .map(|(ordinal, path)| DiscoveredTile::new(path, ordinal))
            .collect();

        info!(dir = %dir.display(), tiles = tiles.len(), "Discovered tiles");
        Ok(tiles)
    }

    /// Query one tile's header.
    ///
    /// An unusable spatial reference is a soft failure: the tile resolves with
    /// `srs = None`. A failed query is a hard per-tile failure.
    pub async fn resolve(
        &self,
        discovered: DiscoveredTile,
        engine: &dyn PointCloudEngine,
    ) -> CatalogEntry {
        let metadata = match engine.query_metadata(&discovered.path).await {
            Ok(m) => m,
            Err(e) => {
                let err = QuickLookError::MetadataQueryFailed {
                    tile: discovered.id.clone(),
                    message: e.to_string(),
                };
                warn!(tile = %discovered.id, error = %e, "Metadata query failed");
                return CatalogEntry::Failed {
                    ordinal: discovered.ordinal,
                    failure: TileFailure::new(discovered.id, FailureStage::Metadata, err.to_string()),
                };
            }
        };

        let srs = match metadata.srs.as_deref() {
            Some(text) => match SpatialRef::parse(text) {
                Ok(srs) => Some(srs),
                Err(e) => {
                    warn!(tile = %discovered.id, error = %e, "Unparseable spatial reference, recording as unknown");
                    None
                }
            },
            None => {
                warn!(tile = %discovered.id, "Tile declares no spatial reference");
                None
            }
        };

        debug!(
            tile = %discovered.id,
            version = %metadata.version,
            srs = srs.as_ref().map(|s| s.short_name()).unwrap_or_default(),
            points = metadata.point_count,
            "Resolved tile metadata"
        );

        CatalogEntry::Resolved(Tile {
            id: discovered.id,
            path: discovered.path,
            stem: discovered.stem,
            ordinal: discovered.ordinal,
            srs,
            version: metadata.version,
        })
    }

    /// Resolve every tile with up to `workers` concurrent queries.
    ///
    /// Entries are returned in discovery order.
    pub async fn resolve_all(
        &self,
        discovered: Vec<DiscoveredTile>,
        engine: Arc<dyn PointCloudEngine>,
        workers: usize,
        progress: &dyn ProgressSink,
    ) -> Vec<CatalogEntry> {
        let total = discovered.len();
        let mut completed = 0;
        progress.update(0, total, METADATA_PHASE);

        let mut entries: Vec<CatalogEntry> = Vec::with_capacity(total);
        let mut results = stream::iter(discovered)
            .map(|tile| {
                let engine = engine.clone();
                async move { self.resolve(tile, engine.as_ref()).await }
            })
            .buffer_unordered(workers.max(1));

        while let Some(entry) = results.next().await {
            completed += 1;
            progress.update(completed, total, METADATA_PHASE);
            entries.push(entry);
        }
        progress.finish(METADATA_PHASE);

        entries.sort_by_key(CatalogEntry::ordinal);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.las", "a.LAS", "c.laz", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.las")).unwrap();

        let tiles = TileCatalog::default().discover(dir.path()).unwrap();
        let stems: Vec<&str> = tiles.iter().map(|t| t.stem.as_str()).collect();
        assert_eq!(stems, vec!["a", "b"]);
        assert_eq!(tiles[1].ordinal, 1);

        let both = TileCatalog::new([".las", "laz"]).discover(dir.path()).unwrap();
        assert_eq!(both.len(), 3);
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            TileCatalog::default().discover(&missing),
            Err(QuickLookError::TileDiscoveryFailed { .. })
        ));
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TileCatalog::default().discover(dir.path()).unwrap().is_empty());
    }
}
