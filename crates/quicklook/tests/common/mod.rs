//! Scripted engine for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use point_engine::{ClassSet, EngineError, EngineResult, GridJob, PointCloudEngine, TileMetadata};
use raster_common::RasterBuffer;

/// What the engine does when asked to rasterize a tile.
#[derive(Debug, Clone)]
pub enum Script {
    Raster(RasterBuffer),
    Empty,
    Fail(String),
    Panic,
}

#[derive(Debug, Clone)]
pub struct MockTile {
    /// `None` makes the metadata query fail.
    pub version: Option<String>,
    pub srs: Option<String>,
    pub script: Script,
    pub delay: Duration,
}

impl MockTile {
    pub fn raster(raster: RasterBuffer) -> Self {
        Self::with_script(Script::Raster(raster))
    }

    pub fn empty() -> Self {
        Self::with_script(Script::Empty)
    }

    pub fn failing(message: &str) -> Self {
        Self::with_script(Script::Fail(message.to_string()))
    }

    pub fn panicking() -> Self {
        Self::with_script(Script::Panic)
    }

    fn with_script(script: Script) -> Self {
        Self {
            version: Some("1.4".to_string()),
            srs: Some("EPSG:6347".to_string()),
            script,
            delay: Duration::ZERO,
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.version = None;
        self
    }

    pub fn srs(mut self, srs: Option<&str>) -> Self {
        self.srs = srs.map(str::to_string);
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }
}

/// Engine answering from a per-stem script and recording every call.
#[derive(Debug, Default)]
pub struct MockEngine {
    tiles: HashMap<String, MockTile>,
    calls: Mutex<Vec<(String, ClassSet)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tile(mut self, stem: &str, tile: MockTile) -> Self {
        self.tiles.insert(stem.to_string(), tile);
        self
    }

    /// Create an empty `<stem>.las` file for every scripted tile.
    pub fn materialize(&self, dir: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .tiles
            .keys()
            .map(|stem| {
                let path = dir.join(format!("{}.las", stem));
                std::fs::write(&path, b"").unwrap();
                path
            })
            .collect();
        paths.sort();
        paths
    }

    /// `(stem, classes)` of every rasterize call, in call order.
    pub fn calls(&self) -> Vec<(String, ClassSet)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_stems(&self) -> Vec<String> {
        let mut stems: Vec<String> = self.calls().into_iter().map(|(s, _)| s).collect();
        stems.sort();
        stems
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lookup(&self, path: &Path) -> EngineResult<(String, MockTile)> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tile = self
            .tiles
            .get(&stem)
            .cloned()
            .ok_or_else(|| EngineError::read(path, "no such scripted tile"))?;
        Ok((stem, tile))
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PointCloudEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn query_metadata(&self, path: &Path) -> EngineResult<TileMetadata> {
        let (_, tile) = self.lookup(path)?;
        match tile.version {
            Some(version) => Ok(TileMetadata {
                version,
                srs: tile.srs,
                point_count: 0,
                bounds: None,
            }),
            None => Err(EngineError::invalid_metadata(path, "header unreadable")),
        }
    }

    async fn rasterize(&self, job: &GridJob) -> EngineResult<Option<RasterBuffer>> {
        let (stem, tile) = self.lookup(&job.input)?;
        self.calls
            .lock()
            .unwrap()
            .push((stem.clone(), job.classes.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !tile.delay.is_zero() {
            tokio::time::sleep(tile.delay).await;
        }

        match tile.script {
            Script::Raster(raster) => Ok(Some(raster)),
            Script::Empty => Ok(None),
            Script::Fail(message) => Err(EngineError::ProcessFailed {
                program: "mock".to_string(),
                status: "exit status: 1".to_string(),
                stderr: message,
            }),
            Script::Panic => panic!("engine crashed on {}", stem),
        }
    }
}
