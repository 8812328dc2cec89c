//! Concurrent, write-once store of per-tile rasters.

use std::collections::HashMap;

use raster_common::RasterBuffer;
use tokio::sync::Mutex;

use crate::catalog::TileId;
use crate::error::{QuickLookError, Result};

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<TileId, (usize, RasterBuffer)>,
    frozen: bool,
}

/// Key to raster map shared by all workers of a batch.
///
/// Each key is written at most once. [`freeze`](Self::freeze) hands the
/// contents to the assembler and rejects any later write.
#[derive(Debug, Default)]
pub struct ResultStore {
    state: Mutex<StoreState>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the raster of one tile.
    ///
    /// `ordinal` is the tile's discovery position and fixes its place in the
    /// frozen list.
    pub async fn insert(&self, id: TileId, ordinal: usize, raster: RasterBuffer) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.frozen {
            return Err(QuickLookError::StoreFrozen);
        }
        if state.entries.contains_key(&id) {
            return Err(QuickLookError::DuplicateResult(id));
        }
        state.entries.insert(id, (ordinal, raster));
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: &TileId) -> bool {
        self.state.lock().await.entries.contains_key(id)
    }

    /// Close the store and take its rasters, ordered by discovery ordinal.
    pub async fn freeze(&self) -> Vec<RasterBuffer> {
        let mut state = self.state.lock().await;
        state.frozen = true;
        let mut entries: Vec<(usize, RasterBuffer)> = state.entries.drain().map(|(_, e)| e).collect();
        entries.sort_by_key(|(ordinal, _)| *ordinal);
        entries.into_iter().map(|(_, raster)| raster).collect()
    }
}
