//! Keyed Route-Data Store
//!
//! The store owns every live Resource Cell, keyed by [`CellKey`]. Data
//! functions obtain cells through [`RouteDataStore::get_or_create`], so a
//! segment that stays matched across navigations keeps its cells and their
//! values. When a segment stops matching, [`RouteDataStore::evict`] drops
//! its entries; render code may still hold clones of an evicted cell, but
//! the store no longer hands it out.
//!
//! On the client the store is also where hydration happens: the server's
//! snapshot is stashed with [`RouteDataStore::hydrate`] before any data
//! function runs, and each entry is claimed by the first `get_or_create`
//! for its key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::resource::{CellHandle, CellValue, Outcome, ResourceCell};
use crate::ssr::{Snapshot, SnapshotEntry};

pub use crate::resource::{CellKey, SegmentId};

#[derive(Default)]
struct StoreInner {
    /// Live cells in creation order.
    cells: RwLock<IndexMap<CellKey, CellHandle>>,
    /// Snapshot entries not yet claimed by a cell.
    hydration: Mutex<HashMap<String, SnapshotEntry>>,
}

/// Shared map from cell keys to Resource Cells.
///
/// Clones share the same map.
#[derive(Clone, Default)]
pub struct RouteDataStore {
    inner: Arc<StoreInner>,
}

impl RouteDataStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cell stored under `key`, creating it from `source` if
    /// there is none.
    ///
    /// A freshly created cell adopts the matching snapshot entry, if one
    /// was stashed. Fails when `key` holds a cell of another value type.
    pub fn get_or_create<T, F, Fut>(&self, key: CellKey, source: F) -> Result<ResourceCell<T>>
    where
        T: CellValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        let cell = {
            let mut cells = self.inner.cells.write();
            if let Some(existing) = cells.get(&key) {
                return existing.downcast::<T>().ok_or_else(|| Error::CellTypeMismatch {
                    key: key.to_string(),
                });
            }
            let cell = ResourceCell::new(key.clone(), source);
            cells.insert(key.clone(), cell.handle());
            cell
        };
        tracing::debug!(key = %key, "created cell");

        self.claim_snapshot(&cell.handle());
        Ok(cell)
    }

    /// Typed lookup without creating anything.
    pub fn get<T: CellValue>(&self, key: &CellKey) -> Result<Option<ResourceCell<T>>> {
        match self.inner.cells.read().get(key) {
            None => Ok(None),
            Some(handle) => handle
                .downcast::<T>()
                .map(Some)
                .ok_or_else(|| Error::CellTypeMismatch {
                    key: key.to_string(),
                }),
        }
    }

    /// Type-erased handle to the cell under `key`.
    pub fn handle(&self, key: &CellKey) -> Option<CellHandle> {
        self.inner.cells.read().get(key).cloned()
    }

    /// Whether a cell exists under `key`.
    pub fn contains(&self, key: &CellKey) -> bool {
        self.inner.cells.read().contains_key(key)
    }

    /// Refetch every cell whose key matches `predicate`.
    ///
    /// All refetches are launched before this returns; the future resolves
    /// with the number of cells refetched once they have all completed.
    pub fn invalidate(
        &self,
        predicate: impl Fn(&CellKey) -> bool,
    ) -> impl Future<Output = usize> + Send + 'static {
        let matching: Vec<CellHandle> = self
            .inner
            .cells
            .read()
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(_, handle)| handle.clone())
            .collect();

        tracing::debug!(count = matching.len(), "invalidating cells");
        let refetches: Vec<_> = matching.iter().map(CellHandle::refetch).collect();
        async move { join_all(refetches).await.len() }
    }

    /// Refetch every cell owned by `segment`.
    pub fn invalidate_segment(
        &self,
        segment: SegmentId,
    ) -> impl Future<Output = usize> + Send + 'static {
        self.invalidate(move |key| key.segment() == segment)
    }

    /// Drop every cell owned by `segment`, along with any unclaimed snapshot
    /// entries for it. Returns the number of cells removed.
    pub fn evict(&self, segment: SegmentId) -> usize {
        let removed = {
            let mut cells = self.inner.cells.write();
            let before = cells.len();
            cells.retain(|key, _| key.segment() != segment);
            before - cells.len()
        };

        self.inner.hydration.lock().retain(|key, _| {
            CellKey::parse(key).map(|k| k.segment() != segment).unwrap_or(true)
        });

        tracing::debug!(%segment, removed, "evicted segment cells");
        removed
    }

    /// Stash a server snapshot for hydration.
    ///
    /// Entries for cells that already exist are applied immediately; the
    /// rest wait for the first `get_or_create` of their key.
    pub fn hydrate(&self, snapshot: Snapshot) {
        let mut stashed = 0usize;
        for entry in snapshot {
            let existing = CellKey::parse(&entry.key).and_then(|key| self.handle(&key));
            match existing {
                Some(handle) => apply_entry(&handle, &entry),
                None => {
                    self.inner.hydration.lock().insert(entry.key.clone(), entry);
                    stashed += 1;
                }
            }
        }
        tracing::debug!(stashed, "stashed snapshot entries");
    }

    /// End the hydration phase.
    ///
    /// Entries nobody claimed are discarded and their keys returned. A
    /// mismatch is not an error: the cell that would have used the entry
    /// simply fetches.
    pub fn finish_hydration(&self) -> Vec<String> {
        let unclaimed: Vec<String> =
            self.inner.hydration.lock().drain().map(|(key, _)| key).collect();
        for key in &unclaimed {
            tracing::debug!(%key, "snapshot entry never claimed");
        }
        unclaimed
    }

    /// Number of snapshot entries still waiting to be claimed.
    pub fn pending_hydration(&self) -> usize {
        self.inner.hydration.lock().len()
    }

    /// Serialize every cell, in creation order, in its current state.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let handles: Vec<CellHandle> = self.inner.cells.read().values().cloned().collect();
        handles.iter().map(CellHandle::snapshot_entry).collect()
    }

    /// Keys of every live cell.
    pub fn keys(&self) -> Vec<CellKey> {
        self.inner.cells.read().keys().cloned().collect()
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.inner.cells.read().len()
    }

    /// Whether the store holds no cell.
    pub fn is_empty(&self) -> bool {
        self.inner.cells.read().is_empty()
    }

    fn claim_snapshot(&self, handle: &CellHandle) {
        let entry = self.inner.hydration.lock().remove(&handle.key().to_string());
        if let Some(entry) = entry {
            apply_entry(handle, &entry);
        }
    }
}

fn apply_entry(handle: &CellHandle, entry: &SnapshotEntry) {
    match handle.hydrate(entry) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(key = %entry.key, state = ?entry.state, "snapshot entry not adopted");
        }
        Err(err) => {
            // Treated as a cache miss: the cell fetches normally.
            tracing::warn!(key = %entry.key, error = %err, "snapshot entry does not fit cell");
        }
    }
}

impl std::fmt::Debug for RouteDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDataStore")
            .field("cells", &self.len())
            .field("pending_hydration", &self.pending_hydration())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
