//! Type-erased cell handle.
//!
//! The store, the read tracker and the server waiter deal with cells of
//! many value types at once. They hold a [`CellHandle`], which exposes the
//! parts of a cell that do not depend on its value type and can be turned
//! back into a typed [`ResourceCell`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::cell::{CellState, CellValue, ResourceCell};
use super::key::CellKey;
use crate::error::Result;
use crate::ssr::SnapshotEntry;

trait ErasedCell: Send + Sync + 'static {
    fn key(&self) -> &CellKey;
    fn state(&self) -> CellState;
    fn generation(&self) -> u64;
    fn settled(&self) -> BoxFuture<'static, CellState>;
    fn refetch(&self) -> BoxFuture<'static, CellState>;
    fn snapshot_entry(&self) -> Result<SnapshotEntry>;
    fn hydrate(&self, entry: &SnapshotEntry) -> Result<bool>;
    fn as_any(&self) -> &dyn Any;
    fn value_type(&self) -> &'static str;
}

impl<T: CellValue> ErasedCell for ResourceCell<T> {
    fn key(&self) -> &CellKey {
        ResourceCell::key(self)
    }

    fn state(&self) -> CellState {
        ResourceCell::state(self)
    }

    fn generation(&self) -> u64 {
        ResourceCell::generation(self)
    }

    fn settled(&self) -> BoxFuture<'static, CellState> {
        ResourceCell::settled(self).boxed()
    }

    fn refetch(&self) -> BoxFuture<'static, CellState> {
        ResourceCell::refetch(self).boxed()
    }

    fn snapshot_entry(&self) -> Result<SnapshotEntry> {
        ResourceCell::snapshot_entry(self)
    }

    fn hydrate(&self, entry: &SnapshotEntry) -> Result<bool> {
        ResourceCell::hydrate(self, entry)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A Resource Cell with its value type erased.
#[derive(Clone)]
pub struct CellHandle(Arc<dyn ErasedCell>);

impl CellHandle {
    pub(crate) fn new<T: CellValue>(cell: ResourceCell<T>) -> Self {
        Self(Arc::new(cell))
    }

    /// See [`ResourceCell::key`].
    pub fn key(&self) -> &CellKey {
        self.0.key()
    }

    /// See [`ResourceCell::state`].
    pub fn state(&self) -> CellState {
        self.0.state()
    }

    /// See [`ResourceCell::generation`].
    pub fn generation(&self) -> u64 {
        self.0.generation()
    }

    /// See [`ResourceCell::settled`].
    pub fn settled(&self) -> BoxFuture<'static, CellState> {
        self.0.settled()
    }

    /// See [`ResourceCell::refetch`].
    pub fn refetch(&self) -> BoxFuture<'static, CellState> {
        self.0.refetch()
    }

    /// See [`ResourceCell::snapshot_entry`].
    pub fn snapshot_entry(&self) -> Result<SnapshotEntry> {
        self.0.snapshot_entry()
    }

    /// See [`ResourceCell::hydrate`].
    pub fn hydrate(&self, entry: &SnapshotEntry) -> Result<bool> {
        self.0.hydrate(entry)
    }

    /// Recover the typed cell, if it holds values of type `T`.
    pub fn downcast<T: CellValue>(&self) -> Option<ResourceCell<T>> {
        self.0.as_any().downcast_ref::<ResourceCell<T>>().cloned()
    }

    /// Name of the value type, for diagnostics.
    pub fn value_type(&self) -> &'static str {
        self.0.value_type()
    }
}

impl fmt::Debug for CellHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellHandle")
            .field("key", self.key())
            .field("state", &self.state())
            .field("value_type", &self.value_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::SegmentId;

    #[test]
    fn downcast_recovers_same_cell() {
        let cell: ResourceCell<String> =
            ResourceCell::new(CellKey::new(SegmentId::from(1), "name"), || async {
                Ok("Harry".to_string())
            });
        let handle = cell.handle();

        let typed = handle.downcast::<String>().unwrap();
        assert!(typed.ptr_eq(&cell));
        assert!(handle.downcast::<u32>().is_none());
        assert!(handle.value_type().contains("String"));
    }

    #[tokio::test]
    async fn erased_settled_drives_the_cell() {
        let cell: ResourceCell<u8> =
            ResourceCell::new(CellKey::new(SegmentId::from(2), "n"), || async { Ok(3) });
        let handle = cell.handle();

        assert_eq!(handle.settled().await, CellState::Ready);
        assert_eq!(cell.read().unwrap(), 3);
        assert_eq!(handle.generation(), 1);
    }
}
