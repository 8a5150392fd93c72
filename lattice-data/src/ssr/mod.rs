//! Server Rendering Support
//!
//! [`ServerWaiter`] renders a page until its boundary reads have settled
//! and captures the store as a [`Snapshot`]. The snapshot travels to the
//! client inside the document and seeds the client's store through
//! [`RouteDataStore::hydrate`](crate::store::RouteDataStore::hydrate).

mod snapshot;
mod waiter;

pub use snapshot::{Snapshot, SnapshotEntry, SnapshotState};
pub use waiter::{RenderOutput, ServerWaiter};
