//! Resource Cells
//!
//! A [`ResourceCell`] is the asynchronous value container at the centre of
//! the data-loading lifecycle. Data functions create cells through the
//! store, render code reads them, the server waiter awaits them and the
//! client hydrates them from the server's snapshot.
//!
//! Cells are addressed by a [`CellKey`]: the [`SegmentId`] of the segment
//! instance that owns them plus a discriminator.

mod cell;
mod handle;
mod key;

pub use cell::{CellState, CellValue, Outcome, ReadError, ResourceCell, Suspense};
pub use handle::CellHandle;
pub use key::{CellKey, SegmentId};
