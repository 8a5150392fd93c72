//! Reactive Primitives
//!
//! The small slice of reactivity the data-loading lifecycle needs from the
//! rendering side:
//!
//! - [`ReactiveContext`] records which Resource Cells a render scope reads
//!   and whether each read happened inside a suspending boundary.
//! - [`Signal`] is an observable value. The scheduler publishes the current
//!   location through one, and cells can refetch when it changes.
//!
//! # Suspension
//!
//! Reading a pending cell does not block. The read returns a
//! `ReadError::Suspended` carrying a [`Suspense`](crate::resource::Suspense)
//! handle; the render layer parks that branch and resumes it once the
//! handle's future resolves. Suspension is control flow, not failure.

mod context;
mod signal;
mod subscriber;

pub use context::{ReactiveContext, TrackedRead};
pub use signal::Signal;
pub use subscriber::SubscriberId;
