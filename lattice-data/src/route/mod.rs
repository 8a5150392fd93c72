//! Route Data
//!
//! Per-segment data functions and the scheduler that runs them.
//!
//! # Overview
//!
//! The router resolves a URL into a [`SegmentTree`]. Each [`Segment`] may
//! carry a data function, which receives a [`RouteDataContext`] and returns
//! arbitrary route data, usually a struct of Resource Cells. The
//! [`RouteDataScheduler`] invokes these functions parent-first, passes
//! each parent's return value to its children unchanged, and keeps the
//! results mounted for as long as the segment stays matched.
//!
//! # Example
//!
//! ```rust,ignore
//! let tree = SegmentTree::chain([
//!     Segment::new("[house]")
//!         .with_param("house", "gryffindor")
//!         .with_data(|ctx| {
//!             let house = ctx.param("house").unwrap_or_default().to_string();
//!             ctx.create_server_data("house", &get_house, house)
//!         }),
//!     Segment::new("[house]/students")
//!         .with_param("house", "gryffindor")
//!         .with_data(|ctx| {
//!             let house = ctx.parent::<ResourceCell<House>>()?;
//!             ctx.create_route_data("students", move || list_students(house.clone()))
//!         }),
//! ]);
//!
//! let report = scheduler.navigate(Location::parse("/gryffindor/students"), &tree);
//! assert!(report.is_complete());
//! ```

mod context;
mod location;
mod scheduler;
mod segment;

pub use context::RouteDataContext;
pub use location::{Location, NavigateOptions, Navigator, Params};
pub use scheduler::{NavigationReport, RouteDataScheduler, SegmentFailure};
pub use segment::{DataFn, RouteData, Segment, SegmentIndex, SegmentTree};
