//! Lattice Data
//!
//! This crate provides the route-data lifecycle for server-rendered Lattice
//! applications. It implements:
//!
//! - Resource Cells: asynchronous values with pending, ready and errored states
//! - A keyed store that deduplicates cells and hydrates them from a snapshot
//! - Per-segment data functions run parent-first on every navigation
//! - Server functions callable from both builds through one declaration
//! - A server render waiter that serializes settled state for the client
//!
//! The same crate is compiled for the server and the client; the
//! [`LoaderConfig`] environment decides which side a process plays.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `resource`: Resource Cells, their keys and type-erased handles
//! - `store`: the per-request (server) or per-page (client) cell store
//! - `route`: segments, the data-function context and the scheduler
//! - `bridge`: server function declaration, codecs and transports
//! - `ssr`: snapshots and the server render waiter
//! - `reactive`: read tracking and signals
//!
//! # Example
//!
//! ```rust
//! use lattice_data::{
//!     Environment, LoaderConfig, Location, RouteDataScheduler, RouteDataStore,
//!     ResourceCell, Segment, SegmentTree, ServerWaiter,
//! };
//! use lattice_data::reactive::ReactiveContext;
//!
//! # tokio_test_block(async {
//! let config = LoaderConfig::new(Environment::Server);
//! let store = RouteDataStore::new();
//! let mut scheduler = RouteDataScheduler::new(config.clone(), store.clone());
//!
//! let tree = SegmentTree::chain([Segment::new("houses").with_data(|ctx| {
//!     ctx.create_route_data("list", || async { Ok(vec!["Gryffindor".to_string()]) })
//! })]);
//! let report = scheduler.navigate(Location::parse("/houses"), &tree);
//! let houses = scheduler
//!     .use_route_data::<ResourceCell<Vec<String>>>(report.invoked[0])
//!     .unwrap();
//!
//! let page = ServerWaiter::new(store, config)
//!     .render(|| ReactiveContext::boundary(|| houses.read().map(|h| h.len()).unwrap_or(0)))
//!     .await
//!     .unwrap();
//! assert_eq!(page.output, 1);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod reactive;
pub mod resource;
pub mod route;
pub mod ssr;
pub mod store;

pub use bridge::{Bridge, Codec, ServerFn, ServerFnRegistry};
pub use config::{Environment, LoaderConfig};
pub use error::{Error, ResourceError, Result};
pub use logging::init_logging;
pub use resource::{CellKey, CellState, Outcome, ReadError, ResourceCell, SegmentId};
pub use route::{Location, RouteDataContext, RouteDataScheduler, Segment, SegmentTree};
pub use ssr::{ServerWaiter, Snapshot};
pub use store::RouteDataStore;
