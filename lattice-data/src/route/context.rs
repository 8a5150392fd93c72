//! Route-Data Context
//!
//! The immutable value a data function receives: where the user is, how to
//! navigate, the segment's params, its parent's data, and the store in
//! which to create cells. The context is the only way a data function
//! reaches router or store state; nothing is ambient.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use super::location::{Location, NavigateOptions, Navigator, Params};
use super::segment::RouteData;
use crate::bridge::ServerFn;
use crate::error::{Error, Result};
use crate::reactive::Signal;
use crate::resource::{CellKey, CellValue, Outcome, ResourceCell, SegmentId};
use crate::store::RouteDataStore;

/// Slot holding a parent segment's data once its data function returned.
///
/// `None` inside a filled slot means the parent has no data function.
pub(crate) type ParentSlot = Arc<OnceLock<Option<RouteData>>>;

#[derive(Clone)]
pub(crate) enum ParentData {
    Root,
    Parent { segment: SegmentId, slot: ParentSlot },
}

struct ContextInner {
    segment: SegmentId,
    pattern: String,
    depth: usize,
    params: Params,
    location: Location,
    location_signal: Signal<Location>,
    navigator: Navigator,
    parent: ParentData,
    store: RouteDataStore,
    strict_ordering: bool,
}

/// Input of a data function.
#[derive(Clone)]
pub struct RouteDataContext {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextParts {
    pub segment: SegmentId,
    pub pattern: String,
    pub depth: usize,
    pub params: Params,
    pub location_signal: Signal<Location>,
    pub navigator: Navigator,
    pub parent: ParentData,
    pub store: RouteDataStore,
    pub strict_ordering: bool,
}

impl RouteDataContext {
    pub(crate) fn new(parts: ContextParts) -> Self {
        let location = parts.location_signal.get();
        Self {
            inner: Arc::new(ContextInner {
                segment: parts.segment,
                pattern: parts.pattern,
                depth: parts.depth,
                params: parts.params,
                location,
                location_signal: parts.location_signal,
                navigator: parts.navigator,
                parent: parts.parent,
                store: parts.store,
                strict_ordering: parts.strict_ordering,
            }),
        }
    }

    /// The location at the time the data function was invoked.
    pub fn location(&self) -> &Location {
        &self.inner.location
    }

    /// The live location. Cells that must follow later navigations
    /// subscribe to it with `ResourceCell::refetch_on`.
    pub fn location_signal(&self) -> &Signal<Location> {
        &self.inner.location_signal
    }

    /// Ask the router to navigate elsewhere.
    pub fn navigate(&self, to: &str, options: NavigateOptions) {
        self.inner.navigator.navigate(to, options);
    }

    /// Parameters matched for this segment.
    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    /// A single matched parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name)
    }

    /// Id of the segment being loaded.
    pub fn segment(&self) -> SegmentId {
        self.inner.segment
    }

    /// Route pattern of the segment being loaded.
    pub fn pattern(&self) -> &str {
        &self.inner.pattern
    }

    /// Distance from the root segment.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Store the segment's cells live in.
    pub fn store(&self) -> &RouteDataStore {
        &self.inner.store
    }

    /// The parent's route data: `None` at the root or when the parent has
    /// no data function.
    ///
    /// Reading it before the parent's data function has returned is an
    /// ordering violation; with strict ordering enabled that panics.
    pub fn parent_data(&self) -> Result<Option<RouteData>> {
        match &self.inner.parent {
            ParentData::Root => Ok(None),
            ParentData::Parent { segment, slot } => match slot.get() {
                Some(data) => Ok(data.clone()),
                None => {
                    tracing::error!(
                        segment = %self.inner.segment,
                        parent = %segment,
                        "parent data read before parent data function completed"
                    );
                    if self.inner.strict_ordering {
                        panic!(
                            "segment {} read parent data before segment {} finished loading",
                            self.inner.segment, segment
                        );
                    }
                    Err(Error::OrderingViolation {
                        segment: self.inner.segment.to_string(),
                    })
                }
            },
        }
    }

    /// The parent's route data, downcast to `T`. Identity is preserved: the
    /// returned `Arc` is the one the parent's data function produced.
    pub fn parent<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let data = self.parent_data()?.ok_or_else(|| Error::NoParentData {
            segment: self.inner.segment.to_string(),
        })?;
        data.downcast::<T>().map_err(|_| Error::ParentDataType {
            segment: self.inner.segment.to_string(),
        })
    }

    /// Create (or reuse) a cell owned by this segment.
    pub fn create_route_data<T, F, Fut>(
        &self,
        discriminator: &str,
        source: F,
    ) -> Result<ResourceCell<T>>
    where
        T: CellValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        let key = CellKey::new(self.inner.segment, discriminator);
        self.inner.store.get_or_create(key, source)
    }

    /// Create (or reuse) a cell whose source is a server function call.
    pub fn create_server_data<A, R>(
        &self,
        discriminator: &str,
        server_fn: &ServerFn<A, R>,
        args: A,
    ) -> Result<ResourceCell<R>>
    where
        A: CellValue,
        R: CellValue,
    {
        let server_fn = server_fn.clone();
        self.create_route_data(discriminator, move || server_fn.call(args.clone()))
    }
}

impl std::fmt::Debug for RouteDataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDataContext")
            .field("segment", &self.inner.segment)
            .field("pattern", &self.inner.pattern)
            .field("depth", &self.inner.depth)
            .field("params", &self.inner.params)
            .field("location", &self.inner.location)
            .finish()
    }
}
