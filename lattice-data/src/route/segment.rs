//! Segment Tree
//!
//! The routing layer resolves a URL into a tree of matched segments: one
//! node per layout or leaf, each with its path pattern, its resolved params
//! and optionally a data function. This module is the shape the scheduler
//! consumes; building it from the file system is the router's business.
//!
//! Nodes live in an arena and refer to their parent by index, so a parent
//! reference is lookup only and never ownership.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use super::context::RouteDataContext;
use super::location::Params;
use crate::error::Result;
use crate::resource::SegmentId;

/// The value a data function returns, passed by identity to child segments
/// and to `use_route_data`.
pub type RouteData = Arc<dyn Any + Send + Sync>;

/// A segment's data function.
pub type DataFn = Arc<dyn Fn(&RouteDataContext) -> Result<RouteData> + Send + Sync>;

/// Index of a node in a [`SegmentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentIndex(usize);

/// A matched segment, as supplied by the router.
#[derive(Clone)]
pub struct Segment {
    pattern: String,
    params: Params,
    data_fn: Option<DataFn>,
}

impl Segment {
    /// A segment without data function or parameters.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            params: Params::new(),
            data_fn: None,
        }
    }

    /// Add one matched parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Replace the matched parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Attach a data function. Whatever it returns becomes this segment's
    /// route data.
    pub fn with_data<T, F>(mut self, data_fn: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&RouteDataContext) -> Result<T> + Send + Sync + 'static,
    {
        self.data_fn = Some(Arc::new(move |ctx: &RouteDataContext| {
            data_fn(ctx).map(|data| Arc::new(data) as RouteData)
        }));
        self
    }

    /// Route pattern, e.g. `[house]/students`.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Matched parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Whether a data function is attached.
    pub fn has_data_fn(&self) -> bool {
        self.data_fn.is_some()
    }

    pub(crate) fn data_fn(&self) -> Option<&DataFn> {
        self.data_fn.as_ref()
    }

    /// Stable identity of this segment instance.
    pub fn id(&self) -> SegmentId {
        SegmentId::derive(&self.pattern, &self.params)
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .field("has_data_fn", &self.data_fn.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct SegmentNode {
    segment: Segment,
    id: SegmentId,
    depth: usize,
    parent: Option<SegmentIndex>,
    children: Vec<SegmentIndex>,
}

/// The matched segments for one navigation.
#[derive(Debug, Clone, Default)]
pub struct SegmentTree {
    nodes: Vec<SegmentNode>,
}

impl SegmentTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a single chain of nested segments, outermost first.
    pub fn chain(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut tree = Self::new();
        let mut parent = None;
        for segment in segments {
            parent = Some(tree.add(parent, segment));
        }
        tree
    }

    /// Add a segment under `parent` (or as a root) and return its index.
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not belong to this tree.
    pub fn add(&mut self, parent: Option<SegmentIndex>, segment: Segment) -> SegmentIndex {
        let index = SegmentIndex(self.nodes.len());
        let depth = match parent {
            Some(p) => {
                let parent_node = &mut self.nodes[p.0];
                parent_node.children.push(index);
                parent_node.depth + 1
            }
            None => 0,
        };
        let id = segment.id();
        self.nodes.push(SegmentNode {
            segment,
            id,
            depth,
            parent,
            children: Vec::new(),
        });
        index
    }

    /// Segment at `index`.
    pub fn segment(&self, index: SegmentIndex) -> Option<&Segment> {
        self.nodes.get(index.0).map(|node| &node.segment)
    }

    /// Id of the segment at `index`.
    pub fn id(&self, index: SegmentIndex) -> Option<SegmentId> {
        self.nodes.get(index.0).map(|node| node.id)
    }

    /// Depth of `index`, the root being zero.
    pub fn depth(&self, index: SegmentIndex) -> Option<usize> {
        self.nodes.get(index.0).map(|node| node.depth)
    }

    /// Parent of `index`; `None` for a root.
    pub fn parent(&self, index: SegmentIndex) -> Option<SegmentIndex> {
        self.nodes.get(index.0).and_then(|node| node.parent)
    }

    /// Children of `index` in insertion order.
    pub fn children(&self, index: SegmentIndex) -> &[SegmentIndex] {
        self.nodes
            .get(index.0)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Find the first node with the given pattern.
    pub fn find(&self, pattern: &str) -> Option<SegmentIndex> {
        self.nodes
            .iter()
            .position(|node| node.segment.pattern == pattern)
            .map(SegmentIndex)
    }

    /// Identities of every node, in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.nodes.iter().map(|node| node.id)
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in parent-first order.
    ///
    /// Breadth-first from the roots: every ancestor precedes all of its
    /// descendants, and siblings keep their insertion order.
    pub fn walk(&self) -> Vec<SegmentIndex> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue: VecDeque<SegmentIndex> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(i, _)| SegmentIndex(i))
            .collect();

        while let Some(index) = queue.pop_front() {
            order.push(index);
            queue.extend(self.nodes[index.0].children.iter().copied());
        }

        order
    }
}
