//! Route-Data Scheduler
//!
//! The scheduler turns a resolved segment tree into mounted route data.
//!
//! # Algorithm
//!
//! For each navigation:
//!
//! 1. Walk the new tree parent-first and decide which segments are still
//!    mounted: same identity, same parent, and the parent itself kept.
//! 2. Unmount every other segment and evict its cells from the store.
//! 3. Publish the new location.
//! 4. Walk the tree parent-first again. Kept segments contribute their
//!    existing data; newly matched segments get their data function
//!    invoked with a fresh context whose parent data is the parent's
//!    return value.
//!
//! A data function that returns an error leaves its segment unmounted and
//! its subtree skipped; sibling branches still mount, and the failure is
//! listed in the [`NavigationReport`].
//!
//! A data function therefore runs exactly once per successful mount. Each one returns
//! before any descendant's data function is invoked, on server and client
//! alike. Work that continues after it returns lives in Resource Cells,
//! which complete in any order.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use super::context::{ContextParts, ParentData, ParentSlot, RouteDataContext};
use super::location::{Location, Navigator};
use super::segment::{RouteData, SegmentIndex, SegmentTree};
use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::reactive::Signal;
use crate::resource::SegmentId;
use crate::store::RouteDataStore;

#[derive(Clone)]
struct MountedSegment {
    pattern: String,
    depth: usize,
    parent: Option<SegmentId>,
    data: Option<RouteData>,
}

/// A data function that returned an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFailure {
    pub segment: SegmentId,
    pub pattern: String,
    /// Display form of the returned error.
    pub message: String,
}

/// What a navigation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationReport {
    /// Segments whose data function ran, in invocation order.
    pub invoked: Vec<SegmentId>,
    /// Segments kept from the previous navigation.
    pub reused: Vec<SegmentId>,
    /// Segments unmounted, with their cells evicted.
    pub evicted: Vec<SegmentId>,
    /// Segments whose data function failed. They are not mounted.
    pub failed: Vec<SegmentFailure>,
    /// Descendants of failed segments, left unmounted without being invoked.
    pub skipped: Vec<SegmentId>,
}

impl NavigationReport {
    /// Whether every matched segment is mounted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Invokes data functions for matched segments and keeps their results.
pub struct RouteDataScheduler {
    config: LoaderConfig,
    store: RouteDataStore,
    location: Signal<Location>,
    navigator: Navigator,
    mounted: IndexMap<SegmentId, MountedSegment>,
}

impl RouteDataScheduler {
    /// A scheduler with nothing mounted.
    pub fn new(config: LoaderConfig, store: RouteDataStore) -> Self {
        Self {
            config,
            store,
            location: Signal::new(Location::default()),
            navigator: Navigator::noop(),
            mounted: IndexMap::new(),
        }
    }

    /// Route `navigate` calls from data functions to the router.
    pub fn with_navigator(mut self, navigator: Navigator) -> Self {
        self.navigator = navigator;
        self
    }

    /// Loader settings in effect.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Store holding the mounted segments' cells.
    pub fn store(&self) -> &RouteDataStore {
        &self.store
    }

    /// The live location signal shared with every context.
    pub fn location(&self) -> &Signal<Location> {
        &self.location
    }

    /// Apply a navigation to `location`, whose matched segments are `tree`.
    ///
    /// The location is always published. A segment whose data function
    /// fails is reported in [`NavigationReport::failed`] and its subtree in
    /// [`NavigationReport::skipped`]; the rest of the tree mounts normally.
    pub fn navigate(&mut self, location: Location, tree: &SegmentTree) -> NavigationReport {
        let order = tree.walk();
        let kept = self.kept_segments(tree, &order);
        let mut report = NavigationReport::default();

        let stale: Vec<SegmentId> = self
            .mounted
            .keys()
            .filter(|id| !kept.contains(*id))
            .copied()
            .collect();
        for id in stale {
            if let Some(segment) = self.mounted.shift_remove(&id) {
                let removed = self.store.evict(id);
                tracing::debug!(%id, pattern = %segment.pattern, removed, "unmounted segment");
            }
            report.evicted.push(id);
        }

        self.location.set_if_changed(location);

        let mut slots: HashMap<SegmentIndex, ParentSlot> = HashMap::with_capacity(order.len());
        let mut unmounted: HashSet<SegmentIndex> = HashSet::new();
        for index in order {
            let (Some(segment), Some(id), Some(depth)) =
                (tree.segment(index), tree.id(index), tree.depth(index))
            else {
                continue;
            };
            let slot: ParentSlot = Arc::new(OnceLock::new());

            if kept.contains(&id) {
                let data = self.mounted.get(&id).and_then(|m| m.data.clone());
                let _ = slot.set(data);
                slots.insert(index, slot);
                report.reused.push(id);
                continue;
            }

            let parent_index = tree.parent(index);
            if parent_index.is_some_and(|p| unmounted.contains(&p)) {
                unmounted.insert(index);
                report.skipped.push(id);
                continue;
            }
            let parent_id = parent_index.and_then(|p| tree.id(p));
            let parent = match (parent_index, parent_id) {
                (Some(p), Some(parent_id)) => ParentData::Parent {
                    segment: parent_id,
                    slot: slots.get(&p).cloned().unwrap_or_default(),
                },
                _ => ParentData::Root,
            };

            let data = match segment.data_fn() {
                Some(data_fn) => {
                    let ctx = RouteDataContext::new(ContextParts {
                        segment: id,
                        pattern: segment.pattern().to_string(),
                        depth,
                        params: segment.params().clone(),
                        location_signal: self.location.clone(),
                        navigator: self.navigator.clone(),
                        parent,
                        store: self.store.clone(),
                        strict_ordering: self.config.strict_ordering,
                    });
                    tracing::debug!(
                        %id,
                        pattern = %segment.pattern(),
                        depth,
                        "invoking data function"
                    );
                    match data_fn(&ctx) {
                        Ok(data) => Some(data),
                        Err(err) => {
                            tracing::error!(
                                %id,
                                pattern = %segment.pattern(),
                                error = %err,
                                "data function failed; skipping its subtree"
                            );
                            // Cells created before the error belong to no mount.
                            self.store.evict(id);
                            unmounted.insert(index);
                            report.failed.push(SegmentFailure {
                                segment: id,
                                pattern: segment.pattern().to_string(),
                                message: err.to_string(),
                            });
                            continue;
                        }
                    }
                }
                None => None,
            };

            let _ = slot.set(data.clone());
            slots.insert(index, slot);
            self.mounted.insert(
                id,
                MountedSegment {
                    pattern: segment.pattern().to_string(),
                    depth,
                    parent: parent_id,
                    data,
                },
            );
            report.invoked.push(id);
        }

        tracing::info!(
            location = %self.location.with(|l| l.to_string()),
            invoked = report.invoked.len(),
            reused = report.reused.len(),
            evicted = report.evicted.len(),
            failed = report.failed.len(),
            "navigation resolved"
        );
        report
    }

    /// Segments of `tree` that can keep their mounted data.
    fn kept_segments(&self, tree: &SegmentTree, order: &[SegmentIndex]) -> HashSet<SegmentId> {
        let mut kept = HashSet::new();
        for &index in order {
            let Some(id) = tree.id(index) else {
                continue;
            };
            let parent_id = tree.parent(index).and_then(|p| tree.id(p));
            let parent_kept = parent_id.map(|p| kept.contains(&p)).unwrap_or(true);
            let same_mount = self
                .mounted
                .get(&id)
                .map(|m| m.parent == parent_id)
                .unwrap_or(false);
            if parent_kept && same_mount {
                kept.insert(id);
            }
        }
        kept
    }

    /// The mounted data of `segment`, exactly as its data function returned it.
    pub fn route_data(&self, segment: SegmentId) -> Option<RouteData> {
        self.mounted.get(&segment).and_then(|m| m.data.clone())
    }

    /// Typed access to a segment's route data.
    pub fn use_route_data<T: Send + Sync + 'static>(&self, segment: SegmentId) -> Result<Arc<T>> {
        let data = self.route_data(segment).ok_or_else(|| Error::SegmentNotMounted {
            segment: segment.to_string(),
        })?;
        data.downcast::<T>().map_err(|_| Error::RouteDataType {
            segment: segment.to_string(),
        })
    }

    /// Whether `segment` currently has route data.
    pub fn is_mounted(&self, segment: SegmentId) -> bool {
        self.mounted.contains_key(&segment)
    }

    /// Mounted segments with their depth, in mount order.
    pub fn mounted(&self) -> Vec<(SegmentId, usize)> {
        self.mounted.iter().map(|(id, m)| (*id, m.depth)).collect()
    }
}

impl std::fmt::Debug for RouteDataScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDataScheduler")
            .field("environment", &self.config.environment)
            .field("mounted", &self.mounted.len())
            .field("store", &self.store)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Segment;
    use parking_lot::Mutex;

    fn scheduler() -> RouteDataScheduler {
        RouteDataScheduler::new(LoaderConfig::default(), RouteDataStore::new())
    }

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Segment {
        let log = log.clone();
        Segment::new(name).with_data(move |_ctx| {
            log.lock().push(name);
            Ok(name)
        })
    }

    #[test]
    fn invokes_parent_first_in_three_level_tree() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tree = SegmentTree::chain([
            recording("a", &log),
            recording("b", &log),
            recording("c", &log),
        ]);

        let report = scheduler().navigate(Location::parse("/a/b/c"), &tree);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(report.invoked.len(), 3);
    }

    #[test]
    fn child_sees_parent_return_value() {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let tree = SegmentTree::chain([
            Segment::new("parent").with_data(|_ctx| Ok(vec![1u32, 2, 3])),
            Segment::new("child").with_data(move |ctx| {
                let parent = ctx.parent::<Vec<u32>>()?;
                *seen_clone.lock() = Some(parent.clone());
                Ok(parent.len())
            }),
        ]);

        let mut scheduler = scheduler();
        scheduler.navigate(Location::parse("/"), &tree);

        let parent_id = tree.id(tree.find("parent").unwrap()).unwrap();
        let child_id = tree.id(tree.find("child").unwrap()).unwrap();
        let mounted = scheduler.use_route_data::<Vec<u32>>(parent_id).unwrap();
        let observed = seen.lock().clone().unwrap();
        assert!(Arc::ptr_eq(&mounted, &observed));
        assert_eq!(*scheduler.use_route_data::<usize>(child_id).unwrap(), 3);
    }

    #[test]
    fn segment_without_data_fn_gives_children_no_parent_data() {
        let tree = SegmentTree::chain([
            Segment::new("layout"),
            Segment::new("leaf").with_data(|ctx| Ok(ctx.parent_data()?.is_none())),
        ]);
        let mut scheduler = scheduler();
        scheduler.navigate(Location::parse("/"), &tree);
        let leaf = tree.id(tree.find("leaf").unwrap()).unwrap();
        assert!(*scheduler.use_route_data::<bool>(leaf).unwrap());
    }

    #[test]
    fn kept_segment_is_not_reinvoked() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = scheduler();

        let first = SegmentTree::chain([recording("layout", &log), recording("one", &log)]);
        let second = SegmentTree::chain([recording("layout", &log), recording("two", &log)]);

        scheduler.navigate(Location::parse("/one"), &first);
        let report = scheduler.navigate(Location::parse("/two"), &second);

        assert_eq!(*log.lock(), vec!["layout", "one", "two"]);
        assert_eq!(report.reused.len(), 1);
        assert_eq!(report.invoked.len(), 1);
        assert_eq!(report.evicted, vec![tree_id(&first, "one")]);
    }

    #[test]
    fn remounted_parent_remounts_children() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = scheduler();

        let house = |name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>| {
            let log = log.clone();
            Segment::new("[house]")
                .with_param("house", name)
                .with_data(move |_| {
                    log.lock().push(name);
                    Ok(())
                })
        };

        let first = SegmentTree::chain([house("gryffindor", &log), recording("about", &log)]);
        let second = SegmentTree::chain([house("slytherin", &log), recording("about", &log)]);

        scheduler.navigate(Location::parse("/gryffindor/about"), &first);
        let report = scheduler.navigate(Location::parse("/slytherin/about"), &second);

        assert_eq!(*log.lock(), vec!["gryffindor", "about", "slytherin", "about"]);
        assert_eq!(report.evicted.len(), 2);
        assert!(report.reused.is_empty());
    }

    #[test]
    fn data_fn_error_skips_only_its_subtree() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = SegmentTree::new();
        let root = tree.add(None, recording("root", &log));
        let bad = tree.add(
            Some(root),
            Segment::new("bad").with_data(|ctx| {
                ctx.create_route_data("orphan", || async { Ok(1u8) })?;
                ctx.parent::<u8>()
            }),
        );
        tree.add(Some(bad), recording("under-bad", &log));
        tree.add(Some(root), recording("sibling", &log));

        let mut scheduler = scheduler();
        let report = scheduler.navigate(Location::parse("/x"), &tree);

        assert_eq!(*log.lock(), vec!["root", "sibling"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].pattern, "bad");
        assert!(report.failed[0].message.contains("different type"));
        assert_eq!(report.skipped, vec![tree_id(&tree, "under-bad")]);
        assert!(!report.is_complete());
        assert!(scheduler.is_mounted(tree_id(&tree, "sibling")));
        assert!(scheduler.store().is_empty());
        assert!(!scheduler.is_mounted(tree_id(&tree, "bad")));
        assert_eq!(scheduler.location().get().pathname, "/x");
    }

    #[test]
    fn failed_segment_is_retried_on_next_navigation() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();
        let tree = SegmentTree::chain([Segment::new("flaky").with_data(move |_| {
            let mut n = counter.lock();
            *n += 1;
            if *n == 1 {
                Err(Error::NoParentData { segment: "flaky".into() })
            } else {
                Ok(*n)
            }
        })]);

        let mut scheduler = scheduler();
        assert_eq!(scheduler.navigate(Location::parse("/a"), &tree).failed.len(), 1);
        let report = scheduler.navigate(Location::parse("/a"), &tree);
        assert!(report.is_complete());
        assert_eq!(report.invoked, vec![tree_id(&tree, "flaky")]);
        assert_eq!(*attempts.lock(), 2);
    }

    #[test]
    fn location_is_published_before_data_functions_run() {
        let tree = SegmentTree::chain([
            Segment::new("page").with_data(|ctx| Ok(ctx.location().pathname.clone())),
        ]);
        let mut scheduler = scheduler();
        scheduler.navigate(Location::parse("/staff?x=1"), &tree);
        assert_eq!(scheduler.location().get().search, "?x=1");
        let id = tree_id(&tree, "page");
        assert_eq!(*scheduler.use_route_data::<String>(id).unwrap(), "/staff");
    }

    #[test]
    fn unmounted_segment_lookup_fails() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.use_route_data::<u8>(SegmentId::from(5)),
            Err(Error::SegmentNotMounted { .. })
        ));
    }

    fn tree_id(tree: &SegmentTree, pattern: &str) -> SegmentId {
        tree.id(tree.find(pattern).unwrap()).unwrap()
    }
}
