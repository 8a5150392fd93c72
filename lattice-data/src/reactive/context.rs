//! Read Tracking
//!
//! A render pass runs inside a [`ReactiveContext`]. Every Resource Cell read
//! while the context is active is recorded together with whether the read
//! happened inside a suspending boundary. The server waiter uses these
//! records to decide which cells it must await before the response is
//! finalized.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per active render scope. Boundaries
//! are a depth counter on the innermost entry, so nested boundaries and
//! nested scopes both work. Reads are recorded synchronously: cells are read
//! from synchronous render code, so a scope never spans an await point.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::SubscriberId;
use crate::resource::{CellHandle, CellKey, CellState};

thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeEntry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug)]
struct ScopeEntry {
    subscriber_id: SubscriberId,
    boundary_depth: usize,
    reads: SmallVec<[TrackedRead; 8]>,
}

/// One cell read observed during a render scope.
#[derive(Debug, Clone)]
pub struct TrackedRead {
    /// The cell that was read.
    pub cell: CellHandle,
    /// State of the cell at the time of the read.
    pub state: CellState,
    /// Whether the read happened inside a suspending boundary.
    pub in_boundary: bool,
}

impl TrackedRead {
    /// Key of the cell that was read.
    pub fn key(&self) -> &CellKey {
        self.cell.key()
    }
}

/// Guard for an active render scope. Pops the scope when dropped.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new render scope for the given subscriber.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(ScopeEntry {
                subscriber_id,
                boundary_depth: 0,
                reads: SmallVec::new(),
            });
        });

        Self { subscriber_id }
    }

    /// Run `f` inside a fresh scope and return its output with every read it made.
    pub fn observe<R>(f: impl FnOnce() -> R) -> (R, Vec<TrackedRead>) {
        let _ctx = Self::enter(SubscriberId::new());
        let output = f();
        (output, Self::take_reads())
    }

    /// Whether a tracking scope is open on this thread.
    pub fn is_active() -> bool {
        SCOPE_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Subscriber of the innermost open scope.
    pub fn current_subscriber() -> Option<SubscriberId> {
        SCOPE_STACK.with(|stack| stack.borrow().last().map(|entry| entry.subscriber_id))
    }

    /// Run `f` inside a suspending boundary of the current scope.
    ///
    /// Outside any scope this simply runs `f`.
    pub fn boundary<R>(f: impl FnOnce() -> R) -> R {
        let _guard = BoundaryGuard::enter();
        f()
    }

    /// Whether the innermost scope is currently inside a boundary.
    pub fn in_boundary() -> bool {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.boundary_depth > 0)
                .unwrap_or(false)
        })
    }

    /// Record a read of `cell` in the innermost scope.
    pub(crate) fn track_read(cell: CellHandle, state: CellState) {
        SCOPE_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                let in_boundary = entry.boundary_depth > 0;
                entry.reads.push(TrackedRead {
                    cell,
                    state,
                    in_boundary,
                });
            }
        });
    }

    /// Drain the reads recorded so far in the innermost scope.
    pub fn take_reads() -> Vec<TrackedRead> {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| entry.reads.drain(..).collect())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

struct BoundaryGuard {
    active: bool,
}

impl BoundaryGuard {
    fn enter() -> Self {
        let active = SCOPE_STACK.with(|stack| match stack.borrow_mut().last_mut() {
            Some(entry) => {
                entry.boundary_depth += 1;
                true
            }
            None => false,
        });
        Self { active }
    }
}

impl Drop for BoundaryGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        SCOPE_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                entry.boundary_depth = entry.boundary_depth.saturating_sub(1);
            }
        });
    }
}
