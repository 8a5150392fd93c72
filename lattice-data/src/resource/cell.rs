//! Resource Cell Implementation
//!
//! A Resource Cell holds one asynchronously produced value.
//!
//! # State Machine
//!
//! ```text
//!             start / read                commit(ok)
//!   Pending ───────────────▶ (in flight) ────────────▶ Ready
//!      ▲                          │       commit(err)
//!      │                          └──────────────────▶ Errored
//!      │            refetch                               │
//!      └──────────────────────────────────────────────────┘
//! ```
//!
//! Every execution of the source function is tagged with the generation
//! counter at the time it was launched. A result is committed only while
//! its generation is still current; [`ResourceCell::refetch`],
//! [`ResourceCell::hydrate`] and [`ResourceCell::mutate`] bump the
//! generation, so a slower superseded execution can never overwrite newer
//! state.
//!
//! # Execution
//!
//! The in-flight execution is a shared future. Whoever awaits the cell
//! (the server waiter, a refetch caller, a parked render branch) drives the
//! same execution; nothing is spawned behind the caller's back. The only
//! exception is [`ResourceCell::refetch_on`], which spawns onto the current
//! tokio runtime when a signal fires.

use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::handle::CellHandle;
use super::key::CellKey;
use crate::error::{ResourceError, Result};
use crate::reactive::{ReactiveContext, Signal, SubscriberId};
use crate::ssr::{SnapshotEntry, SnapshotState};

/// Values a Resource Cell can hold.
///
/// Values must serialize so they can be shipped from server render to
/// client hydration.
pub trait CellValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CellValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Lifecycle state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellState {
    Pending,
    Ready,
    Errored,
}

/// Outcome of one source execution.
pub type Outcome<T> = std::result::Result<T, ResourceError>;

type SourceFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Outcome<T>> + Send + Sync>;
type InFlight<T> = Shared<BoxFuture<'static, Outcome<T>>>;
type Listener = Arc<dyn Fn(CellState) + Send + Sync>;

/// Why a read did not produce a value.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The cell is pending; the caller must park until the handle settles.
    #[error("cell {} is pending", .0.key())]
    Suspended(Suspense),

    /// The source function failed.
    #[error(transparent)]
    Failed(#[from] ResourceError),
}

impl ReadError {
    /// Whether the read hit a pending cell.
    pub fn is_suspended(&self) -> bool {
        matches!(self, ReadError::Suspended(_))
    }
}

/// Suspension signal returned by reading a pending cell.
#[derive(Debug, Clone)]
pub struct Suspense {
    cell: CellHandle,
}

impl Suspense {
    /// Key of the pending cell.
    pub fn key(&self) -> &CellKey {
        self.cell.key()
    }

    /// Resolves once the cell has left `Pending`.
    pub fn settled(&self) -> BoxFuture<'static, CellState> {
        self.cell.settled()
    }
}

struct Slot<T> {
    state: CellState,
    /// Last committed outcome. Survives a refetch until the new result lands.
    value: Option<Outcome<T>>,
    generation: u64,
    in_flight: Option<(u64, InFlight<T>)>,
    hydrated: bool,
}

struct CellInner<T> {
    key: CellKey,
    source: SourceFn<T>,
    slot: Mutex<Slot<T>>,
    listeners: RwLock<Vec<(SubscriberId, Listener)>>,
}

/// A single asynchronous value with `pending | ready | errored` states.
///
/// Clones are handles to the same cell.
///
/// ```rust,ignore
/// let cell = ResourceCell::new(key, || async { Ok(fetch_students().await) });
/// match cell.read() {
///     Ok(students) => render(students),
///     Err(ReadError::Suspended(suspense)) => park(suspense.settled()),
///     Err(ReadError::Failed(err)) => show_error(err),
/// }
/// ```
pub struct ResourceCell<T: CellValue> {
    inner: Arc<CellInner<T>>,
}

impl<T: CellValue> ResourceCell<T> {
    /// Create a pending cell. The source does not run until the cell is
    /// read, started, awaited or refetched.
    pub fn new<F, Fut>(key: CellKey, source: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        let source: SourceFn<T> = Arc::new(move || source().boxed());
        Self {
            inner: Arc::new(CellInner {
                key,
                source,
                slot: Mutex::new(Slot {
                    state: CellState::Pending,
                    value: None,
                    generation: 0,
                    in_flight: None,
                    hydrated: false,
                }),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Store key of this cell.
    pub fn key(&self) -> &CellKey {
        &self.inner.key
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CellState {
        self.inner.slot.lock().state
    }

    /// Counter bumped by every launch, hydration or mutation.
    pub fn generation(&self) -> u64 {
        self.inner.slot.lock().generation
    }

    /// Whether the current value was adopted from a snapshot.
    pub fn is_hydrated(&self) -> bool {
        self.inner.slot.lock().hydrated
    }

    /// Whether a source execution is currently in flight.
    pub fn is_loading(&self) -> bool {
        self.inner.slot.lock().in_flight.is_some()
    }

    /// Type-erased handle to this cell.
    pub fn handle(&self) -> CellHandle {
        CellHandle::new(self.clone())
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read the cell from render code.
    ///
    /// The read is recorded with the active render scope. A pending cell is
    /// started and a [`Suspense`] is returned so the caller can park.
    pub fn read(&self) -> std::result::Result<T, ReadError> {
        let (state, value) = {
            let slot = self.inner.slot.lock();
            (slot.state, slot.value.clone())
        };
        ReactiveContext::track_read(self.handle(), state);

        match (state, value) {
            (CellState::Ready, Some(Ok(value))) => Ok(value),
            (CellState::Errored, Some(Err(err))) => Err(ReadError::Failed(err)),
            _ => {
                self.start();
                Err(ReadError::Suspended(Suspense {
                    cell: self.handle(),
                }))
            }
        }
    }

    /// Last committed outcome, without tracking or starting anything.
    ///
    /// While a refetch is in flight this still returns the previous result.
    pub fn peek(&self) -> Option<Outcome<T>> {
        self.inner.slot.lock().value.clone()
    }

    /// Launch the source function unless the cell has settled or is
    /// already loading.
    pub fn start(&self) {
        {
            let slot = self.inner.slot.lock();
            if slot.state != CellState::Pending || slot.in_flight.is_some() {
                return;
            }
        }
        self.launch();
    }

    /// Resolves once the cell has left `Pending`, driving the in-flight
    /// execution (and starting one if needed).
    pub fn settled(&self) -> impl Future<Output = CellState> + Send + 'static {
        let this = self.clone();
        async move {
            loop {
                let next = {
                    let slot = this.inner.slot.lock();
                    if slot.state != CellState::Pending {
                        return slot.state;
                    }
                    slot.in_flight.clone()
                };

                match next {
                    Some((generation, execution)) => {
                        let outcome = execution.await;
                        this.commit(generation, outcome);
                    }
                    None => this.start(),
                }
            }
        }
    }

    /// Re-run the source function.
    ///
    /// The generation is bumped and the source invoked before this method
    /// returns. The returned future commits the result only if no newer
    /// refetch, hydration or mutation happened meanwhile, and yields the
    /// cell's state afterwards.
    pub fn refetch(&self) -> impl Future<Output = CellState> + Send + 'static {
        let (generation, execution) = self.launch();
        let this = self.clone();
        async move {
            let outcome = execution.await;
            this.commit(generation, outcome);
            this.state()
        }
    }

    /// Adopt the state carried by a snapshot entry.
    ///
    /// Ignored when the cell already has a committed value or the entry is
    /// still pending. Any in-flight execution is superseded. Returns whether
    /// the entry was adopted.
    pub fn hydrate(&self, entry: &SnapshotEntry) -> Result<bool> {
        if self.inner.slot.lock().value.is_some() {
            return Ok(false);
        }

        let outcome: Outcome<T> = match entry.state {
            SnapshotState::Pending => return Ok(false),
            SnapshotState::Ready => Ok(serde_json::from_value(entry.payload.clone())?),
            SnapshotState::Errored => Err(serde_json::from_value(entry.payload.clone())?),
        };

        let state = {
            let mut slot = self.inner.slot.lock();
            if slot.value.is_some() {
                return Ok(false);
            }
            if slot.in_flight.take().is_some() {
                tracing::debug!(key = %self.inner.key, "snapshot supersedes in-flight fetch");
            }
            slot.generation += 1;
            slot.state = state_of(&outcome);
            slot.value = Some(outcome);
            slot.hydrated = true;
            slot.state
        };

        tracing::debug!(key = %self.inner.key, ?state, "hydrated cell from snapshot");
        self.notify(state);
        Ok(true)
    }

    /// Overwrite the value locally, superseding any in-flight execution.
    pub fn mutate(&self, value: T) {
        {
            let mut slot = self.inner.slot.lock();
            slot.generation += 1;
            slot.in_flight = None;
            slot.state = CellState::Ready;
            slot.value = Some(Ok(value));
        }
        tracing::debug!(key = %self.inner.key, "cell mutated locally");
        self.notify(CellState::Ready);
    }

    /// Serialize the current state into a snapshot entry.
    pub fn snapshot_entry(&self) -> Result<SnapshotEntry> {
        let slot = self.inner.slot.lock();
        let key = self.inner.key.to_string();
        match (slot.state, &slot.value) {
            (CellState::Ready, Some(Ok(value))) => {
                Ok(SnapshotEntry::ready(key, serde_json::to_value(value)?))
            }
            (CellState::Errored, Some(Err(err))) => {
                Ok(SnapshotEntry::errored(key, serde_json::to_value(err)?))
            }
            _ => Ok(SnapshotEntry::pending(key)),
        }
    }

    /// Register a listener called on every state transition.
    pub fn subscribe(&self, listener: impl Fn(CellState) + Send + Sync + 'static) -> SubscriberId {
        let id = SubscriberId::new();
        self.inner.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener added by [`ResourceCell::subscribe`].
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.listeners.write().retain(|(sub, _)| *sub != id);
    }

    /// Refetch whenever `signal` changes.
    ///
    /// Neither the subscription nor the spawned commit holds a strong
    /// reference, so an evicted cell is still freed; the listener then
    /// removes itself on the signal's next change. With a tokio runtime
    /// available the commit is spawned; otherwise the source is launched
    /// and committed by the next party awaiting the cell.
    pub fn refetch_on<S>(&self, signal: &Signal<S>) -> SubscriberId
    where
        S: Clone + Send + Sync + 'static,
    {
        let weak: Weak<CellInner<T>> = Arc::downgrade(&self.inner);
        signal.subscribe_while(move |_| {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let cell = ResourceCell { inner };
            let (generation, execution) = cell.launch();
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let weak = weak.clone();
                    runtime.spawn(async move {
                        let outcome = execution.await;
                        if let Some(inner) = weak.upgrade() {
                            ResourceCell { inner }.commit(generation, outcome);
                        }
                    });
                }
                Err(_) => {
                    tracing::debug!(
                        key = %cell.key(),
                        "no runtime; refetch left for the next reader"
                    );
                }
            }
            true
        })
    }

    fn launch(&self) -> (u64, InFlight<T>) {
        let (generation, was_settled) = {
            let mut slot = self.inner.slot.lock();
            slot.generation += 1;
            slot.in_flight = None;
            let was_settled = slot.state != CellState::Pending;
            slot.state = CellState::Pending;
            (slot.generation, was_settled)
        };
        if was_settled {
            self.notify(CellState::Pending);
        }

        // The source runs outside the lock; its synchronous part may touch
        // this cell again.
        let execution = (self.inner.source)().shared();

        {
            let mut slot = self.inner.slot.lock();
            if slot.generation == generation {
                slot.in_flight = Some((generation, execution.clone()));
            }
        }
        tracing::debug!(key = %self.inner.key, generation, "launched source");

        (generation, execution)
    }

    fn commit(&self, generation: u64, outcome: Outcome<T>) -> bool {
        let state = {
            let mut slot = self.inner.slot.lock();
            match &slot.in_flight {
                Some((current, _)) if *current == generation => {}
                _ => {
                    if slot.generation != generation {
                        tracing::debug!(
                            key = %self.inner.key,
                            generation,
                            current = slot.generation,
                            "discarding superseded result"
                        );
                    }
                    return false;
                }
            }
            slot.in_flight = None;
            slot.state = state_of(&outcome);
            slot.value = Some(outcome);
            slot.hydrated = false;
            slot.state
        };

        if state == CellState::Errored {
            tracing::warn!(key = %self.inner.key, generation, "source function failed");
        } else {
            tracing::debug!(key = %self.inner.key, generation, "committed result");
        }
        self.notify(state);
        true
    }

    fn notify(&self, state: CellState) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }
}

fn state_of<T>(outcome: &Outcome<T>) -> CellState {
    match outcome {
        Ok(_) => CellState::Ready,
        Err(_) => CellState::Errored,
    }
}

impl<T: CellValue> Clone for ResourceCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CellValue> Debug for ResourceCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.inner.slot.lock();
        f.debug_struct("ResourceCell")
            .field("key", &self.inner.key)
            .field("state", &slot.state)
            .field("generation", &slot.generation)
            .field("loading", &slot.in_flight.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
