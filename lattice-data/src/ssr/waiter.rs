//! Server Render Waiter
//!
//! Renders a page on the server until every cell read inside a suspending
//! boundary has settled, then captures the store as a [`Snapshot`].
//!
//! Each pass runs the render function inside a fresh read-tracking scope.
//! Pending cells read inside a boundary are awaited together and the page
//! is rendered again, since a settled cell can reveal further reads. Cells
//! read outside any boundary, or never read, do not hold the response back;
//! they are serialized as pending and fetched again on the client.

use std::collections::HashSet;

use futures_util::future::join_all;

use super::snapshot::Snapshot;
use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::reactive::ReactiveContext;
use crate::resource::{CellHandle, CellState};
use crate::store::RouteDataStore;

/// Final render of a page plus the state to ship with it.
#[derive(Debug, Clone)]
pub struct RenderOutput<R> {
    pub output: R,
    pub snapshot: Snapshot,
    /// Render passes taken, at least one.
    pub passes: usize,
    script_id: String,
}

impl<R> RenderOutput<R> {
    /// The snapshot as the script element embedded in the document.
    pub fn script_tag(&self) -> Result<String> {
        self.snapshot.to_script_tag(&self.script_id)
    }
}

/// Drives server renders against one request's store.
#[derive(Debug, Clone)]
pub struct ServerWaiter {
    store: RouteDataStore,
    config: LoaderConfig,
}

impl ServerWaiter {
    /// A waiter rendering against `store`.
    pub fn new(store: RouteDataStore, config: LoaderConfig) -> Self {
        Self { store, config }
    }

    /// The request's store.
    pub fn store(&self) -> &RouteDataStore {
        &self.store
    }

    /// Render until no boundary read is pending.
    ///
    /// Fails with [`Error::RenderDidNotSettle`] when reads are still
    /// pending after `max_render_passes` passes.
    pub async fn render<R>(&self, mut render: impl FnMut() -> R) -> Result<RenderOutput<R>> {
        let limit = self.config.max_render_passes.max(1);

        for pass in 1..=limit {
            let (output, reads) = ReactiveContext::observe(&mut render);

            let mut seen = HashSet::new();
            let blocking: Vec<CellHandle> = reads
                .into_iter()
                .filter(|read| read.in_boundary && read.state == CellState::Pending)
                .filter(|read| seen.insert(read.key().clone()))
                .map(|read| read.cell)
                .collect();

            if blocking.is_empty() {
                let snapshot = self.store.snapshot()?;
                tracing::debug!(passes = pass, cells = snapshot.len(), "server render settled");
                return Ok(RenderOutput {
                    output,
                    snapshot,
                    passes: pass,
                    script_id: self.config.snapshot_script_id.clone(),
                });
            }

            tracing::trace!(pass, waiting = blocking.len(), "awaiting boundary reads");
            let states = join_all(blocking.iter().map(CellHandle::settled)).await;
            let failed = states.iter().filter(|s| **s == CellState::Errored).count();
            if failed > 0 {
                tracing::debug!(pass, failed, "boundary reads settled with errors");
            }
        }

        tracing::warn!(passes = limit, "server render did not settle");
        Err(Error::RenderDidNotSettle { passes: limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::resource::{CellKey, Outcome, ReadError, SegmentId};
    use crate::ssr::SnapshotState;

    fn waiter(passes: usize) -> ServerWaiter {
        let config = LoaderConfig::new(Environment::Server).with_max_render_passes(passes);
        ServerWaiter::new(RouteDataStore::new(), config)
    }

    fn key(disc: &str) -> CellKey {
        CellKey::new(SegmentId::from(7), disc)
    }

    #[tokio::test]
    async fn waits_for_boundary_reads() {
        let waiter = waiter(4);
        let cell = waiter
            .store()
            .get_or_create(key("house"), || async { Ok("Gryffindor".to_string()) })
            .unwrap();

        let rendered = waiter
            .render(|| {
                ReactiveContext::boundary(|| match cell.read() {
                    Ok(house) => format!("<h1>{house}</h1>"),
                    Err(ReadError::Suspended(_)) => "<p>loading</p>".to_string(),
                    Err(ReadError::Failed(err)) => err.to_string(),
                })
            })
            .await
            .unwrap();

        assert_eq!(rendered.output, "<h1>Gryffindor</h1>");
        assert_eq!(rendered.passes, 2);
        assert_eq!(rendered.snapshot.len(), 1);
        assert_eq!(rendered.snapshot.entries()[0].state, SnapshotState::Ready);
        assert!(rendered.script_tag().unwrap().contains(r#"id="__route_data""#));
    }

    #[tokio::test]
    async fn reads_outside_boundaries_do_not_block() {
        let waiter = waiter(4);
        let cell = waiter
            .store()
            .get_or_create(key("slow"), futures_util::future::pending::<Outcome<u8>>)
            .unwrap();
        let _unread = waiter
            .store()
            .get_or_create(key("unread"), || async { Ok(1u8) })
            .unwrap();

        let rendered = waiter.render(|| cell.read().is_ok()).await.unwrap();
        assert!(!rendered.output);
        assert_eq!(rendered.passes, 1);
        assert!(rendered
            .snapshot
            .entries()
            .iter()
            .all(|entry| entry.state == SnapshotState::Pending));
    }

    #[tokio::test]
    async fn errors_settle_the_boundary() {
        let waiter = waiter(4);
        let cell = waiter
            .store()
            .get_or_create(key("broken"), || async { Err::<u8, _>("vault locked".into()) })
            .unwrap();

        let rendered = waiter
            .render(|| {
                ReactiveContext::boundary(|| matches!(cell.read(), Err(ReadError::Failed(_))))
            })
            .await
            .unwrap();
        assert!(rendered.output);
        assert_eq!(rendered.snapshot.entries()[0].state, SnapshotState::Errored);
    }

    #[tokio::test]
    async fn gives_up_after_pass_limit() {
        let waiter = waiter(3);
        let store = waiter.store().clone();
        let mut created = 0u32;

        // Every pass reveals a new pending cell.
        let result = waiter
            .render(|| {
                created += 1;
                let cell = store
                    .get_or_create(key(&format!("chain-{created}")), || async { Ok(0u8) })
                    .unwrap();
                ReactiveContext::boundary(|| cell.read().is_ok())
            })
            .await;

        assert!(matches!(result, Err(Error::RenderDidNotSettle { passes: 3 })));
    }
}
