//! Server-side registry of server functions.
//!
//! The HTTP layer hands every request arriving on a server-function
//! endpoint to [`ServerFnRegistry::handle`]; the registry decodes the
//! arguments, runs the function and encodes the outcome.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::codec::{ServerCallRequest, ServerCallResponse};
use crate::error::{Error, ResourceError, Result};
use crate::resource::Outcome;

type Handler =
    Arc<dyn Fn(ServerCallRequest) -> BoxFuture<'static, ServerCallResponse> + Send + Sync>;

/// Identifier → handler map. Clones share the same map.
#[derive(Clone, Default)]
pub struct ServerFnRegistry {
    handlers: Arc<DashMap<String, Handler>>,
}

impl ServerFnRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `id`. Fails if the identifier is taken.
    pub fn register<A, R, F, Fut>(&self, id: &str, f: F) -> Result<()>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<R>> + Send + 'static,
    {
        let f = Arc::new(f);
        let name: Arc<str> = Arc::from(id);
        let handler: Handler = Arc::new(move |request: ServerCallRequest| {
            let f = Arc::clone(&f);
            let name = Arc::clone(&name);
            async move {
                let codec = request.codec;
                let args: A = match codec.decode(&request.args) {
                    Ok(args) => args,
                    Err(err) => {
                        tracing::warn!(
                            id = %name,
                            error = %err,
                            "undecodable server call arguments"
                        );
                        return ServerCallResponse::Failure(ResourceError::new(format!(
                            "invalid arguments for {}: {}",
                            name, err
                        )));
                    }
                };
                match f(args).await {
                    Ok(value) => match codec.encode(&value) {
                        Ok(bytes) => ServerCallResponse::Success(bytes),
                        Err(err) => ServerCallResponse::Failure(err.into()),
                    },
                    Err(err) => ServerCallResponse::Failure(err),
                }
            }
            .boxed()
        });

        match self.handlers.entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::DuplicateServerFn(id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handler);
                tracing::debug!(%id, "registered server function");
                Ok(())
            }
        }
    }

    /// Whether a handler is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch a request to its handler.
    pub fn handle(&self, request: ServerCallRequest) -> BoxFuture<'static, ServerCallResponse> {
        // Clone the handler out so no map guard lives across the await.
        let handler = self.handlers.get(&request.id).map(|entry| Arc::clone(entry.value()));
        match handler {
            Some(handler) => {
                tracing::debug!(id = %request.id, "dispatching server call");
                handler(request)
            }
            None => {
                tracing::warn!(id = %request.id, "call to unknown server function");
                let failure =
                    ServerCallResponse::Failure(Error::UnknownServerFn(request.id).into());
                async move { failure }.boxed()
            }
        }
    }
}

impl std::fmt::Debug for ServerFnRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerFnRegistry")
            .field("functions", &self.handlers.len())
            .finish()
    }
}
