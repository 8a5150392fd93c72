//! Client-side transport seam.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::codec::{ServerCallRequest, ServerCallResponse};
use super::registry::ServerFnRegistry;
use crate::error::ResourceError;

/// Carries server calls from the client to the server's endpoint.
///
/// Implementations wrap an HTTP client in the browser build. An `Err` means
/// the call never produced a response; it surfaces to the reader of the
/// cell the same way a failing function does.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        endpoint: String,
        request: ServerCallRequest,
    ) -> BoxFuture<'static, std::result::Result<ServerCallResponse, ResourceError>>;
}

/// In-process transport dispatching straight into a [`ServerFnRegistry`].
///
/// Requests and responses still pass through their wire encoding, so a
/// payload that would not survive the network fails here too.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    registry: ServerFnRegistry,
    calls: Arc<AtomicUsize>,
}

impl LoopbackTransport {
    /// Dispatch straight into `registry`.
    pub fn new(registry: ServerFnRegistry) -> Self {
        Self {
            registry,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of requests sent so far, across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for LoopbackTransport {
    fn send(
        &self,
        endpoint: String,
        request: ServerCallRequest,
    ) -> BoxFuture<'static, std::result::Result<ServerCallResponse, ResourceError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(%endpoint, "loopback server call");

        let codec = request.codec;
        let registry = self.registry.clone();
        async move {
            let wire = serde_json::to_vec(&request).map_err(|e| ResourceError::new(e.to_string()))?;
            let request: ServerCallRequest =
                serde_json::from_slice(&wire).map_err(|e| ResourceError::new(e.to_string()))?;
            let response = registry.handle(request).await;
            let body = codec.encode(&response).map_err(ResourceError::from)?;
            codec.decode(&body).map_err(ResourceError::from)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Codec;

    #[tokio::test]
    async fn loopback_dispatches_and_counts() {
        let registry = ServerFnRegistry::new();
        registry.register("len", |s: String| async move { Ok(s.len()) }).unwrap();
        let transport = LoopbackTransport::new(registry);

        let request = ServerCallRequest {
            id: "len".into(),
            codec: Codec::MsgPack,
            args: Codec::MsgPack.encode("Luna").unwrap(),
        };
        let endpoint = request.endpoint("/_server");
        let response = transport.clone().send(endpoint, request).await.unwrap();

        match response {
            ServerCallResponse::Success(bytes) => {
                assert_eq!(Codec::MsgPack.decode::<usize>(&bytes).unwrap(), 4)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(transport.call_count(), 1);
    }
}
