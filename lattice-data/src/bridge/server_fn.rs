//! Callable server-function handles.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::codec::{Codec, ServerCallRequest, ServerCallResponse};
use super::transport::Transport;
use crate::config::Environment;
use crate::error::ResourceError;
use crate::resource::Outcome;

type LocalFn<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, Outcome<R>> + Send + Sync>;

enum Invoke<A, R> {
    Local(LocalFn<A, R>),
    Remote {
        transport: Arc<dyn Transport>,
        codec: Codec,
        endpoint_prefix: Arc<str>,
    },
}

/// A function that always executes on the server.
///
/// On the server, [`call`](ServerFn::call) runs the body in-process. On the
/// client it encodes the arguments, sends them to the function's endpoint
/// and decodes the reply. Either way the caller sees an [`Outcome`].
pub struct ServerFn<A, R> {
    id: Arc<str>,
    invoke: Arc<Invoke<A, R>>,
    _types: PhantomData<fn(A) -> R>,
}

impl<A, R> Clone for ServerFn<A, R> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            invoke: Arc::clone(&self.invoke),
            _types: PhantomData,
        }
    }
}

impl<A, R> ServerFn<A, R>
where
    A: Serialize + Send + 'static,
    R: DeserializeOwned + Send + 'static,
{
    pub(crate) fn local<F, Fut>(id: &str, f: Arc<F>) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<R>> + Send + 'static,
    {
        let local: LocalFn<A, R> = Arc::new(move |args| f(args).boxed());
        Self {
            id: Arc::from(id),
            invoke: Arc::new(Invoke::Local(local)),
            _types: PhantomData,
        }
    }

    pub(crate) fn remote(
        id: &str,
        transport: Arc<dyn Transport>,
        codec: Codec,
        endpoint_prefix: &str,
    ) -> Self {
        Self {
            id: Arc::from(id),
            invoke: Arc::new(Invoke::Remote {
                transport,
                codec,
                endpoint_prefix: Arc::from(endpoint_prefix),
            }),
            _types: PhantomData,
        }
    }

    /// The stable identifier both builds agree on.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Where this handle executes its calls from.
    pub fn environment(&self) -> Environment {
        match *self.invoke {
            Invoke::Local(_) => Environment::Server,
            Invoke::Remote { .. } => Environment::Client,
        }
    }

    /// Invoke the function.
    pub fn call(&self, args: A) -> BoxFuture<'static, Outcome<R>> {
        match &*self.invoke {
            Invoke::Local(f) => f(args),
            Invoke::Remote {
                transport,
                codec,
                endpoint_prefix,
            } => {
                let codec = *codec;
                let request = match codec.encode(&args) {
                    Ok(bytes) => ServerCallRequest {
                        id: self.id.to_string(),
                        codec,
                        args: bytes,
                    },
                    Err(err) => {
                        let err = ResourceError::from(err);
                        return async move { Err(err) }.boxed();
                    }
                };
                let endpoint = request.endpoint(endpoint_prefix);
                tracing::debug!(id = %self.id, %endpoint, "remote server call");
                let sent = transport.send(endpoint, request);
                async move {
                    match sent.await? {
                        ServerCallResponse::Success(bytes) => {
                            codec.decode(&bytes).map_err(ResourceError::from)
                        }
                        ServerCallResponse::Failure(err) => Err(err),
                    }
                }
                .boxed()
            }
        }
    }
}

impl<A, R> fmt::Debug for ServerFn<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match *self.invoke {
            Invoke::Local(_) => "local",
            Invoke::Remote { .. } => "remote",
        };
        f.debug_struct("ServerFn")
            .field("id", &self.id)
            .field("mode", &mode)
            .finish()
    }
}
