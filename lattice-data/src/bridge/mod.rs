//! Server-Function Bridge
//!
//! Declares functions whose body only ever runs on the server. The same
//! declaration, compiled for both builds, yields a [`ServerFn`] handle:
//!
//! - a server [`Bridge`] registers the body in a [`ServerFnRegistry`] under
//!   a stable identifier and calls it in-process;
//! - a client [`Bridge`] drops the body and sends calls to the generated
//!   endpoint through a [`Transport`].
//!
//! ```
//! use lattice_data::bridge::{Bridge, ServerFnRegistry};
//! use lattice_data::{server_fn_id, LoaderConfig, Environment};
//!
//! let config = LoaderConfig::new(Environment::Server);
//! let bridge = Bridge::server(ServerFnRegistry::new(), &config);
//! let students = bridge
//!     .define(server_fn_id!(students), |house: String| async move {
//!         Ok(vec![format!("{house} student")])
//!     })
//!     .unwrap();
//! assert!(students.id().ends_with("::students"));
//! ```

mod codec;
mod registry;
mod server_fn;
mod transport;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use codec::{Codec, ServerCallRequest, ServerCallResponse};
pub use registry::ServerFnRegistry;
pub use server_fn::ServerFn;
pub use transport::{LoopbackTransport, Transport};

use crate::config::{Environment, LoaderConfig};
use crate::error::Result;
use crate::resource::Outcome;

/// Stable identifier for a server function: the enclosing module path
/// joined with the function's name. Identical in both builds.
#[macro_export]
macro_rules! server_fn_id {
    ($name:ident) => {
        concat!(module_path!(), "::", stringify!($name))
    };
}

#[derive(Clone)]
enum Side {
    Server(ServerFnRegistry),
    Client(Arc<dyn Transport>),
}

/// Per-build factory for server functions.
#[derive(Clone)]
pub struct Bridge {
    side: Side,
    codec: Codec,
    endpoint_prefix: String,
}

impl Bridge {
    /// Server build: bodies are registered and called in-process.
    pub fn server(registry: ServerFnRegistry, config: &LoaderConfig) -> Self {
        Self {
            side: Side::Server(registry),
            codec: config.codec,
            endpoint_prefix: config.endpoint_prefix.clone(),
        }
    }

    /// Client build: calls travel through `transport`.
    pub fn client(transport: impl Transport, config: &LoaderConfig) -> Self {
        Self {
            side: Side::Client(Arc::new(transport)),
            codec: config.codec,
            endpoint_prefix: config.endpoint_prefix.clone(),
        }
    }

    /// The side this bridge was built for.
    pub fn environment(&self) -> Environment {
        match self.side {
            Side::Server(_) => Environment::Server,
            Side::Client(_) => Environment::Client,
        }
    }

    /// Wire format used for arguments and results.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The registry serving requests, on the server.
    pub fn registry(&self) -> Option<&ServerFnRegistry> {
        match &self.side {
            Side::Server(registry) => Some(registry),
            Side::Client(_) => None,
        }
    }

    /// Declare a server function.
    ///
    /// On the server this fails if `id` is already registered. On the
    /// client `f` is discarded.
    pub fn define<A, R, F, Fut>(&self, id: &str, f: F) -> Result<ServerFn<A, R>>
    where
        A: Serialize + DeserializeOwned + Send + 'static,
        R: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<R>> + Send + 'static,
    {
        match &self.side {
            Side::Server(registry) => {
                let f = Arc::new(f);
                let body = Arc::clone(&f);
                registry.register(id, move |args: A| body(args))?;
                Ok(ServerFn::local(id, f))
            }
            Side::Client(transport) => Ok(ServerFn::remote(
                id,
                Arc::clone(transport),
                self.codec,
                &self.endpoint_prefix,
            )),
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("environment", &self.environment())
            .field("codec", &self.codec)
            .field("endpoint_prefix", &self.endpoint_prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::{BoxFuture, FutureExt};

    use super::*;
    use crate::error::{Error, ResourceError};

    fn pair(codec: Codec) -> (Bridge, Bridge, LoopbackTransport) {
        let server_config = LoaderConfig::new(Environment::Server).with_codec(codec);
        let client_config = LoaderConfig::new(Environment::Client).with_codec(codec);
        let server = Bridge::server(ServerFnRegistry::new(), &server_config);
        let transport = LoopbackTransport::new(server.registry().cloned().unwrap_or_default());
        let client = Bridge::client(transport.clone(), &client_config);
        (server, client, transport)
    }

    fn wands(bridge: &Bridge) -> ServerFn<String, Vec<String>> {
        bridge
            .define("tests::wands", |owner: String| async move {
                if owner.is_empty() {
                    Err(ResourceError::new("no owner"))
                } else {
                    Ok(vec![format!("{owner}'s wand")])
                }
            })
            .unwrap()
    }

    #[tokio::test]
    async fn server_calls_run_in_process() {
        let (server, _client, transport) = pair(Codec::Json);
        let f = wands(&server);
        assert_eq!(f.environment(), Environment::Server);
        assert_eq!(f.call("Harry".into()).await.unwrap(), vec!["Harry's wand".to_string()]);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn client_calls_cross_the_transport() {
        for codec in [Codec::Json, Codec::MsgPack] {
            let (server, client, transport) = pair(codec);
            let _registered = wands(&server);
            let remote = wands(&client);
            assert_eq!(remote.environment(), Environment::Client);

            assert_eq!(remote.call("Ron".into()).await.unwrap(), vec!["Ron's wand".to_string()]);
            let err = remote.call(String::new()).await.unwrap_err();
            assert_eq!(err.message(), "no owner");
            assert_eq!(transport.call_count(), 2);
        }
    }

    #[test]
    fn server_rejects_duplicate_ids() {
        let (server, _, _) = pair(Codec::Json);
        let _first = wands(&server);
        let second = server.define("tests::wands", |n: u8| async move { Ok(n) });
        assert!(matches!(second, Err(Error::DuplicateServerFn(_))));
    }

    struct Unreachable(Arc<AtomicUsize>);

    impl Transport for Unreachable {
        fn send(
            &self,
            endpoint: String,
            _request: ServerCallRequest,
        ) -> BoxFuture<'static, std::result::Result<ServerCallResponse, ResourceError>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            async move { Err(ResourceError::new(format!("{endpoint} unreachable"))) }.boxed()
        }
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_outcome() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let config = LoaderConfig::new(Environment::Client).with_endpoint_prefix("/api");
        let client = Bridge::client(Unreachable(Arc::clone(&attempts)), &config);
        let f: ServerFn<u8, u8> = client
            .define("tests::ping", |n: u8| async move { Ok(n) })
            .unwrap();

        let err = f.call(1).await.unwrap_err();
        assert_eq!(err.message(), "/api/tests::ping unreachable");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn id_macro_uses_module_path() {
        assert_eq!(server_fn_id!(students), concat!(module_path!(), "::students"));
        assert!(server_fn_id!(students).starts_with("lattice_data::bridge"));
    }
}
