//! Loader Configuration
//!
//! Groups the knobs of the data-loading lifecycle in one value that is
//! shared by the store, the scheduler, the bridge and the server waiter.
//!
//! # Example
//!
//! ```rust
//! use lattice_data::config::{Environment, LoaderConfig};
//! use lattice_data::bridge::Codec;
//!
//! let config = LoaderConfig::new(Environment::Client)
//!     .with_codec(Codec::MsgPack)
//!     .with_endpoint_prefix("/api/_server");
//!
//! assert_eq!(config.environment, Environment::Client);
//! ```

use serde::{Deserialize, Serialize};

use crate::bridge::Codec;
use crate::error::Result;

/// Where the lifecycle is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Server render: server functions run in-process, reads are awaited.
    Server,
    /// Browser: server functions become network calls, cells hydrate.
    Client,
}

/// Configuration for the data-loading lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Execution environment.
    pub environment: Environment,

    /// Panic on scheduler ordering violations instead of returning an error.
    pub strict_ordering: bool,

    /// Upper bound on server render passes before giving up.
    pub max_render_passes: usize,

    /// Payload codec for server calls.
    pub codec: Codec,

    /// URL prefix of the generated server-function endpoints.
    pub endpoint_prefix: String,

    /// Element id of the snapshot script embedded in the document.
    pub snapshot_script_id: String,
}

impl LoaderConfig {
    /// Create a configuration for the given environment with default settings.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Panic instead of logging when parent data is read too early.
    pub fn with_strict_ordering(mut self, strict: bool) -> Self {
        self.strict_ordering = strict;
        self
    }

    /// Cap on server render passes before giving up.
    pub fn with_max_render_passes(mut self, passes: usize) -> Self {
        self.max_render_passes = passes.max(1);
        self
    }

    /// Wire format for server calls.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Path prefix server calls are sent under.
    pub fn with_endpoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoint_prefix = prefix.into();
        self
    }

    /// Element id of the embedded snapshot script.
    pub fn with_snapshot_script_id(mut self, id: impl Into<String>) -> Self {
        self.snapshot_script_id = id.into();
        self
    }

    /// Whether this process renders on the server.
    pub fn is_server(&self) -> bool {
        self.environment == Environment::Server
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Server,
            strict_ordering: cfg!(debug_assertions),
            max_render_passes: 16,
            codec: Codec::Json,
            endpoint_prefix: "/_server".to_string(),
            snapshot_script_id: "__route_data".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.environment, Environment::Server);
        assert_eq!(config.max_render_passes, 16);
        assert_eq!(config.codec, Codec::Json);
        assert_eq!(config.endpoint_prefix, "/_server");
        assert_eq!(config.snapshot_script_id, "__route_data");
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let config =
            LoaderConfig::from_json(r#"{"environment":"client","codec":"msgpack"}"#).unwrap();
        assert_eq!(config.environment, Environment::Client);
        assert_eq!(config.codec, Codec::MsgPack);
        assert_eq!(config.max_render_passes, 16);
    }

    #[test]
    fn from_json_rejects_unknown_environment() {
        assert!(LoaderConfig::from_json(r#"{"environment":"edge"}"#).is_err());
    }

    #[test]
    fn render_passes_never_zero() {
        let config = LoaderConfig::default().with_max_render_passes(0);
        assert_eq!(config.max_render_passes, 1);
    }
}
