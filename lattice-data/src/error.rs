//! Error Types
//!
//! Two layers of failure exist in the data-loading lifecycle:
//!
//! - [`ResourceError`] is the value a Resource Cell holds when its source
//!   function fails. It is serializable so it can travel inside a snapshot or
//!   a server-call response, and it only carries a message: a failure raised
//!   by a local source function, by a remote server function, or by the
//!   transport in between all look the same to the reader of a cell.
//!
//! - [`Error`] covers integration and programmer errors raised by the store,
//!   the scheduler, the bridge and the server waiter.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure held by an errored Resource Cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ResourceError {
    message: String,
}

impl ResourceError {
    /// Create an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for ResourceError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ResourceError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<Error> for ResourceError {
    fn from(err: Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Crate-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A key is already bound to a cell holding a different value type.
    #[error("cell {key} holds a different value type")]
    CellTypeMismatch { key: String },

    /// A descendant read its parent's data before the parent's data function returned.
    #[error("segment {segment} read parent data before the parent data function completed")]
    OrderingViolation { segment: String },

    /// The root segment asked for parent data.
    #[error("segment {segment} has no parent data")]
    NoParentData { segment: String },

    /// Parent data exists but is not of the requested type.
    #[error("parent data of segment {segment} has a different type")]
    ParentDataType { segment: String },

    /// Mounted route data is not of the requested type.
    #[error("route data of segment {segment} has a different type")]
    RouteDataType { segment: String },

    /// No data is mounted for the requested segment.
    #[error("no route data mounted for segment {segment}")]
    SegmentNotMounted { segment: String },

    /// No server function is registered under the identifier.
    #[error("unknown server function: {0}")]
    UnknownServerFn(String),

    /// Two server functions were registered under the same identifier.
    #[error("server function registered twice: {0}")]
    DuplicateServerFn(String),

    /// JSON encoding or decoding failed.
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding failed.
    #[error("msgpack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding failed.
    #[error("msgpack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// The server render still had pending boundary reads after the pass limit.
    #[error("render did not settle after {passes} passes")]
    RenderDidNotSettle { passes: usize },

    /// Logging could not be installed.
    #[error("logging initialisation failed: {0}")]
    Logging(String),
}
