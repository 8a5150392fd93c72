//! Payload codecs and wire types for server calls.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, Result};

/// Serialization format of server-call arguments and results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Human-readable, the default.
    #[default]
    Json,
    /// MessagePack with named fields; smaller for large payloads.
    MsgPack,
}

impl Codec {
    /// Serialize `value` in this format.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json => Ok(serde_json::to_vec(value)?),
            Codec::MsgPack => Ok(rmp_serde::to_vec_named(value)?),
        }
    }

    /// Deserialize a value previously produced by [`Codec::encode`].
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Json => Ok(serde_json::from_slice(bytes)?),
            Codec::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
        }
    }

    /// HTTP content type of encoded payloads.
    pub fn content_type(&self) -> &'static str {
        match self {
            Codec::Json => "application/json",
            Codec::MsgPack => "application/msgpack",
        }
    }
}

/// A call to a server function, as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCallRequest {
    /// Stable identifier shared by the server and client builds.
    pub id: String,
    pub codec: Codec,
    /// Arguments encoded with `codec`.
    pub args: Vec<u8>,
}

impl ServerCallRequest {
    /// URL of the generated endpoint for this call.
    pub fn endpoint(&self, prefix: &str) -> String {
        format!("{}/{}", prefix.trim_end_matches('/'), self.id)
    }
}

/// Result of a server call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "lowercase")]
pub enum ServerCallResponse {
    /// Return value encoded with the request's codec.
    Success(Vec<u8>),
    /// The function failed, or the call never reached it.
    Failure(ResourceError),
}
