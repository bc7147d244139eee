//! RPC message types exchanged with meta and replica servers.
//!
//! Messages are serialized using bincode for efficient wire encoding.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};

/// Serialize any serde-compatible message to bytes using bincode.
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(|e| TransportError::SerializationError(e.to_string()))
}

/// Deserialize bytes to a message using bincode.
pub fn deserialize_message<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    bincode::deserialize(data).map_err(|e| TransportError::SerializationError(e.to_string()))
}

/// Server role as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerRole {
    /// Cluster coordination / metadata server.
    Meta,
    /// Data-holding replica server.
    Replica,
}

/// Remote command invocation.
///
/// `arguments` is forwarded verbatim; an empty string asks for the current
/// value, anything else asks the server to update it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCommandRequest {
    /// Command name, e.g. `help`.
    pub command: String,
    /// Opaque argument string.
    pub arguments: String,
}

/// Reply to a [`RemoteCommandRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteCommandReply {
    /// Command ran; textual output.
    Output(String),
    /// The server rejected or failed the command; raw diagnostic text.
    Error(String),
}

/// Membership query sent to a meta server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListNodesRequest {
    /// Role whose members should be listed.
    pub role: ServerRole,
}

/// Membership reply: node addresses in `host:port` form, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListNodesResponse {
    /// Node addresses.
    pub nodes: Vec<String>,
}
