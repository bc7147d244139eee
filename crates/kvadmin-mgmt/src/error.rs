//! Dispatch error taxonomy.

use kvadmin_transport::TransportError;
use thiserror::Error;

use crate::node::Role;

/// Errors raised while dispatching a remote command.
///
/// `InvalidTarget` fails the whole call. Every other variant is per node and
/// ends up as a failure entry in the report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The request itself is malformed.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    /// The node filter is not a member of `role`.
    #[error("node {node} not found in role {role}")]
    NodeNotFound {
        /// Role searched.
        role: Role,
        /// Filter as given.
        node: String,
    },
    /// The node could not be reached.
    #[error("connection error: {0}")]
    Connection(String),
    /// No answer within the command timeout.
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// Bound that elapsed.
        timeout_ms: u64,
    },
    /// Malformed frame or payload.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The server rejected the command.
    #[error("remote error: {0}")]
    Remote(String),
    /// The per-node task panicked or was cancelled.
    #[error("dispatch task failed: {0}")]
    TaskFailed(String),
}

impl DispatchError {
    /// Short kind name, stable for scripting.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::InvalidTarget(_) => "InvalidTarget",
            DispatchError::NodeNotFound { .. } => "NodeNotFound",
            DispatchError::Connection(_) => "ConnectionError",
            DispatchError::Timeout { .. } => "Timeout",
            DispatchError::Protocol(_) => "ProtocolError",
            DispatchError::Remote(_) => "RemoteError",
            DispatchError::TaskFailed(_) => "TaskFailed",
        }
    }
}

impl From<TransportError> for DispatchError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::RequestTimeout { timeout_ms, .. } => DispatchError::Timeout { timeout_ms },
            TransportError::ServerError(message) => DispatchError::Remote(message),
            e if e.is_connection_failure() => DispatchError::Connection(e.to_string()),
            e => DispatchError::Protocol(e.to_string()),
        }
    }
}
