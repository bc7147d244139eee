#![warn(missing_docs)]

//! kvadmin transport subsystem: framed binary RPC over TCP, connection pooling and
//! the remote-command message types exchanged with meta and replica servers.

pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod rpc;
pub mod tcp;

pub use connection::{ConnectionPool, PoolConfig, PoolStats};
pub use error::{Result, TransportError};
pub use message::{
    deserialize_message, serialize_message, ListNodesRequest, ListNodesResponse,
    RemoteCommandReply, RemoteCommandRequest, ServerRole,
};
pub use protocol::{Frame, FrameFlags, FrameHeader, Opcode};
pub use rpc::{RpcClient, RpcClientConfig, RpcHandler, RpcServer};
pub use tcp::{TcpConnection, TcpTransport, TcpTransportConfig};
