//! Transport error type.

use thiserror::Error;

/// Errors produced while connecting to, framing for, or calling a remote node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer actively refused the connection.
    #[error("connection refused to {addr}")]
    ConnectionRefused {
        /// Address that refused.
        addr: String,
    },

    /// Connecting did not complete within the configured window.
    #[error("connection timeout after {timeout_ms}ms to {addr}")]
    ConnectionTimeout {
        /// Address being connected to.
        addr: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The connection was closed while a request was in flight.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// A frame could not be parsed.
    #[error("invalid frame: {reason}")]
    InvalidFrame {
        /// Parse failure detail.
        reason: String,
    },

    /// The frame did not start with the protocol magic.
    #[error("invalid magic number: expected 0x{expected:08X}, got 0x{got:08X}")]
    InvalidMagic {
        /// Expected magic.
        expected: u32,
        /// Magic found on the wire.
        got: u32,
    },

    /// The peer speaks a different protocol version.
    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch {
        /// Local version.
        expected: u8,
        /// Peer version.
        got: u8,
    },

    /// Payload CRC did not match the header.
    #[error("checksum mismatch: expected 0x{expected:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch {
        /// Checksum carried in the header.
        expected: u32,
        /// Checksum computed over the payload.
        computed: u32,
    },

    /// Payload exceeds [`crate::protocol::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max_size})")]
    PayloadTooLarge {
        /// Advertised payload size.
        size: u32,
        /// Maximum accepted size.
        max_size: u32,
    },

    /// No response arrived within the response timeout.
    #[error("request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Request id that timed out.
        request_id: u64,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Opcode not known to this build.
    #[error("unknown opcode: 0x{0:04X}")]
    UnknownOpcode(u16),

    /// The client's connection is gone.
    #[error("not connected")]
    NotConnected,

    /// The server could not handle the request and said why.
    #[error("server error: {0}")]
    ServerError(String),

    /// Message (de)serialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Underlying socket error.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl TransportError {
    /// True for errors that mean the connection itself is unusable.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionRefused { .. }
                | TransportError::ConnectionTimeout { .. }
                | TransportError::ConnectionReset
                | TransportError::NotConnected
                | TransportError::IoError(_)
        )
    }
}

/// Transport result alias.
pub type Result<T> = std::result::Result<T, TransportError>;
