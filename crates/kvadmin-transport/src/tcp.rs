//! TCP dialing and framed connections.

use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::{Result, TransportError};
use crate::protocol::Frame;

/// Dialing options.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Whether to enable TCP_NODELAY. Command frames are small, so on by default.
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3000,
            nodelay: true,
        }
    }
}

/// Dials admin connections to meta and replica servers.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    config: TcpTransportConfig,
}

impl TcpTransport {
    /// Creates a transport with the given dialing options.
    pub fn new(config: TcpTransportConfig) -> Self {
        Self { config }
    }

    /// Connect to a node given as `host:port`.
    ///
    /// A refused connection and an elapsed connect timeout get their own
    /// error variants so callers can tell an absent node from a slow one.
    pub async fn connect(&self, addr: &str) -> Result<TcpConnection> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Err(_) => {
                return Err(TransportError::ConnectionTimeout {
                    addr: addr.to_string(),
                    timeout_ms: self.config.connect_timeout_ms,
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(TransportError::ConnectionRefused {
                    addr: addr.to_string(),
                })
            }
            Ok(result) => result?,
        };
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        tracing::debug!(addr, "connected");
        Ok(TcpConnection::new(stream, addr.to_string()))
    }
}

/// One framed TCP connection. Reads and writes lock independently, so one task
/// can wait for responses while others send requests.
pub struct TcpConnection {
    read: Mutex<OwnedReadHalf>,
    write: Mutex<OwnedWriteHalf>,
    peer: String,
}

impl TcpConnection {
    fn new(stream: TcpStream, peer: String) -> Self {
        let (read, write) = stream.into_split();
        Self {
            read: Mutex::new(read),
            write: Mutex::new(write),
            peer,
        }
    }

    /// Wrap a stream accepted by a server, named after its remote address.
    pub(crate) fn accepted(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        Self::new(stream, peer)
    }

    /// Sends a frame over the connection.
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        let mut write = self.write.lock().await;
        frame.write_to(&mut *write).await
    }

    /// Receives the next frame from the connection.
    pub async fn recv_frame(&self) -> Result<Frame> {
        let mut read = self.read.lock().await;
        Frame::read_from(&mut *read).await
    }

    /// Half-close the connection; the peer sees end of stream.
    pub async fn close(&self) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut write = self.write.lock().await;
        write.shutdown().await?;
        Ok(())
    }

    /// The address this connection was dialed with, or the remote address of
    /// an accepted connection.
    pub fn peer_addr(&self) -> &str {
        &self.peer
    }
}
