//! RPC layer providing request/response semantics over TCP connections.

use crate::error::{Result, TransportError};
use crate::protocol::{Frame, Opcode};
use crate::tcp::TcpConnection;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

/// Configuration for RPC client.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Response timeout in milliseconds (default: 10000).
    pub response_timeout_ms: u64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 10_000,
        }
    }
}

/// Trait for handling incoming RPC requests.
pub trait RpcHandler: Send + Sync + 'static {
    /// Handle a request and return the response payload bytes.
    fn handle(&self, request: Frame) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>>;
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Frame>>>>;

/// RPC client for sending requests and receiving responses.
pub struct RpcClient {
    conn: Arc<TcpConnection>,
    config: RpcClientConfig,
    next_id: AtomicU64,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl RpcClient {
    /// Create a new RPC client. Starts a background reader task.
    pub fn new(conn: Arc<TcpConnection>, config: RpcClientConfig) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader_conn = conn.clone();
        let reader_pending = pending.clone();
        let reader_closed = closed.clone();
        let handle = tokio::spawn(async move {
            loop {
                match reader_conn.recv_frame().await {
                    Ok(frame) => {
                        let request_id = frame.request_id();
                        let mut map = reader_pending.lock().await;
                        if let Some(tx) = map.remove(&request_id) {
                            let _ = tx.send(frame);
                        } else {
                            debug!(request_id, "dropping response with no pending request");
                        }
                    }
                    Err(e) => {
                        debug!(peer = reader_conn.peer_addr(), error = %e, "RPC reader stopped");
                        break;
                    }
                }
            }
            reader_closed.store(true, Ordering::Release);
            // Dropping the senders fails every in-flight call with ConnectionReset.
            reader_pending.lock().await.clear();
        });
        Self {
            conn,
            config,
            next_id: AtomicU64::new(1),
            pending,
            closed,
            reader_handle: handle,
        }
    }

    /// Remote address this client talks to.
    pub fn peer_addr(&self) -> &str {
        self.conn.peer_addr()
    }

    /// True once the reader task has observed the connection closing.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send a request and wait for the response.
    ///
    /// An error frame from the server comes back as [`TransportError::ServerError`].
    pub async fn call(&self, opcode: Opcode, payload: Vec<u8>) -> Result<Frame> {
        if self.is_closed() {
            return Err(TransportError::NotConnected);
        }
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::new(opcode, request_id, payload);
        let (tx, rx) = oneshot::channel();
        {
            let mut map = self.pending.lock().await;
            map.insert(request_id, tx);
        }
        if let Err(e) = self.conn.send_frame(&frame).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }
        let timeout = std::time::Duration::from_millis(self.config.response_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) if response.is_error() => Err(TransportError::ServerError(
                String::from_utf8_lossy(&response.payload).into_owned(),
            )),
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::ConnectionReset),
            Err(_) => {
                let mut map = self.pending.lock().await;
                map.remove(&request_id);
                Err(TransportError::RequestTimeout {
                    request_id,
                    timeout_ms: self.config.response_timeout_ms,
                })
            }
        }
    }

    /// Close the connection and stop the reader.
    pub async fn shutdown(self) {
        if let Err(e) = self.conn.close().await {
            debug!(peer = self.conn.peer_addr(), error = %e, "close failed");
        }
        self.reader_handle.abort();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// RPC server that dispatches requests to a handler.
pub struct RpcServer;

impl RpcServer {
    /// Run the server accept loop. Spawns a task per connection.
    ///
    /// A handler error is answered with an error frame so the caller fails
    /// fast instead of waiting out its response timeout.
    pub async fn serve(listener: tokio::net::TcpListener, handler: Arc<dyn RpcHandler>) -> Result<()> {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!(peer = %peer_addr, "Accepted connection");
            if let Err(e) = stream.set_nodelay(true) {
                debug!(peer = %peer_addr, error = %e, "set_nodelay failed");
            }
            let handler = handler.clone();
            tokio::spawn(async move {
                let conn = Arc::new(TcpConnection::accepted(stream));
                loop {
                    let frame = match conn.recv_frame().await {
                        Ok(f) => f,
                        Err(e) => {
                            debug!(error = %e, "Connection closed");
                            break;
                        }
                    };
                    // Requests on one connection are served concurrently so a slow
                    // command does not hold up later ones.
                    let conn = conn.clone();
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let request = frame.clone();
                        let response = match handler.handle(frame).await {
                            Ok(payload) => request.make_response(payload),
                            Err(e) => {
                                warn!(request_id = request.request_id(), error = %e, "Handler error");
                                request.make_error(&e.to_string())
                            }
                        };
                        if request.header.flags.one_way {
                            return;
                        }
                        if let Err(e) = conn.send_frame(&response).await {
                            warn!(error = %e, "Failed to send response");
                        }
                    });
                }
            });
        }
    }
}
