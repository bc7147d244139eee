//! Connection pool keeping one multiplexed RPC client per node address.

use crate::error::{Result, TransportError};
use crate::protocol::{Frame, Opcode};
use crate::rpc::{RpcClient, RpcClientConfig};
use crate::tcp::TcpTransport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Connection pool configuration.
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Configuration handed to every RPC client the pool creates.
    pub rpc: RpcClientConfig,
}

/// Pool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of live pooled clients.
    pub live_clients: usize,
}

/// Connection pool managing RPC clients to multiple peers.
///
/// Clients are multiplexed, so concurrent callers share one connection per
/// address. A client is evicted when its connection closes or a call fails
/// with a connection-level error.
pub struct ConnectionPool {
    transport: Arc<TcpTransport>,
    config: PoolConfig,
    clients: Mutex<HashMap<String, Arc<RpcClient>>>,
}

impl ConnectionPool {
    /// Create a new connection pool.
    pub fn new(transport: Arc<TcpTransport>, config: PoolConfig) -> Self {
        Self {
            transport,
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create a client for the given peer address.
    pub async fn get_client(&self, addr: &str) -> Result<Arc<RpcClient>> {
        {
            let mut clients = self.clients.lock().await;
            match clients.get(addr) {
                Some(client) if !client.is_closed() => return Ok(client.clone()),
                Some(_) => {
                    debug!(addr, "evicting closed client");
                    clients.remove(addr);
                }
                None => {}
            }
        }
        // Connect outside the lock so one slow peer does not stall the others.
        let conn = self.transport.connect(addr).await?;
        let client = Arc::new(RpcClient::new(Arc::new(conn), self.config.rpc.clone()));
        let mut clients = self.clients.lock().await;
        let entry = clients.entry(addr.to_string()).or_insert_with(|| client.clone());
        Ok(entry.clone())
    }

    /// Issue one call to `addr`, evicting the pooled client on connection failure.
    pub async fn call(&self, addr: &str, opcode: Opcode, payload: Vec<u8>) -> Result<Frame> {
        let client = self.get_client(addr).await?;
        let result = client.call(opcode, payload).await;
        if let Err(ref e) = result {
            if e.is_connection_failure() || matches!(e, TransportError::RequestTimeout { .. }) {
                self.remove_peer(addr).await;
            }
        }
        result
    }

    /// Remove the client for a peer.
    pub async fn remove_peer(&self, addr: &str) {
        let mut clients = self.clients.lock().await;
        clients.remove(addr);
    }

    /// Get pool statistics.
    pub async fn stats(&self) -> PoolStats {
        let clients = self.clients.lock().await;
        PoolStats {
            live_clients: clients.values().filter(|c| !c.is_closed()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RpcHandler, RpcServer};
    use crate::tcp::TcpTransportConfig;
    use std::future::Future;
    use std::pin::Pin;

    struct EchoHandler;

    impl RpcHandler for EchoHandler {
        fn handle(&self, request: Frame) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>> {
            Box::pin(async move { Ok(request.payload) })
        }
    }

    fn pool() -> ConnectionPool {
        let transport = Arc::new(TcpTransport::new(TcpTransportConfig::default()));
        ConnectionPool::new(transport, PoolConfig::default())
    }

    #[tokio::test]
    async fn test_pool_stats_empty() {
        let stats = pool().stats().await;
        assert_eq!(stats.live_clients, 0);
    }

    #[tokio::test]
    async fn test_pool_reuses_client() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = RpcServer::serve(listener, Arc::new(EchoHandler)).await;
        });

        let pool = pool();
        let first = pool.get_client(&addr).await.unwrap();
        let second = pool.get_client(&addr).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let frame = pool.call(&addr, Opcode::RemoteCommand, b"hi".to_vec()).await.unwrap();
        assert_eq!(frame.payload, b"hi");
        assert_eq!(pool.stats().await.live_clients, 1);
    }

    #[tokio::test]
    async fn test_pool_connect_failure_is_not_cached() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let pool = pool();
        let result = pool.call(&addr, Opcode::RemoteCommand, Vec::new()).await;
        assert!(matches!(result, Err(TransportError::ConnectionRefused { .. })));
        assert_eq!(pool.stats().await.live_clients, 0);
    }
}
