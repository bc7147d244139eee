//! Cluster client: node membership plus one-node remote command delivery.

use std::sync::Arc;

use async_trait::async_trait;
use kvadmin_transport::{
    deserialize_message, serialize_message, ConnectionPool, ListNodesRequest, ListNodesResponse,
    Opcode, PoolConfig, RemoteCommandReply, RemoteCommandRequest, RpcClientConfig, TcpTransport,
    TcpTransportConfig,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AdminConfig;
use crate::error::DispatchError;
use crate::node::{NodeAddress, Role};

/// Read access to cluster membership and a way to run one command on one node.
///
/// The dispatcher only ever talks to the cluster through this trait.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Current meta servers, in cluster order.
    fn meta_nodes(&self) -> Vec<NodeAddress>;

    /// Current replica servers, in cluster order.
    fn replica_nodes(&self) -> Vec<NodeAddress>;

    /// Members of `role`.
    fn nodes(&self, role: Role) -> Vec<NodeAddress> {
        match role {
            Role::Meta => self.meta_nodes(),
            Role::Replica => self.replica_nodes(),
        }
    }

    /// Deliver `command` with `arguments` to `node` and return its textual output.
    async fn call_remote_command(
        &self,
        node: &NodeAddress,
        command: &str,
        arguments: &str,
    ) -> Result<String, DispatchError>;
}

/// Errors building a [`RpcClusterClient`].
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The config lists no meta server.
    #[error("no meta servers configured")]
    NoMetaServers,
    /// A configured or listed address is not `host:port`.
    #[error("invalid node address '{0}'")]
    InvalidAddress(String),
    /// Every meta server failed the membership query.
    #[error("could not fetch replica membership from any meta server: {0}")]
    MembershipUnavailable(String),
}

/// [`ClusterClient`] backed by the kvadmin RPC transport.
pub struct RpcClusterClient {
    pool: ConnectionPool,
    meta: Vec<NodeAddress>,
    replica: Vec<NodeAddress>,
}

impl RpcClusterClient {
    /// Client over a fixed membership.
    pub fn with_membership(
        config: &AdminConfig,
        meta: Vec<NodeAddress>,
        replica: Vec<NodeAddress>,
    ) -> Self {
        let transport = Arc::new(TcpTransport::new(TcpTransportConfig {
            connect_timeout_ms: config.connect_timeout_ms,
            ..TcpTransportConfig::default()
        }));
        let pool = ConnectionPool::new(
            transport,
            PoolConfig {
                rpc: RpcClientConfig {
                    response_timeout_ms: config.command_timeout_ms,
                },
            },
        );
        Self {
            pool,
            meta,
            replica,
        }
    }

    /// Build a client from configuration.
    ///
    /// Meta servers come from the config. Replica servers come from the config's
    /// static list when it is non-empty, otherwise from the first meta server
    /// that answers a membership query.
    pub async fn connect(config: &AdminConfig) -> Result<Self, ClusterError> {
        if config.meta_servers.is_empty() {
            return Err(ClusterError::NoMetaServers);
        }
        let meta = parse_members(Role::Meta, &config.meta_servers)?;
        let replica = parse_members(Role::Replica, &config.replica_servers)?;
        let mut client = Self::with_membership(config, meta, replica);
        if client.replica.is_empty() {
            client.replica = client.fetch_members(Role::Replica).await?;
        }
        info!(
            meta = client.meta.len(),
            replica = client.replica.len(),
            "cluster membership loaded"
        );
        Ok(client)
    }

    async fn fetch_members(&self, role: Role) -> Result<Vec<NodeAddress>, ClusterError> {
        let mut last_error = String::from("no meta server tried");
        for meta in &self.meta {
            match self.list_nodes(meta, role).await {
                Ok(addrs) => {
                    debug!(meta = %meta, role = %role, count = addrs.len(), "listed nodes");
                    return parse_members(role, &addrs);
                }
                Err(e) => {
                    warn!(meta = %meta, error = %e, "membership query failed, trying next meta server");
                    last_error = e.to_string();
                }
            }
        }
        Err(ClusterError::MembershipUnavailable(last_error))
    }

    async fn list_nodes(&self, meta: &NodeAddress, role: Role) -> Result<Vec<String>, DispatchError> {
        let payload = serialize_message(&ListNodesRequest { role: role.into() })?;
        let frame = self.pool.call(meta.addr(), Opcode::ListNodes, payload).await?;
        let response: ListNodesResponse = deserialize_message(&frame.payload)?;
        Ok(response.nodes)
    }
}

fn parse_members(role: Role, addrs: &[String]) -> Result<Vec<NodeAddress>, ClusterError> {
    addrs
        .iter()
        .map(|addr| {
            let addr = addr.trim();
            match crate::node::split_host_port(addr) {
                Some(_) => Ok(NodeAddress::new(role, addr)),
                None => Err(ClusterError::InvalidAddress(addr.to_string())),
            }
        })
        .collect()
}

#[async_trait]
impl ClusterClient for RpcClusterClient {
    fn meta_nodes(&self) -> Vec<NodeAddress> {
        self.meta.clone()
    }

    fn replica_nodes(&self) -> Vec<NodeAddress> {
        self.replica.clone()
    }

    async fn call_remote_command(
        &self,
        node: &NodeAddress,
        command: &str,
        arguments: &str,
    ) -> Result<String, DispatchError> {
        let payload = serialize_message(&RemoteCommandRequest {
            command: command.to_string(),
            arguments: arguments.to_string(),
        })?;
        let frame = self
            .pool
            .call(node.addr(), Opcode::RemoteCommand, payload)
            .await?;
        match deserialize_message::<RemoteCommandReply>(&frame.payload)? {
            RemoteCommandReply::Output(text) => Ok(text),
            RemoteCommandReply::Error(text) => Err(DispatchError::Remote(text)),
        }
    }
}
