//! Server roles, role sets and node addresses.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use kvadmin_transport::ServerRole;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Role a server plays in the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Cluster coordination / metadata server.
    Meta,
    /// Data node.
    Replica,
}

impl Role {
    /// Lowercase name used on the command line and in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Meta => "meta",
            Role::Replica => "replica",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Role> for ServerRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Meta => ServerRole::Meta,
            Role::Replica => ServerRole::Replica,
        }
    }
}

/// Which roles one dispatch targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleSet {
    /// Every meta server.
    Meta,
    /// Every replica server.
    Replica,
    /// Every meta server, then every replica server.
    All,
}

impl RoleSet {
    /// Roles in dispatch order.
    pub fn roles(&self) -> &'static [Role] {
        match self {
            RoleSet::Meta => &[Role::Meta],
            RoleSet::Replica => &[Role::Replica],
            RoleSet::All => &[Role::Meta, Role::Replica],
        }
    }
}

impl FromStr for RoleSet {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meta" => Ok(RoleSet::Meta),
            "replica" => Ok(RoleSet::Replica),
            "all" => Ok(RoleSet::All),
            other => Err(DispatchError::InvalidTarget(format!(
                "unknown role set '{}', expected meta, replica or all",
                other
            ))),
        }
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleSet::Meta => f.write_str("meta"),
            RoleSet::Replica => f.write_str("replica"),
            RoleSet::All => f.write_str("all"),
        }
    }
}

/// Network endpoint of a cluster server.
///
/// Two addresses are equal when they name the same endpoint; the role is
/// carried along for reporting only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeAddress {
    role: Role,
    addr: String,
}

impl NodeAddress {
    /// Member `addr` of `role`.
    pub fn new(role: Role, addr: impl Into<String>) -> Self {
        Self {
            role,
            addr: addr.into(),
        }
    }

    /// Role this node was listed under.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Literal `host:port` form.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Host part without brackets, if the address has a port.
    pub fn host(&self) -> Option<&str> {
        split_host_port(&self.addr).map(|(host, _)| host)
    }

    /// Port, if the address has one.
    pub fn port(&self) -> Option<u16> {
        split_host_port(&self.addr).map(|(_, port)| port)
    }

    /// Whether this node lives at `addr`.
    pub fn matches(&self, addr: &str) -> bool {
        same_endpoint(&self.addr, addr)
    }
}

impl PartialEq for NodeAddress {
    fn eq(&self, other: &Self) -> bool {
        same_endpoint(&self.addr, &other.addr)
    }
}

impl Eq for NodeAddress {}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}

/// Split `host:port` (or `[v6]:port`) into its parts.
pub fn split_host_port(addr: &str) -> Option<(&str, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}

/// Join host and port back into a dialable address.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn same_endpoint(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (a.parse::<SocketAddr>(), b.parse::<SocketAddr>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
