//! Display labels for nodes, with optional best-effort reverse DNS.
//!
//! Lookups never fail a dispatch: any error or timeout falls back to the
//! literal address.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::Resolver;
use tracing::debug;

use crate::node::{join_host_port, split_host_port, NodeAddress};

/// Name lookups used for labelling and for explicit node input.
#[async_trait]
pub trait HostLookup: Send + Sync {
    /// Hostname for `ip`, if any.
    async fn reverse(&self, ip: IpAddr) -> Option<String>;

    /// First address for `host`, if any.
    async fn forward(&self, host: &str) -> Option<IpAddr>;
}

/// Lookup that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

#[async_trait]
impl HostLookup for NoLookup {
    async fn reverse(&self, _ip: IpAddr) -> Option<String> {
        None
    }

    async fn forward(&self, _host: &str) -> Option<IpAddr> {
        None
    }
}

/// DNS lookups through the system resolver configuration.
pub struct DnsLookup {
    resolver: Resolver<TokioConnectionProvider>,
}

impl DnsLookup {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf() -> Result<Self, String> {
        let (config, mut opts) = read_system_conf().map_err(|e| e.to_string())?;
        opts.attempts = 1;
        let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl HostLookup for DnsLookup {
    async fn reverse(&self, ip: IpAddr) -> Option<String> {
        match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .filter(|name| !name.is_empty()),
            Err(e) => {
                debug!(ip = %ip, error = %e, "reverse lookup failed");
                None
            }
        }
    }

    async fn forward(&self, host: &str) -> Option<IpAddr> {
        match self.resolver.lookup_ip(host).await {
            Ok(lookup) => lookup.iter().next(),
            Err(e) => {
                debug!(host, error = %e, "forward lookup failed");
                None
            }
        }
    }
}

/// Labels nodes for the report, bounding every lookup by `timeout`.
#[derive(Clone)]
pub struct AddressResolver {
    lookup: Arc<dyn HostLookup>,
    timeout: Duration,
}

impl AddressResolver {
    /// Resolver bounding every lookup by `timeout`.
    pub fn new(lookup: Arc<dyn HostLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }

    /// Display label for `node`: the literal address, or `<hostname>:<port>`
    /// when `resolve` is set and the reverse lookup succeeds in time.
    pub async fn label(&self, node: &NodeAddress, resolve: bool) -> String {
        let literal = node.addr().to_string();
        if !resolve {
            return literal;
        }
        let Some((host, port)) = split_host_port(node.addr()) else {
            return literal;
        };
        let Ok(ip) = host.parse::<IpAddr>() else {
            // already a hostname
            return literal;
        };
        match tokio::time::timeout(self.timeout, self.lookup.reverse(ip)).await {
            Ok(Some(hostname)) => join_host_port(&hostname, port),
            Ok(None) => literal,
            Err(_) => {
                debug!(node = %node, timeout_ms = self.timeout.as_millis() as u64, "reverse lookup timed out");
                literal
            }
        }
    }

    /// Turn an operator-supplied `hostname:port` into `ip:port` so it can be
    /// matched against membership. Anything else is returned unchanged.
    pub async fn resolve_input(&self, addr: &str) -> String {
        let Some((host, port)) = split_host_port(addr) else {
            return addr.to_string();
        };
        if host.parse::<IpAddr>().is_ok() {
            return addr.to_string();
        }
        match tokio::time::timeout(self.timeout, self.lookup.forward(host)).await {
            Ok(Some(ip)) => {
                let resolved = join_host_port(&ip.to_string(), port);
                debug!(input = addr, resolved = %resolved, "resolved node address");
                resolved
            }
            _ => addr.to_string(),
        }
    }
}
