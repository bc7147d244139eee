//! Remote-command fan-out.
//!
//! One dispatch selects the target nodes, spawns a task per node that sends
//! the command and computes the node's label, joins every task, and assembles
//! the report in selection order. A node's failure is recorded in its own slot
//! and never affects its siblings; only a malformed request fails the call.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::error::DispatchError;
use crate::node::{NodeAddress, RoleSet};
use crate::report::{render, DispatchResult, Outcome, Report};
use crate::resolver::{AddressResolver, HostLookup};
use crate::selector::{select, Slot};
use crate::sender::CommandSender;

/// One remote-command request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    /// Roles to address.
    pub role_set: RoleSet,
    /// Restrict to this `host:port`; `None` targets every member.
    pub node: Option<String>,
    /// Remote command name.
    pub command: String,
    /// Forwarded verbatim; empty queries, non-empty sets.
    pub arguments: String,
    /// Label nodes by hostname instead of address.
    pub resolve: bool,
}

impl TargetSpec {
    /// Target every member of `role_set` with `command` and no arguments.
    pub fn new(role_set: RoleSet, command: impl Into<String>) -> Self {
        Self {
            role_set,
            node: None,
            command: command.into(),
            arguments: String::new(),
            resolve: false,
        }
    }

    /// Narrow to one node. A blank string clears the filter.
    pub fn node(mut self, node: impl Into<String>) -> Self {
        let node = node.into();
        self.node = if node.trim().is_empty() { None } else { Some(node) };
        self
    }

    /// Set the argument string.
    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    /// Toggle hostname labels.
    pub fn resolve(mut self, resolve: bool) -> Self {
        self.resolve = resolve;
        self
    }
}

/// Per-node time bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimeouts {
    /// Bound on one remote command.
    pub command: Duration,
    /// Bound on one reverse lookup.
    pub resolve: Duration,
}

impl Default for DispatchTimeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(10),
            resolve: Duration::from_secs(2),
        }
    }
}

/// Fans remote commands out over an injected cluster client.
pub struct Dispatcher {
    client: Arc<dyn ClusterClient>,
    sender: CommandSender,
    resolver: AddressResolver,
}

impl Dispatcher {
    /// Build a dispatcher over `client`, labelling nodes through `lookup`.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        lookup: Arc<dyn HostLookup>,
        timeouts: DispatchTimeouts,
    ) -> Self {
        Self {
            sender: CommandSender::new(client.clone(), timeouts.command),
            resolver: AddressResolver::new(lookup, timeouts.resolve),
            client,
        }
    }

    /// Run `target` against the cluster and collect one entry per selected node.
    pub async fn run(&self, target: &TargetSpec) -> Result<Report, DispatchError> {
        let explicit = match target.node.as_deref() {
            Some(node) if target.resolve => Some(self.resolver.resolve_input(node.trim()).await),
            Some(node) => Some(node.to_string()),
            None => None,
        };
        let selection = select(
            self.client.as_ref(),
            target.role_set.roles(),
            explicit.as_deref(),
        )?;

        if selection.is_empty() {
            info!(role_set = %target.role_set, "no matching nodes");
            return Ok(Report::new(vec![DispatchResult::no_matching_nodes()]));
        }

        debug!(
            role_set = %target.role_set,
            command = %target.command,
            nodes = selection.node_count(),
            "dispatching remote command"
        );

        // Handles are kept in selection order, so joining them in order fills
        // each node's slot regardless of which finishes first.
        let mut pending = Vec::with_capacity(selection.slots.len());
        for slot in selection.slots {
            match slot {
                Slot::Node(node) => pending.push(Pending::Task(self.spawn_node(node, target))),
                Slot::Missing { role, node } => {
                    pending.push(Pending::Done(DispatchResult::node_not_found(role, &node)))
                }
            }
        }

        let entries = join_all(pending.into_iter().map(Pending::finish)).await;
        let report = Report::new(entries);
        info!(
            role_set = %target.role_set,
            command = %target.command,
            succeeded = report.success_count(),
            failed = report.failure_count(),
            "remote command complete"
        );
        Ok(report)
    }

    /// [`run`](Self::run) followed by [`render`].
    pub async fn run_rendered(&self, target: &TargetSpec) -> Result<String, DispatchError> {
        let report = self.run(target).await?;
        Ok(render(&report))
    }

    fn spawn_node(&self, node: NodeAddress, target: &TargetSpec) -> NodeTask {
        let sender = self.sender.clone();
        let resolver = self.resolver.clone();
        let command = target.command.clone();
        let arguments = target.arguments.clone();
        let resolve = target.resolve;
        let task_node = node.clone();
        let handle = tokio::spawn(async move {
            let (result, label) = tokio::join!(
                sender.send(&task_node, &command, &arguments),
                resolver.label(&task_node, resolve),
            );
            (label, result)
        });
        NodeTask { node, handle }
    }
}

struct NodeTask {
    node: NodeAddress,
    handle: tokio::task::JoinHandle<(String, Result<String, DispatchError>)>,
}

enum Pending {
    Task(NodeTask),
    Done(DispatchResult),
}

impl Pending {
    async fn finish(self) -> DispatchResult {
        match self {
            Pending::Done(result) => result,
            Pending::Task(NodeTask { node, handle }) => match handle.await {
                Ok((label, Ok(text))) => DispatchResult::for_node(node, label, Outcome::Success(text)),
                Ok((label, Err(e))) => {
                    warn!(node = %node, error = %e, "remote command failed");
                    DispatchResult::for_node(node, label, Outcome::Failure(e))
                }
                Err(e) => {
                    warn!(node = %node, error = %e, "dispatch task failed");
                    let label = node.addr().to_string();
                    DispatchResult::for_node(
                        node,
                        label,
                        Outcome::Failure(DispatchError::TaskFailed(e.to_string())),
                    )
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Role;
    use crate::resolver::NoLookup;
    use async_trait::async_trait;
    use rand::Rng;
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Behavior {
        Reply(String),
        Refuse,
        Remote(String),
        Hang,
        Panic,
    }

    struct FakeCluster {
        meta: Vec<NodeAddress>,
        replica: Vec<NodeAddress>,
        behavior: HashMap<String, Behavior>,
        delays: HashMap<String, Duration>,
        calls: AtomicUsize,
    }

    impl FakeCluster {
        fn new(meta: &[&str], replica: &[&str]) -> Self {
            Self {
                meta: meta.iter().map(|a| NodeAddress::new(Role::Meta, *a)).collect(),
                replica: replica
                    .iter()
                    .map(|a| NodeAddress::new(Role::Replica, *a))
                    .collect(),
                behavior: HashMap::new(),
                delays: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn with(mut self, addr: &str, behavior: Behavior) -> Self {
            self.behavior.insert(addr.to_string(), behavior);
            self
        }

        fn with_delay(mut self, addr: &str, delay: Duration) -> Self {
            self.delays.insert(addr.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl ClusterClient for FakeCluster {
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(node.addr()) {
                tokio::time::sleep(*delay).await;
            }
            let default = Behavior::Reply(format!("{} {} [{}]", node.addr(), command, arguments));
            match self.behavior.get(node.addr()).cloned().unwrap_or(default) {
                Behavior::Reply(text) => Ok(text),
                Behavior::Refuse => Err(DispatchError::Connection(format!(
                    "connection refused to {}",
                    node.addr()
                ))),
                Behavior::Remote(text) => Err(DispatchError::Remote(text)),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
                Behavior::Panic => panic!("handler blew up"),
            }
        }
    }

    struct FakeLookup {
        names: HashMap<IpAddr, String>,
        slow: Vec<IpAddr>,
    }

    #[async_trait]
    impl HostLookup for FakeLookup {
        async fn reverse(&self, ip: IpAddr) -> Option<String> {
            if self.slow.contains(&ip) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.names.get(&ip).cloned()
        }

        async fn forward(&self, host: &str) -> Option<IpAddr> {
            self.names
                .iter()
                .find(|(_, name)| name.as_str() == host)
                .map(|(ip, _)| *ip)
        }
    }

    const META: [&str; 3] = ["10.0.0.1:34601", "10.0.0.2:34601", "10.0.0.3:34601"];
    const REPLICA: [&str; 3] = ["10.0.0.5:34801", "10.0.0.6:34801", "10.0.0.7:34801"];

    fn dispatcher(cluster: FakeCluster) -> (Dispatcher, Arc<FakeCluster>) {
        let cluster = Arc::new(cluster);
        let d = Dispatcher::new(cluster.clone(), Arc::new(NoLookup), DispatchTimeouts::default());
        (d, cluster)
    }

    fn labels(report: &Report) -> Vec<String> {
        report.entries().iter().map(|e| e.label.clone()).collect()
    }

    #[tokio::test]
    async fn test_meta_help_one_entry_per_node() {
        let (d, _) = dispatcher(FakeCluster::new(&META, &REPLICA));
        let report = d.run(&TargetSpec::new(RoleSet::Meta, "help")).await.unwrap();

        assert_eq!(report.len(), 3);
        assert_eq!(labels(&report), META.to_vec());
        for (entry, addr) in report.entries().iter().zip(META) {
            assert_eq!(entry.role, Some(Role::Meta));
            assert_eq!(entry.outcome, Outcome::Success(format!("{} help []", addr)));
        }
    }

    #[tokio::test]
    async fn test_all_orders_meta_before_replica() {
        let (d, _) = dispatcher(FakeCluster::new(&META, &REPLICA));
        let report = d.run(&TargetSpec::new(RoleSet::All, "help")).await.unwrap();

        let expected: Vec<&str> = META.iter().chain(REPLICA.iter()).copied().collect();
        assert_eq!(labels(&report), expected);
        assert_eq!(report.success_count(), 6);
    }

    #[tokio::test]
    async fn test_arguments_forwarded_verbatim() {
        let (d, _) = dispatcher(FakeCluster::new(&META, &REPLICA));
        let target = TargetSpec::new(RoleSet::Replica, "flush-log")
            .node("10.0.0.6:34801")
            .arguments("  level=debug  extra ");
        let report = d.run(&target).await.unwrap();
        assert_eq!(
            report.entries()[0].outcome,
            Outcome::Success("10.0.0.6:34801 flush-log [  level=debug  extra ]".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_independent_of_response_jitter() {
        let mut first_render = None;
        for _ in 0..5 {
            let mut cluster = FakeCluster::new(&META, &REPLICA);
            let mut rng = rand::thread_rng();
            for addr in META.iter().chain(REPLICA.iter()) {
                let ms = rng.gen_range(0..500);
                cluster = cluster.with_delay(addr, Duration::from_millis(ms));
            }
            let (d, _) = dispatcher(cluster);
            let text = d
                .run_rendered(&TargetSpec::new(RoleSet::All, "help"))
                .await
                .unwrap();
            match &first_render {
                None => first_render = Some(text),
                Some(first) => assert_eq!(first, &text),
            }
        }
    }

    #[tokio::test]
    async fn test_connection_refusal_is_isolated() {
        let cluster = FakeCluster::new(&META, &REPLICA).with("10.0.0.2:34601", Behavior::Refuse);
        let (d, _) = dispatcher(cluster);
        let report = d.run(&TargetSpec::new(RoleSet::All, "help")).await.unwrap();

        assert_eq!(report.len(), 6);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(
            report.entries()[1].outcome,
            Outcome::Failure(DispatchError::Connection(
                "connection refused to 10.0.0.2:34601".to_string()
            ))
        );
        assert!(report.entries()[0].is_success());
        assert!(report.entries()[2].is_success());
    }

    #[tokio::test]
    async fn test_remote_error_passed_through() {
        let cluster = FakeCluster::new(&META, &REPLICA)
            .with("10.0.0.1:34601", Behavior::Remote("unknown command 'help'".to_string()));
        let (d, _) = dispatcher(cluster);
        let report = d.run(&TargetSpec::new(RoleSet::Meta, "help")).await.unwrap();
        assert_eq!(
            report.entries()[0].outcome,
            Outcome::Failure(DispatchError::Remote("unknown command 'help'".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_node_times_out_without_blocking_others() {
        let cluster = FakeCluster::new(&META, &REPLICA).with("10.0.0.3:34601", Behavior::Hang);
        let (d, _) = dispatcher(cluster);
        let started = tokio::time::Instant::now();
        let report = d.run(&TargetSpec::new(RoleSet::Meta, "help")).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(11));
        assert_eq!(report.success_count(), 2);
        assert_eq!(
            report.entries()[2].outcome,
            Outcome::Failure(DispatchError::Timeout { timeout_ms: 10_000 })
        );
    }

    #[tokio::test]
    async fn test_panicking_node_task_becomes_failure() {
        let cluster = FakeCluster::new(&META, &REPLICA).with("10.0.0.5:34801", Behavior::Panic);
        let (d, _) = dispatcher(cluster);
        let report = d.run(&TargetSpec::new(RoleSet::Replica, "help")).await.unwrap();

        assert_eq!(report.len(), 3);
        assert!(matches!(
            report.entries()[0].outcome,
            Outcome::Failure(DispatchError::TaskFailed(_))
        ));
        assert_eq!(report.entries()[0].label, "10.0.0.5:34801");
        assert_eq!(report.success_count(), 2);
    }

    #[tokio::test]
    async fn test_node_not_in_role_reports_single_entry_without_dispatch() {
        let (d, cluster) = dispatcher(FakeCluster::new(&META, &REPLICA));
        let target = TargetSpec::new(RoleSet::Replica, "help").node("10.0.0.1:34601");
        let report = d.run(&target).await.unwrap();

        assert_eq!(report.len(), 1);
        assert_eq!(
            report.entries()[0].outcome,
            Outcome::Failure(DispatchError::NodeNotFound {
                role: Role::Replica,
                node: "10.0.0.1:34601".to_string()
            })
        );
        assert_eq!(cluster.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_with_meta_node_reports_replica_not_found() {
        let (d, cluster) = dispatcher(FakeCluster::new(&META[..1], &REPLICA[..1]));
        let target = TargetSpec::new(RoleSet::All, "help").node("10.0.0.1:34601");
        let text = d.run_rendered(&target).await.unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "10.0.0.1:34601\tmeta\t10.0.0.1:34601 help []",
                "10.0.0.1:34601\treplica\tERROR: node 10.0.0.1:34601 not found in role replica",
            ]
        );
        assert_eq!(cluster.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_with_replica_node_reports_meta_not_found_first() {
        let (d, cluster) = dispatcher(FakeCluster::new(&META, &REPLICA));
        let target = TargetSpec::new(RoleSet::All, "help").node("10.0.0.7:34801");
        let report = d.run(&target).await.unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report.entries()[0].role, Some(Role::Meta));
        assert!(matches!(
            report.entries()[0].outcome,
            Outcome::Failure(DispatchError::NodeNotFound { role: Role::Meta, .. })
        ));
        assert_eq!(report.entries()[1].label, "10.0.0.7:34801");
        assert!(report.entries()[1].is_success());
        assert_eq!(cluster.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_membership_yields_synthetic_entry() {
        let (d, _) = dispatcher(FakeCluster::new(&[], &[]));
        let report = d.run(&TargetSpec::new(RoleSet::All, "help")).await.unwrap();
        assert_eq!(report.entries(), &[DispatchResult::no_matching_nodes()]);
    }

    #[tokio::test]
    async fn test_malformed_node_filter_fails_call() {
        let (d, cluster) = dispatcher(FakeCluster::new(&META, &REPLICA));
        let target = TargetSpec::new(RoleSet::Meta, "help").node("not-an-address");
        assert!(matches!(
            d.run(&target).await,
            Err(DispatchError::InvalidTarget(_))
        ));
        assert_eq!(cluster.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_read_only_command_is_repeatable() {
        let (d, _) = dispatcher(FakeCluster::new(&META, &REPLICA));
        let target = TargetSpec::new(RoleSet::All, "server-info");
        let first = d.run(&target).await.unwrap();
        let second = d.run(&target).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_failure_only_affects_that_node() {
        let mut names = HashMap::new();
        names.insert("10.0.0.1".parse().unwrap(), "meta1.local".to_string());
        names.insert("10.0.0.3".parse().unwrap(), "meta3.local".to_string());
        let lookup = FakeLookup {
            names,
            slow: vec!["10.0.0.3".parse().unwrap()],
        };
        let cluster = Arc::new(FakeCluster::new(&META, &REPLICA));
        let d = Dispatcher::new(cluster, Arc::new(lookup), DispatchTimeouts::default());

        let report = d
            .run(&TargetSpec::new(RoleSet::Meta, "help").resolve(true))
            .await
            .unwrap();
        assert_eq!(
            labels(&report),
            vec!["meta1.local:34601", "10.0.0.2:34601", "10.0.0.3:34601"]
        );
        assert_eq!(report.success_count(), 3);
    }

    #[tokio::test]
    async fn test_resolve_without_dns_keeps_literal_labels() {
        let (d, _) = dispatcher(FakeCluster::new(&META, &REPLICA));
        let report = d
            .run(&TargetSpec::new(RoleSet::All, "help").resolve(true))
            .await
            .unwrap();
        let expected: Vec<&str> = META.iter().chain(REPLICA.iter()).copied().collect();
        assert_eq!(labels(&report), expected);
        assert_eq!(report.success_count(), 6);
    }

    #[tokio::test]
    async fn test_resolve_maps_hostname_filter_to_member() {
        let mut names = HashMap::new();
        names.insert("10.0.0.6".parse().unwrap(), "replica6.local".to_string());
        let lookup = FakeLookup {
            names,
            slow: Vec::new(),
        };
        let cluster = Arc::new(FakeCluster::new(&META, &REPLICA));
        let d = Dispatcher::new(cluster, Arc::new(lookup), DispatchTimeouts::default());

        let target = TargetSpec::new(RoleSet::All, "help")
            .node("replica6.local:34801")
            .resolve(true);
        let report = d.run(&target).await.unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(
            report.entries()[0].outcome,
            Outcome::Failure(DispatchError::NodeNotFound {
                role: Role::Meta,
                node: "10.0.0.6:34801".to_string()
            })
        );
        assert_eq!(report.entries()[1].label, "replica6.local:34801");
        assert_eq!(report.entries()[1].role, Some(Role::Replica));
        assert!(report.entries()[1].is_success());
    }

    #[test]
    fn test_target_spec_blank_node_is_none() {
        let target = TargetSpec::new(RoleSet::Meta, "help").node("");
        assert_eq!(target.node, None);
    }
}
