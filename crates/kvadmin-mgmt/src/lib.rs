#![warn(missing_docs)]

//! kvadmin management subsystem: remote-command dispatch to meta and replica
//! servers, cluster client, configuration and the admin CLI.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod node;
pub mod report;
pub mod resolver;
pub mod selector;
pub mod sender;

pub use cluster::{ClusterClient, ClusterError, RpcClusterClient};
pub use config::AdminConfig;
pub use dispatcher::{DispatchTimeouts, Dispatcher, TargetSpec};
pub use error::DispatchError;
pub use node::{NodeAddress, Role, RoleSet};
pub use report::{render, DispatchResult, Outcome, Report};
pub use resolver::{AddressResolver, DnsLookup, HostLookup, NoLookup};
pub use selector::{select, Selection, Slot};
pub use sender::CommandSender;
