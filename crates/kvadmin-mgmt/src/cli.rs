//! `kvadmin` command line.

use crate::cluster::RpcClusterClient;
use crate::config::AdminConfig;
use crate::dispatcher::{DispatchTimeouts, Dispatcher, TargetSpec};
use crate::node::RoleSet;
use crate::resolver::{DnsLookup, HostLookup, NoLookup};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Top-level arguments.
#[derive(Parser)]
#[command(name = "kvadmin")]
#[command(about = "Administrative client for meta and replica servers", long_about = None)]
pub struct Cli {
    /// Config file (TOML or JSON).
    #[arg(long, default_value = "/etc/kvadmin/admin.toml")]
    pub config: PathBuf,

    /// Meta server addresses, overriding the config file.
    #[arg(short, long, env = "KVADMIN_META_SERVERS", value_delimiter = ',')]
    pub meta: Vec<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Send remote command, for example `remote-command meta` or `remote-command replica`
    RemoteCommand {
        /// Which servers receive the command.
        #[command(subcommand)]
        target: RemoteTarget,
    },
}

/// `remote-command` targets.
#[derive(Subcommand, Clone, Debug)]
pub enum RemoteTarget {
    /// Send remote command to meta servers
    Meta(RemoteCommandArgs),
    /// Send remote command to replica servers
    Replica(RemoteCommandArgs),
    /// Send remote command to meta and replica servers
    All(RemoteCommandArgs),
}

impl RemoteTarget {
    /// Roles named by the subcommand.
    pub fn role_set(&self) -> RoleSet {
        match self {
            RemoteTarget::Meta(_) => RoleSet::Meta,
            RemoteTarget::Replica(_) => RoleSet::Replica,
            RemoteTarget::All(_) => RoleSet::All,
        }
    }

    /// Options shared by every target.
    pub fn args(&self) -> &RemoteCommandArgs {
        match self {
            RemoteTarget::Meta(args) | RemoteTarget::Replica(args) | RemoteTarget::All(args) => {
                args
            }
        }
    }

    /// Request for the dispatcher.
    pub fn to_target_spec(&self) -> TargetSpec {
        let args = self.args();
        TargetSpec::new(self.role_set(), args.command.clone())
            .node(args.node.clone())
            .arguments(args.arguments.clone())
            .resolve(args.resolve)
    }
}

/// Options of `remote-command <target>`.
#[derive(Args, Clone, Debug)]
pub struct RemoteCommandArgs {
    /// Resolve input or output address
    #[arg(short, long)]
    pub resolve: bool,

    /// Server node address, such as 127.0.0.1:34801; empty means all nodes
    #[arg(short, long, default_value = "")]
    pub node: String,

    /// Remote command name; `-c help` lists supported commands
    #[arg(short, long, default_value = "help")]
    pub command: String,

    /// Empty queries the current value, anything else sets it
    #[arg(short, long, default_value = "", allow_hyphen_values = true)]
    pub arguments: String,
}

impl Cli {
    /// Execute the parsed command, printing the report on stdout.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::RemoteCommand { ref target } => self.remote_command(target).await,
        }
    }

    fn load_config(&self) -> Result<AdminConfig> {
        let mut config = if self.config.exists() {
            AdminConfig::from_file(&self.config)?
        } else {
            tracing::debug!("Config file not found, using defaults: {}", self.config.display());
            AdminConfig::default()
        };
        if !self.meta.is_empty() {
            config.meta_servers = self.meta.clone();
        }
        Ok(config)
    }

    async fn remote_command(&self, target: &RemoteTarget) -> Result<()> {
        let config = self.load_config()?;
        let client = Arc::new(RpcClusterClient::connect(&config).await?);
        let spec = target.to_target_spec();

        let lookup: Arc<dyn HostLookup> = if spec.resolve {
            match DnsLookup::from_system_conf() {
                Ok(dns) => Arc::new(dns),
                Err(e) => {
                    tracing::warn!("DNS unavailable, labelling nodes by address: {}", e);
                    Arc::new(NoLookup)
                }
            }
        } else {
            Arc::new(NoLookup)
        };

        let dispatcher = Dispatcher::new(
            client,
            lookup,
            DispatchTimeouts {
                command: config.command_timeout(),
                resolve: config.resolve_timeout(),
            },
        );
        let output = dispatcher.run_rendered(&spec).await?;
        print!("{}", output);
        Ok(())
    }
}
