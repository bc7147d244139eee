//! One-shot command delivery to a single node.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cluster::ClusterClient;
use crate::error::DispatchError;
use crate::node::NodeAddress;

/// Sends one remote command to one node, once, within `timeout`.
#[derive(Clone)]
pub struct CommandSender {
    client: Arc<dyn ClusterClient>,
    timeout: Duration,
}

impl CommandSender {
    /// Sender using `client`, bounded by `timeout` per call.
    pub fn new(client: Arc<dyn ClusterClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Returns the node's response text. The argument string is forwarded
    /// untouched.
    pub async fn send(
        &self,
        node: &NodeAddress,
        command: &str,
        arguments: &str,
    ) -> Result<String, DispatchError> {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            self.timeout,
            self.client.call_remote_command(node, command, arguments),
        )
        .await
        .unwrap_or(Err(DispatchError::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }));
        debug!(
            node = %node,
            command,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "remote command finished"
        );
        result
    }
}
