//! Turns a role set and an optional node filter into the ordered dispatch list.

use crate::cluster::ClusterClient;
use crate::error::DispatchError;
use crate::node::{split_host_port, NodeAddress, Role};

/// One position in the dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Send to this node.
    Node(NodeAddress),
    /// The node filter matched nothing in `role`; reported, never sent.
    Missing {
        /// Role that lacks the node.
        role: Role,
        /// The filter as given.
        node: String,
    },
}

/// Ordered selection, role-grouped in the order the roles were requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Slots in dispatch order.
    pub slots: Vec<Slot>,
}

impl Selection {
    /// Nodes that will actually be contacted.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeAddress> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Node(node) => Some(node),
            Slot::Missing { .. } => None,
        })
    }

    /// Number of nodes to contact.
    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// No nodes and no misses.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Select the nodes for `roles`, optionally narrowed to `explicit`.
///
/// With a filter, each requested role contributes either the matching member
/// or a `Missing` slot in that role's position. A miss never aborts the other
/// roles.
pub fn select(
    client: &dyn ClusterClient,
    roles: &[Role],
    explicit: Option<&str>,
) -> Result<Selection, DispatchError> {
    let explicit = explicit.map(str::trim).filter(|s| !s.is_empty());
    if roles.is_empty() && explicit.is_none() {
        return Err(DispatchError::InvalidTarget(
            "no role and no node given".to_string(),
        ));
    }

    let Some(filter) = explicit else {
        let slots = roles
            .iter()
            .flat_map(|role| client.nodes(*role))
            .map(Slot::Node)
            .collect();
        return Ok(Selection { slots });
    };

    if split_host_port(filter).is_none() {
        return Err(DispatchError::InvalidTarget(format!(
            "node '{}' is not a host:port address",
            filter
        )));
    }

    let slots = roles
        .iter()
        .map(|role| {
            client
                .nodes(*role)
                .into_iter()
                .find(|n| n.matches(filter))
                .map(Slot::Node)
                .unwrap_or_else(|| Slot::Missing {
                    role: *role,
                    node: filter.to_string(),
                })
        })
        .collect();
    Ok(Selection { slots })
}
