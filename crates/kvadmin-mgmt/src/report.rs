//! Per-node dispatch results and their text rendering.

use crate::error::DispatchError;
use crate::node::{NodeAddress, Role};

/// What happened on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Response text, verbatim.
    Success(String),
    /// The node, or the request for it, failed.
    Failure(DispatchError),
    /// Nothing matched the request; not an error.
    NoMatchingNodes,
}

/// One report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    /// Node contacted; `None` for synthetic rows.
    pub node: Option<NodeAddress>,
    /// Role group of the row; `None` only for "no matching nodes".
    pub role: Option<Role>,
    /// Address or hostname shown in the first column.
    pub label: String,
    /// Result for the row.
    pub outcome: Outcome,
}

impl DispatchResult {
    /// Row for a contacted node.
    pub fn for_node(node: NodeAddress, label: String, outcome: Outcome) -> Self {
        Self {
            role: Some(node.role()),
            node: Some(node),
            label,
            outcome,
        }
    }

    /// Row for a filter that matched no member of `role`.
    pub fn node_not_found(role: Role, node: &str) -> Self {
        Self {
            node: None,
            role: Some(role),
            label: node.to_string(),
            outcome: Outcome::Failure(DispatchError::NodeNotFound {
                role,
                node: node.to_string(),
            }),
        }
    }

    /// The single row of an empty selection.
    pub fn no_matching_nodes() -> Self {
        Self {
            node: None,
            role: None,
            label: "-".to_string(),
            outcome: Outcome::NoMatchingNodes,
        }
    }

    /// Whether the node answered.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// Whether the row carries an error.
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failure(_))
    }
}

/// Ordered results of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    entries: Vec<DispatchResult>,
}

impl Report {
    /// Wrap rows already in dispatch order.
    pub fn new(entries: Vec<DispatchResult>) -> Self {
        Self { entries }
    }

    /// Rows in dispatch order.
    pub fn entries(&self) -> &[DispatchResult] {
        &self.entries
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows with a response.
    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }

    /// Rows with an error.
    pub fn failure_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_failure()).count()
    }
}

impl IntoIterator for Report {
    type Item = DispatchResult;
    type IntoIter = std::vec::IntoIter<DispatchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Render one `<label>\t<role>\t<outcome>` line per entry, in report order.
///
/// Response text is kept verbatim apart from trailing newlines; failures are
/// prefixed with `ERROR: `.
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    for entry in report.entries() {
        let role = entry.role.map(|r| r.as_str()).unwrap_or("-");
        let outcome = match &entry.outcome {
            Outcome::Success(text) => text.trim_end_matches(['\r', '\n']).to_string(),
            Outcome::Failure(e) => format!("ERROR: {}", e),
            Outcome::NoMatchingNodes => "no matching nodes".to_string(),
        };
        out.push_str(&entry.label);
        out.push('\t');
        out.push_str(role);
        out.push('\t');
        out.push_str(&outcome);
        out.push('\n');
    }
    out
}
