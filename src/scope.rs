//! Scope resolution
//!
//! Turns a node selection into the concrete set of nodes whose records
//! belong in a query. A single-node scope and an explicit id set are kept
//! as distinct variants so downstream code never has to guess which
//! convention it was handed.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};
use crate::tree::OrgTree;
use crate::types::NodeId;

/// How far below the selected node a scope reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// Exactly the selected node (dashboard default)
    #[default]
    SelfOnly,
    /// The selected node and its whole subtree (rollup)
    SelfAndDescendants,
}

/// The organizational scope a query or view pertains to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InsightScope {
    /// Everything, regardless of node
    Global,
    /// A single node
    Node { node_id: NodeId },
    /// A node and its descendants, as an explicit id set
    Subtree {
        root: NodeId,
        node_ids: BTreeSet<NodeId>,
    },
}

impl InsightScope {
    pub fn global() -> Self {
        InsightScope::Global
    }

    pub fn node(node_id: NodeId) -> Self {
        InsightScope::Node { node_id }
    }

    /// Whether records anchored at `node_id` fall inside this scope.
    pub fn contains(&self, node_id: NodeId) -> bool {
        match self {
            InsightScope::Global => true,
            InsightScope::Node { node_id: id } => *id == node_id,
            InsightScope::Subtree { node_ids, .. } => node_ids.contains(&node_id),
        }
    }

    /// The node to pass as a server-side filter, if the scope is one node.
    pub fn single_node(&self) -> Option<NodeId> {
        match self {
            InsightScope::Node { node_id } => Some(*node_id),
            _ => None,
        }
    }

    /// Node ids covered by this scope; `None` for the global scope.
    pub fn node_ids(&self) -> Option<BTreeSet<NodeId>> {
        match self {
            InsightScope::Global => None,
            InsightScope::Node { node_id } => Some(BTreeSet::from([*node_id])),
            InsightScope::Subtree { node_ids, .. } => Some(node_ids.clone()),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, InsightScope::Global)
    }

    /// Check every node this scope names exists in `tree`.
    pub fn validate(&self, tree: &OrgTree) -> Result<()> {
        match self {
            InsightScope::Global => Ok(()),
            InsightScope::Node { node_id } => tree.find_by_id(*node_id).map(|_| ()),
            InsightScope::Subtree { root, node_ids } => {
                tree.find_by_id(*root)?;
                match node_ids.iter().find(|id| !tree.contains(**id)) {
                    Some(missing) => Err(DashboardError::NodeNotFound(*missing)),
                    None => Ok(()),
                }
            }
        }
    }
}

impl fmt::Display for InsightScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightScope::Global => write!(f, "global"),
            InsightScope::Node { node_id } => write!(f, "node {}", node_id),
            InsightScope::Subtree { root, node_ids } => {
                write!(f, "subtree {} ({} nodes)", root, node_ids.len())
            }
        }
    }
}

/// Resolve a selection into a scope.
///
/// Fails with [`DashboardError::NodeNotFound`] if `selected` is not in `tree`.
pub fn resolve(tree: &OrgTree, selected: NodeId, mode: ScopeMode) -> Result<InsightScope> {
    tree.find_by_id(selected)?;

    Ok(match mode {
        ScopeMode::SelfOnly => InsightScope::node(selected),
        ScopeMode::SelfAndDescendants => InsightScope::Subtree {
            root: selected,
            node_ids: tree.descendant_ids(selected)?,
        },
    })
}
