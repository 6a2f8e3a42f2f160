//! Organization hierarchy
//!
//! The hierarchy is held as an arena: a flat map from node id to node, each
//! node owning the ordered ids of its children. Lookups are O(1) and no
//! traversal recurses, so deep hierarchies cannot exhaust the stack.
//!
//! A tree is built wholesale from one payload and never modified afterwards.
//! Construction either yields a complete single-rooted acyclic tree or fails
//! with [`DashboardError::Parse`]; a partially built tree is never returned.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{DashboardError, Result};
use crate::transport::RiskBackend;
use crate::types::{HierarchyPayload, NodeId};

/// Maximum nesting depth accepted from a payload.
pub const MAX_DEPTH: usize = 1000;

/// One organizational unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgNode {
    pub id: NodeId,
    pub name: String,
    /// Child ids, in payload order
    pub children: Vec<NodeId>,
}

/// Immutable organization hierarchy.
#[derive(Debug, Clone)]
pub struct OrgTree {
    root: NodeId,
    nodes: HashMap<NodeId, OrgNode>,
}

impl OrgTree {
    /// Fetch the hierarchy from the backend and build the tree.
    pub async fn load<B: RiskBackend + ?Sized>(backend: &B) -> Result<Self> {
        let payload = backend.fetch_hierarchy().await?;
        let tree = Self::from_payload(&payload)?;
        info!(root = tree.root, nodes = tree.len(), "Loaded org hierarchy");
        Ok(tree)
    }

    /// Build from either payload shape.
    pub fn from_payload(payload: &HierarchyPayload) -> Result<Self> {
        match payload {
            HierarchyPayload::Nested(value) => Self::from_nested(value),
            HierarchyPayload::Flat(value) => Self::from_flat(value),
        }
    }

    /// Build from a nested `{id, name, children}` tree.
    ///
    /// A one-element array is accepted as the root; longer arrays are
    /// rejected as multiple roots.
    pub fn from_nested(value: &Value) -> Result<Self> {
        let root_value = match value {
            Value::Array(items) => match items.as_slice() {
                [] => return Err(parse_error("empty hierarchy")),
                [single] => single,
                _ => {
                    return Err(parse_error(format!(
                        "expected a single root, found {}",
                        items.len()
                    )))
                }
            },
            other => other,
        };

        let mut nodes: HashMap<NodeId, OrgNode> = HashMap::new();
        let mut root = None;
        // (node value, parent id, depth)
        let mut stack: Vec<(&Value, Option<NodeId>, usize)> = vec![(root_value, None, 0)];

        while let Some((node_value, parent, depth)) = stack.pop() {
            if depth >= MAX_DEPTH {
                return Err(parse_error(format!(
                    "hierarchy deeper than {} levels",
                    MAX_DEPTH
                )));
            }

            let obj = node_value
                .as_object()
                .ok_or_else(|| parse_error(format!("node entry is not an object: {}", node_value)))?;
            let id = obj
                .get("id")
                .and_then(Value::as_i64)
                .ok_or_else(|| parse_error(format!("node without integer id: {}", node_value)))?;
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| parse_error(format!("node {} has no name", id)))?;

            let children: &[Value] = match obj.get("children") {
                None | Some(Value::Null) => &[],
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(parse_error(format!(
                        "node {} has non-array children: {}",
                        id, other
                    )))
                }
            };

            if nodes.contains_key(&id) {
                return Err(parse_error(format!("duplicate node id {}", id)));
            }

            match parent {
                Some(parent_id) => {
                    if let Some(parent_node) = nodes.get_mut(&parent_id) {
                        parent_node.children.push(id);
                    }
                }
                None => root = Some(id),
            }

            nodes.insert(
                id,
                OrgNode {
                    id,
                    name: name.to_string(),
                    children: Vec::with_capacity(children.len()),
                },
            );

            // Reverse so the first child is processed (and linked) first
            for child in children.iter().rev() {
                stack.push((child, Some(id), depth + 1));
            }
        }

        let root = root.ok_or_else(|| parse_error("empty hierarchy"))?;
        Ok(Self { root, nodes })
    }

    /// Build from a flat `[{id, name, parent_id}]` listing.
    ///
    /// Exactly one entry must have no parent. Every parent reference must
    /// resolve, and every node must be reachable from the root (anything
    /// unreachable sits on a cycle).
    pub fn from_flat(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| parse_error("flat hierarchy is not an array"))?;

        let mut nodes: HashMap<NodeId, OrgNode> = HashMap::with_capacity(items.len());
        let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
        let mut roots: Vec<NodeId> = Vec::new();

        for item in items {
            let obj = item
                .as_object()
                .ok_or_else(|| parse_error(format!("node entry is not an object: {}", item)))?;
            let id = obj
                .get("id")
                .and_then(Value::as_i64)
                .ok_or_else(|| parse_error(format!("node without integer id: {}", item)))?;
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| parse_error(format!("node {} has no name", id)))?;

            match obj.get("parent_id") {
                None | Some(Value::Null) => roots.push(id),
                Some(parent) => {
                    let parent_id = parent.as_i64().ok_or_else(|| {
                        parse_error(format!("node {} has non-integer parent_id: {}", id, parent))
                    })?;
                    edges.push((parent_id, id));
                }
            }

            let previous = nodes.insert(
                id,
                OrgNode {
                    id,
                    name: name.to_string(),
                    children: Vec::new(),
                },
            );
            if previous.is_some() {
                return Err(parse_error(format!("duplicate node id {}", id)));
            }
        }

        let root = match roots.as_slice() {
            [single] => *single,
            [] if nodes.is_empty() => return Err(parse_error("empty hierarchy")),
            [] => return Err(parse_error("no root node (every node has a parent)")),
            many => {
                return Err(parse_error(format!(
                    "expected a single root, found {} ({:?})",
                    many.len(),
                    many
                )))
            }
        };

        for (parent_id, child_id) in edges {
            match nodes.get_mut(&parent_id) {
                Some(parent) => parent.children.push(child_id),
                None => {
                    return Err(parse_error(format!(
                        "node {} references nonexistent parent {}",
                        child_id, parent_id
                    )))
                }
            }
        }

        let tree = Self { root, nodes };

        // Single root + one parent per node: anything unreachable is on a cycle.
        let mut reached = 0usize;
        for (depth, _) in tree.preorder() {
            if depth >= MAX_DEPTH {
                return Err(parse_error(format!(
                    "hierarchy deeper than {} levels",
                    MAX_DEPTH
                )));
            }
            reached += 1;
        }
        if reached != tree.nodes.len() {
            let reachable: HashSet<NodeId> = tree.preorder().map(|(_, n)| n.id).collect();
            let mut stranded: Vec<NodeId> = tree
                .nodes
                .keys()
                .filter(|id| !reachable.contains(id))
                .copied()
                .collect();
            stranded.sort_unstable();
            return Err(parse_error(format!(
                "cycle detected among nodes {:?}",
                stranded
            )));
        }

        debug!(nodes = tree.len(), "Built hierarchy from flat listing");
        Ok(tree)
    }

    /// The built-in static hierarchy, used when no live source is configured.
    pub fn fixture() -> Self {
        let layout: [(NodeId, &str, &[NodeId]); 6] = [
            (1, "Root", &[2, 5]),
            (2, "Division A", &[3, 4]),
            (3, "BU 1", &[]),
            (4, "BU 2", &[]),
            (5, "Division B", &[6]),
            (6, "BU 3", &[]),
        ];

        let nodes = layout
            .into_iter()
            .map(|(id, name, children)| {
                (
                    id,
                    OrgNode {
                        id,
                        name: name.to_string(),
                        children: children.to_vec(),
                    },
                )
            })
            .collect();

        Self { root: 1, nodes }
    }

    /// Root node id.
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// Root node.
    pub fn root(&self) -> &OrgNode {
        &self.nodes[&self.root]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Look up a node by id.
    pub fn find_by_id(&self, id: NodeId) -> Result<&OrgNode> {
        self.nodes.get(&id).ok_or(DashboardError::NodeNotFound(id))
    }

    /// Direct children of a node, in order.
    pub fn children(&self, id: NodeId) -> Result<impl Iterator<Item = &OrgNode> + '_> {
        let node = self.find_by_id(id)?;
        Ok(node.children.iter().filter_map(move |c| self.nodes.get(c)))
    }

    /// All ids in the subtree rooted at `id`, including `id` itself.
    pub fn descendant_ids(&self, id: NodeId) -> Result<BTreeSet<NodeId>> {
        let start = self.find_by_id(id)?;
        let mut ids = BTreeSet::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if !ids.insert(node.id) {
                continue;
            }
            stack.extend(node.children.iter().filter_map(|c| self.nodes.get(c)));
        }

        Ok(ids)
    }

    /// Pre-order walk from the root, children in payload order.
    /// Yields `(depth, node)` with the root at depth 0.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: self.nodes.get(&self.root).map(|n| (0, n)).into_iter().collect(),
            seen: HashSet::new(),
        }
    }
}

/// Pre-order iterator over an [`OrgTree`].
pub struct Preorder<'a> {
    tree: &'a OrgTree,
    stack: Vec<(usize, &'a OrgNode)>,
    seen: HashSet<NodeId>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = (usize, &'a OrgNode);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (depth, node) = self.stack.pop()?;
            // Guards the cycle check in from_flat, which walks before validating.
            if !self.seen.insert(node.id) {
                continue;
            }
            for child in node.children.iter().rev() {
                if let Some(child_node) = self.tree.nodes.get(child) {
                    self.stack.push((depth + 1, child_node));
                }
            }
            return Some((depth, node));
        }
    }
}

/// The built-in static hierarchy in its nested wire shape.
pub fn fixture_payload() -> Value {
    json!({
        "name": "Root", "id": 1, "children": [
            { "name": "Division A", "id": 2, "children": [
                { "name": "BU 1", "id": 3 },
                { "name": "BU 2", "id": 4 }
            ]},
            { "name": "Division B", "id": 5, "children": [
                { "name": "BU 3", "id": 6 }
            ]}
        ]
    })
}

fn parse_error(message: impl Into<String>) -> DashboardError {
    DashboardError::Parse(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        fixture_payload()
    }

    #[test]
    fn test_nested_find_every_node() {
        let tree = OrgTree::from_nested(&sample()).unwrap();
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.root_id(), 1);

        for id in 1..=6 {
            assert_eq!(tree.find_by_id(id).unwrap().id, id);
        }
        assert_eq!(tree.find_by_id(2).unwrap().name, "Division A");
        assert_eq!(tree.find_by_id(2).unwrap().children, vec![3, 4]);
    }

    #[test]
    fn test_descendants_of_root_is_full_set() {
        let tree = OrgTree::from_nested(&sample()).unwrap();
        let all: BTreeSet<NodeId> = (1..=6).collect();
        assert_eq!(tree.descendant_ids(1).unwrap(), all);
        assert_eq!(
            tree.descendant_ids(2).unwrap(),
            BTreeSet::from([2, 3, 4])
        );
        assert_eq!(tree.descendant_ids(6).unwrap(), BTreeSet::from([6]));
    }

    #[test]
    fn test_find_missing_node() {
        let tree = OrgTree::fixture();
        assert!(matches!(
            tree.find_by_id(99),
            Err(DashboardError::NodeNotFound(99))
        ));
        assert!(matches!(
            tree.descendant_ids(99),
            Err(DashboardError::NodeNotFound(99))
        ));
    }

    #[test]
    fn test_preorder_is_deterministic() {
        let tree = OrgTree::from_nested(&sample()).unwrap();
        let order: Vec<(usize, NodeId)> = tree.preorder().map(|(d, n)| (d, n.id)).collect();
        assert_eq!(order, vec![(0, 1), (1, 2), (2, 3), (2, 4), (1, 5), (2, 6)]);

        let again: Vec<(usize, NodeId)> = tree.preorder().map(|(d, n)| (d, n.id)).collect();
        assert_eq!(order, again);
    }

    #[test]
    fn test_fixture_matches_nested_sample() {
        let fixture = OrgTree::fixture();
        let parsed = OrgTree::from_nested(&sample()).unwrap();
        let a: Vec<_> = fixture.preorder().map(|(d, n)| (d, n.clone())).collect();
        let b: Vec<_> = parsed.preorder().map(|(d, n)| (d, n.clone())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_nested_rejects_duplicate_ids() {
        let payload = json!({"id": 1, "name": "Root", "children": [
            {"id": 2, "name": "A"},
            {"id": 2, "name": "B"}
        ]});
        let err = OrgTree::from_nested(&payload).unwrap_err();
        assert!(matches!(err, DashboardError::Parse(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn test_nested_rejects_multiple_roots() {
        let payload = json!([{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]);
        assert!(matches!(
            OrgTree::from_nested(&payload),
            Err(DashboardError::Parse(_))
        ));
    }

    #[test]
    fn test_nested_accepts_single_element_array() {
        let payload = json!([{"id": 1, "name": "Root"}]);
        let tree = OrgTree::from_nested(&payload).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_nested_rejects_dangling_child() {
        let payload = json!({"id": 1, "name": "Root", "children": [42]});
        assert!(matches!(
            OrgTree::from_nested(&payload),
            Err(DashboardError::Parse(_))
        ));

        let payload = json!({"id": 1, "name": "Root", "children": [{"name": "no id"}]});
        assert!(matches!(
            OrgTree::from_nested(&payload),
            Err(DashboardError::Parse(_))
        ));
    }

    #[test]
    fn test_nested_rejects_excessive_depth() {
        let mut payload = json!({"id": MAX_DEPTH as i64, "name": "leaf"});
        for id in (0..MAX_DEPTH as i64).rev() {
            payload = json!({"id": id, "name": "n", "children": [payload]});
        }
        let err = OrgTree::from_nested(&payload).unwrap_err();
        assert!(matches!(err, DashboardError::Parse(ref m) if m.contains("deeper")));
    }

    #[test]
    fn test_flat_builds_tree_in_listing_order() {
        let payload = json!([
            {"id": 1, "name": "Root", "parent_id": null, "level": 1},
            {"id": 5, "name": "Division B", "parent_id": 1},
            {"id": 2, "name": "Division A", "parent_id": 1},
            {"id": 3, "name": "BU 1", "parent_id": 2}
        ]);
        let tree = OrgTree::from_flat(&payload).unwrap();
        assert_eq!(tree.root_id(), 1);
        assert_eq!(tree.find_by_id(1).unwrap().children, vec![5, 2]);
        assert_eq!(tree.descendant_ids(2).unwrap(), BTreeSet::from([2, 3]));
    }

    #[test]
    fn test_flat_rejects_two_roots() {
        let payload = json!([
            {"id": 1, "name": "A"},
            {"id": 2, "name": "B", "parent_id": null}
        ]);
        let err = OrgTree::from_flat(&payload).unwrap_err();
        assert!(matches!(err, DashboardError::Parse(ref m) if m.contains("single root")));
    }

    #[test]
    fn test_flat_rejects_nonexistent_parent() {
        let payload = json!([
            {"id": 1, "name": "Root"},
            {"id": 2, "name": "Orphan", "parent_id": 77}
        ]);
        let err = OrgTree::from_flat(&payload).unwrap_err();
        assert!(matches!(err, DashboardError::Parse(ref m) if m.contains("nonexistent parent 77")));
    }

    #[test]
    fn test_flat_rejects_cycle() {
        let payload = json!([
            {"id": 1, "name": "Root"},
            {"id": 2, "name": "A", "parent_id": 3},
            {"id": 3, "name": "B", "parent_id": 2}
        ]);
        let err = OrgTree::from_flat(&payload).unwrap_err();
        assert!(matches!(err, DashboardError::Parse(ref m) if m.contains("cycle")));
    }

    #[test]
    fn test_flat_rejects_self_parent() {
        let payload = json!([
            {"id": 1, "name": "Root"},
            {"id": 2, "name": "Loop", "parent_id": 2}
        ]);
        assert!(matches!(
            OrgTree::from_flat(&payload),
            Err(DashboardError::Parse(_))
        ));
    }
}
