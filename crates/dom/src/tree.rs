//! Component tree implementation.

use crate::node::{Node, NodeId};
use common::{PlayerError, PlayerResult};
use slotmap::SlotMap;

/// Nodes whose connected state changed as the result of a tree mutation.
///
/// Both lists are in tree order, so ancestors always come before their
/// descendants.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeMutation {
    /// Nodes that left the document.
    pub disconnected: Vec<NodeId>,
    /// Nodes that joined the document.
    pub connected: Vec<NodeId>,
}

impl TreeMutation {
    pub fn is_empty(&self) -> bool {
        self.disconnected.is_empty() && self.connected.is_empty()
    }
}

/// Parent/child structure of the component tree plus connected flags.
///
/// The tree knows nothing about hooks or listeners; mutations report which
/// nodes changed connected state and [`Document`](crate::Document) runs the
/// callbacks.
pub struct DomTree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}

impl DomTree {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert_with_key(Node::new_document);
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, local_name: &str) -> NodeId {
        self.nodes
            .insert_with_key(|id| Node::new_element(id, local_name))
    }

    /// Append `child` under `parent`, detaching it from its old parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> PlayerResult<TreeMutation> {
        if !self.nodes.contains_key(parent) {
            return Err(PlayerError::not_found("parent node"));
        }
        if !self.nodes.contains_key(child) {
            return Err(PlayerError::not_found("child node"));
        }
        if self.contains(child, parent) {
            return Err(PlayerError::invalid("cannot append a node into its own subtree"));
        }

        let disconnected = self.remove_from_parent(child);
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);

        let connected = if self.nodes[parent].connected {
            self.set_connected(child, true)
        } else {
            Vec::new()
        };
        Ok(TreeMutation {
            disconnected,
            connected,
        })
    }

    /// Detach a node from its parent, keeping it alive for re-insertion.
    /// Returns the nodes that left the document.
    pub fn remove_from_parent(&mut self, node: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return Vec::new();
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|id| *id != node);
        }
        if self.is_connected(node) {
            self.set_connected(node, false)
        } else {
            Vec::new()
        }
    }

    /// Drop a node and its subtree. The root cannot be removed.
    pub fn remove(&mut self, node: NodeId) -> Vec<NodeId> {
        if node == self.root {
            return Vec::new();
        }
        let disconnected = self.remove_from_parent(node);
        for id in self.subtree(node) {
            self.nodes.remove(id);
        }
        disconnected
    }

    /// Flip the connected flag for a subtree, returning the nodes that changed.
    fn set_connected(&mut self, node: NodeId, connected: bool) -> Vec<NodeId> {
        let mut changed = self.subtree(node);
        changed.retain(|&id| {
            let node = &mut self.nodes[id];
            let flipped = node.connected != connected;
            node.connected = connected;
            flipped
        });
        changed
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.nodes.get(node).is_some_and(|n| n.connected)
    }

    /// Inclusive descendant check: `true` when `node` is `ancestor` or lies
    /// beneath it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.nodes.contains_key(node)
            && (node == ancestor || self.ancestors(node).any(|id| id == ancestor))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(node)
            .into_iter()
            .flat_map(|n| n.children.iter().copied())
    }

    /// Ancestors, nearest first.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |&id| self.parent(id))
    }

    /// Descendants in tree order, excluding `node`.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut subtree = self.subtree(node);
        if !subtree.is_empty() {
            subtree.remove(0);
        }
        subtree
    }

    /// `node` followed by its descendants in tree order.
    fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            let Some(n) = self.nodes.get(id) else {
                continue;
            };
            order.push(id);
            pending.extend(n.children.iter().rev().copied());
        }
        order
    }

    /// Connected elements with the given local name, in tree order.
    pub fn find_elements_by_local_name(&self, local_name: &str) -> Vec<NodeId> {
        let name = local_name.to_ascii_lowercase();
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| self.nodes[id].is_element() && self.nodes[id].local_name == name)
            .collect()
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Only the root is left.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tree_has_connected_root() {
        let tree = DomTree::new();
        assert!(tree.is_connected(tree.root()));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_append_child_connects_subtree_in_tree_order() {
        let mut tree = DomTree::new();
        let root = tree.root();

        let player = tree.create_element("media-player");
        let button = tree.create_element("media-play-button");
        tree.append_child(player, button).unwrap();
        assert!(!tree.is_connected(button));

        let mutation = tree.append_child(root, player).unwrap();
        assert_eq!(mutation.connected, vec![player, button]);
        assert!(mutation.disconnected.is_empty());
        assert!(tree.is_connected(button));
        assert_eq!(tree.parent(player), Some(root));
    }

    #[test]
    fn test_moving_connected_node_reports_both_transitions() {
        let mut tree = DomTree::new();
        let root = tree.root();
        let a = tree.create_element("div");
        let b = tree.create_element("div");
        let child = tree.create_element("span");
        tree.append_child(root, a).unwrap();
        tree.append_child(root, b).unwrap();
        tree.append_child(a, child).unwrap();

        let mutation = tree.append_child(b, child).unwrap();
        assert_eq!(mutation.disconnected, vec![child]);
        assert_eq!(mutation.connected, vec![child]);
        assert_eq!(tree.parent(child), Some(b));
        assert_eq!(tree.children(a).count(), 0);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let mut tree = DomTree::new();
        let root = tree.root();
        let outer = tree.create_element("div");
        let inner = tree.create_element("div");
        tree.append_child(root, outer).unwrap();
        tree.append_child(outer, inner).unwrap();

        assert!(tree.contains(outer, inner));
        assert!(tree.contains(outer, outer));
        assert!(!tree.contains(inner, outer));
    }

    #[test]
    fn test_append_into_own_subtree_is_rejected() {
        let mut tree = DomTree::new();
        let outer = tree.create_element("div");
        let inner = tree.create_element("div");
        tree.append_child(outer, inner).unwrap();

        let result = tree.append_child(inner, outer);
        assert!(matches!(result, Err(PlayerError::InvalidOperation(_))));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut tree = DomTree::new();
        let root = tree.root();

        let player = tree.create_element("media-player");
        let provider = tree.create_element("media-provider");
        tree.append_child(root, player).unwrap();
        tree.append_child(player, provider).unwrap();
        assert_eq!(tree.len(), 3);

        let disconnected = tree.remove(player);
        assert_eq!(disconnected, vec![player, provider]);
        assert!(tree.get(provider).is_none());
        assert!(tree.is_empty());
        assert!(tree.remove(root).is_empty());
    }

    #[test]
    fn test_find_by_local_name() {
        let mut tree = DomTree::new();
        let root = tree.root();
        let a = tree.create_element("media-player");
        let b = tree.create_element("MEDIA-PLAYER");
        let detached = tree.create_element("media-player");
        tree.append_child(root, a).unwrap();
        tree.append_child(a, b).unwrap();

        let found = tree.find_elements_by_local_name("media-player");
        assert_eq!(found, vec![a, b]);
        assert!(!found.contains(&detached));
    }
}
