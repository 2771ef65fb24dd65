//! Component tree node.

use slotmap::new_key_type;
use smallvec::SmallVec;

new_key_type! {
    /// Unique identifier for a node in the component tree.
    pub struct NodeId;
}

/// Kind of node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    /// The single tree root. Always connected.
    Root,
    /// A component host such as `media-player`.
    Element,
}

/// A node in the component tree.
///
/// Nodes carry no behavior of their own; components attach to a node (their
/// "host") through the document's lifecycle and event APIs.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Lowercased tag, e.g. `media-player`.
    pub local_name: String,
    pub parent: Option<NodeId>,
    pub children: SmallVec<[NodeId; 4]>,
    /// Attached, transitively, to the root.
    pub connected: bool,
}

impl Node {
    pub fn new_document(id: NodeId) -> Self {
        Self {
            id,
            node_type: NodeType::Root,
            local_name: "#root".to_string(),
            parent: None,
            children: SmallVec::new(),
            connected: true,
        }
    }

    pub fn new_element(id: NodeId, local_name: &str) -> Self {
        Self {
            id,
            node_type: NodeType::Element,
            local_name: local_name.to_ascii_lowercase(),
            parent: None,
            children: SmallVec::new(),
            connected: false,
        }
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }
}
