//! Tree data structures for selector matching
//!
//! Nodes live in an arena owned by [`Tree`] and refer to each other by
//! [`NodeId`]. A tree may hold several top-level nodes (an HTML document
//! parsed into a forest, for example); each of them roots its own subtree.

use rustc_hash::FxHashMap;
use thiserror::Error;

/// Index of a node in its tree's arena
pub type NodeId = usize;

/// Error while building a tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Tree error: node {0} does not exist")]
    NodeNotFound(NodeId),

    #[error("Tree error: node {0} already has a parent")]
    AlreadyAttached(NodeId),

    #[error("Tree error: attaching {child} under {parent} would create a cycle")]
    Cycle { child: NodeId, parent: NodeId },
}

/// An element in a document tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub tag: String,
    /// Value of the `id` attribute, empty if absent
    pub id: String,
    /// Tokens of the `class` attribute
    pub class: Vec<String>,
    pub attr: FxHashMap<String, String>,
    /// Trimmed text content, concatenated
    pub text: String,
    /// Trimmed text content, one entry per text run
    pub text_parts: Vec<String>,
    /// Serialized markup of the node and its subtree, empty for nodes built
    /// by hand
    pub raw: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    /// Create a detached node with the given tag and no attributes
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    /// Builder form of [`Node::set_attr`]
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Set an attribute. `id` and `class` also refresh the cached id and
    /// class list.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        match name {
            "id" => self.id = value.to_string(),
            "class" => {
                self.class = value.split_whitespace().map(str::to_string).collect();
            }
            _ => {}
        }
        self.attr.insert(name.to_string(), value.to_string());
    }

    /// Get an attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attr.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class.iter().any(|c| c == class)
    }

    /// Append a run of text. Surrounding whitespace is trimmed and empty
    /// runs are ignored.
    pub fn push_text(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.text.push_str(text);
            self.text_parts.push(text.to_string());
        }
    }
}

/// An arena of nodes forming one or more rooted trees
#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Tree {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached node. It becomes a top-level node until it is given a
    /// parent.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = self.nodes.len();
        node.parent = None;
        node.children.clear();
        self.nodes.push(node);
        self.roots.push(id);
        id
    }

    /// Add a node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, node: Node) -> Result<NodeId, TreeError> {
        if parent >= self.nodes.len() {
            return Err(TreeError::NodeNotFound(parent));
        }
        // A fresh node has no descendants, so no cycle check is needed
        let id = self.add_node(node);
        self.roots.pop();
        self.nodes[id].parent = Some(parent);
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Attach a top-level node under `parent`
    pub fn set_parent(&mut self, child_id: NodeId, parent_id: NodeId) -> Result<(), TreeError> {
        let child = self
            .nodes
            .get(child_id)
            .ok_or(TreeError::NodeNotFound(child_id))?;
        if child.parent.is_some() {
            return Err(TreeError::AlreadyAttached(child_id));
        }
        if parent_id >= self.nodes.len() {
            return Err(TreeError::NodeNotFound(parent_id));
        }
        if self.ancestors(parent_id).any(|id| id == child_id) {
            return Err(TreeError::Cycle {
                child: child_id,
                parent: parent_id,
            });
        }

        self.nodes[child_id].parent = Some(parent_id);
        self.nodes[parent_id].children.push(child_id);
        self.roots.retain(|&id| id != child_id);
        Ok(())
    }

    /// Get a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a mutable reference to a node by ID
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Top-level nodes in insertion order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent_id(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id).and_then(|node| node.parent)
    }

    /// Get the children of a node
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get_node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Position of a node among its siblings, `None` for top-level nodes
    pub fn index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent_id(id)?;
        self.children(parent).iter().position(|&child| child == id)
    }

    /// The node itself followed by its ancestors, innermost first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.get_node(id).map(|_| id), |&id| self.parent_id(id))
    }

    /// Node IDs from the top of the tree down to and including `id`
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path: Vec<NodeId> = self.ancestors(id).collect();
        path.reverse();
        path
    }

    /// Tags along [`Tree::path`]
    pub fn tag_path(&self, id: NodeId) -> Vec<&str> {
        self.path(id)
            .into_iter()
            .map(|id| self.nodes[id].tag.as_str())
            .collect()
    }

    /// Pre-order traversal of the subtree under `root`, `root` included
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        let stack = if root < self.nodes.len() {
            vec![root]
        } else {
            Vec::new()
        };
        Descendants { tree: self, stack }
    }
}

/// Pre-order iterator returned by [`Tree::descendants`]
pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        // Reversed so the leftmost child is visited first
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}
