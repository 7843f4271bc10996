//! Arena-backed build tree.
//!
//! Nodes live in a flat `Vec` addressed by `NodeId`. A node created as a
//! stub (referenced before its own start event arrived) is filled in place,
//! so the id other nodes hold stays valid across partial population —
//! there is no reference-counted node graph to keep consistent.
//!
//! Children are only ever appended; insertion order reflects event arrival
//! order and is significant to consumers.

use girder_core::Timestamp;
use smallvec::SmallVec;

/// Stable index of one node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Raw index into the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Variant-specific node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The build root
    Build,
    /// A project instance
    Project {
        /// Full path of the project file
        project_file: String,
        /// Project context id the instance was keyed by
        context_id: i32,
    },
    /// A target
    Target {
        /// Target id from the event stream
        target_id: i32,
        /// Whether the start event carried an explicit parent-target name
        parented: bool,
    },
    /// A task
    Task {
        /// Task id from the event stream
        task_id: i32,
    },
    /// An item spec
    Item,
    /// Metadata under an item; `text` is the name
    Metadata {
        /// Metadata value
        value: String,
    },
    /// A property; `text` is the name
    Property {
        /// Property value
        value: String,
    },
    /// A grouping folder
    Folder,
    /// A plain message
    Message,
    /// A warning diagnostic
    Warning {
        /// Diagnostic code, if any
        code: Option<String>,
        /// Source file, if any
        file: Option<String>,
        /// 1-based line, 0 when unknown
        line: u32,
        /// 1-based column, 0 when unknown
        column: u32,
    },
    /// An error diagnostic
    Error {
        /// Diagnostic code, if any
        code: Option<String>,
        /// Source file, if any
        file: Option<String>,
        /// 1-based line, 0 when unknown
        line: u32,
        /// 1-based column, 0 when unknown
        column: u32,
    },
    /// A named parameter/item group
    Parameter,
}

/// One node of the build tree.
#[derive(Debug, Clone)]
pub struct Node {
    /// Variant payload
    pub kind: NodeKind,
    /// Name or text of the node
    pub text: String,
    /// Start time, set by the corresponding *Started* event
    pub start: Option<Timestamp>,
    /// End time, set by the corresponding *Finished* event
    pub end: Option<Timestamp>,
    /// Outcome, set by the corresponding *Finished* event
    pub succeeded: Option<bool>,
    /// Parent back-reference (non-owning)
    pub parent: Option<NodeId>,
    /// Children in event arrival order
    pub children: SmallVec<[NodeId; 4]>,
}

impl Node {
    fn new(kind: NodeKind, text: String) -> Self {
        Node {
            kind,
            text,
            start: None,
            end: None,
            succeeded: None,
            parent: None,
            children: SmallVec::new(),
        }
    }
}

/// Arena of build-tree nodes with a fixed `Build` root.
#[derive(Debug)]
pub struct BuildTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl BuildTree {
    /// Create a tree containing only the build root.
    pub fn new() -> Self {
        let mut nodes = Vec::with_capacity(256);
        nodes.push(Node::new(NodeKind::Build, "Build".to_string()));
        BuildTree {
            nodes,
            root: NodeId(0),
        }
    }

    /// The build root.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Total node count, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds only the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Read one node.
    ///
    /// # Panics
    /// Panics on a foreign `NodeId`; ids are only ever produced by this
    /// arena and never invalidated.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Children of a node in arrival order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Parent of a node, `None` for the root and unattached stubs.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// First direct child matching a predicate.
    pub fn find_child<F>(&self, id: NodeId, mut predicate: F) -> Option<NodeId>
    where
        F: FnMut(&Node) -> bool,
    {
        self.node(id)
            .children
            .iter()
            .copied()
            .find(|c| predicate(self.node(*c)))
    }

    /// First descendant matching a predicate, depth-first in child order.
    pub fn find_descendant<F>(&self, id: NodeId, mut predicate: F) -> Option<NodeId>
    where
        F: FnMut(&Node) -> bool,
    {
        let mut stack: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if predicate(self.node(current)) {
                return Some(current);
            }
            stack.extend(self.node(current).children.iter().rev().copied());
        }
        None
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Allocate an unattached node.
    pub(crate) fn alloc(&mut self, kind: NodeKind, text: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind, text.into()));
        id
    }

    /// Append `child` under `parent`. Appends only; children are never
    /// reordered or removed.
    pub(crate) fn add_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child.index()].parent.is_none(), "node reattached");
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    /// Find a direct child folder by name, creating it if absent.
    pub(crate) fn ensure_folder(&mut self, parent: NodeId, name: &str) -> NodeId {
        if let Some(existing) = self.find_child(parent, |n| {
            matches!(n.kind, NodeKind::Folder) && n.text == name
        }) {
            return existing;
        }
        let folder = self.alloc(NodeKind::Folder, name);
        self.add_child(parent, folder);
        folder
    }
}

impl Default for BuildTree {
    fn default() -> Self {
        BuildTree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tree_has_build_root() {
        let tree = BuildTree::new();
        assert!(tree.is_empty());
        assert!(matches!(tree.node(tree.root()).kind, NodeKind::Build));
        assert!(tree.parent(tree.root()).is_none());
    }

    #[test]
    fn test_children_preserve_insertion_order() {
        let mut tree = BuildTree::new();
        let root = tree.root();
        let a = tree.alloc(NodeKind::Message, "a");
        let b = tree.alloc(NodeKind::Message, "b");
        let c = tree.alloc(NodeKind::Message, "c");
        tree.add_child(root, a);
        tree.add_child(root, b);
        tree.add_child(root, c);
        assert_eq!(tree.children(root), &[a, b, c]);
        assert_eq!(tree.parent(b), Some(root));
    }

    #[test]
    fn test_stub_fill_preserves_identity() {
        let mut tree = BuildTree::new();
        let stub = tree.alloc(
            NodeKind::Project {
                project_file: String::new(),
                context_id: 7,
            },
            "",
        );
        let child = tree.alloc(NodeKind::Message, "under stub");
        tree.add_child(stub, child);

        // Fill the stub in place; the child's parent id must stay valid.
        let node = tree.node_mut(stub);
        node.text = "app.csproj".to_string();
        node.start = Some(girder_core::Timestamp::from_micros(1));

        assert_eq!(tree.parent(child), Some(stub));
        assert_eq!(tree.node(stub).text, "app.csproj");
        assert_eq!(tree.children(stub), &[child]);
    }

    #[test]
    fn test_find_child_and_descendant() {
        let mut tree = BuildTree::new();
        let root = tree.root();
        let folder = tree.alloc(NodeKind::Folder, "Warnings");
        tree.add_child(root, folder);
        let deep = tree.alloc(NodeKind::Message, "deep");
        tree.add_child(folder, deep);

        assert_eq!(
            tree.find_child(root, |n| n.text == "Warnings"),
            Some(folder)
        );
        assert_eq!(tree.find_child(root, |n| n.text == "deep"), None);
        assert_eq!(
            tree.find_descendant(root, |n| n.text == "deep"),
            Some(deep)
        );
    }

    #[test]
    fn test_ensure_folder_reuses_existing() {
        let mut tree = BuildTree::new();
        let root = tree.root();
        let first = tree.ensure_folder(root, "Errors");
        let second = tree.ensure_folder(root, "Errors");
        assert_eq!(first, second);
        assert_eq!(tree.children(root).len(), 1);
    }
}
