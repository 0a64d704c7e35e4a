//! Tree data structure implementation for MCTS
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. A node owns an
//! ordered list of `(action, child)` edges, so a node is reachable from exactly
//! one parent and re-rooting is a matter of keeping the indices reachable from
//! the new root.

use std::fmt;

/// Index of a node inside a [`Tree`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the arena.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node in the tree structure
///
/// # Type Parameters
/// - `T`: The data type stored in the node
#[derive(Debug)]
pub struct Node<T> {
    parent: Option<NodeId>,
    action: Option<usize>,
    children: Vec<(usize, NodeId)>,
    data: T,
}

impl<T> Node<T> {
    /// Checks if this node is the root (has no parent)
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Gets the parent node if it exists
    #[inline]
    pub fn get_parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The action that produced this node from its parent, `None` for the root.
    #[inline]
    pub fn get_action(&self) -> Option<usize> {
        self.action
    }

    /// Gets the child reached by `action`, if it was created.
    #[inline]
    pub fn get_child(&self, action: usize) -> Option<NodeId> {
        self.children
            .binary_search_by_key(&action, |(a, _)| *a)
            .ok()
            .map(|position| self.children[position].1)
    }

    /// Edges to the children, ordered by ascending action.
    #[inline]
    pub fn children(&self) -> &[(usize, NodeId)] {
        &self.children
    }

    /// Gets a reference to the node's data
    #[inline]
    pub fn get(&self) -> &T {
        &self.data
    }

    /// Gets a mutable reference to the node's data
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

/// Arena-backed tree.
#[derive(Debug)]
pub struct Tree<T> {
    nodes: Vec<Node<T>>,
    root: NodeId,
}

impl<T> Tree<T> {
    /// Creates a tree made of a single root holding `data`.
    pub fn new(data: T) -> Self {
        Tree {
            nodes: vec![Node { parent: None, action: None, children: Vec::new(), data }],
            root: NodeId(0),
        }
    }

    /// Identifier of the current root.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Gets a node by identifier.
    ///
    /// # Panics
    /// If `id` does not belong to this tree.
    #[inline]
    pub fn get(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id.0]
    }

    /// Gets a node mutably by identifier.
    ///
    /// # Panics
    /// If `id` does not belong to this tree.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node<T> {
        &mut self.nodes[id.0]
    }

    /// Number of nodes stored in the arena.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a tree holds at least its root.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a new child under `parent` for `action`.
    ///
    /// Edges stay sorted by action. If a child already exists for this action
    /// it is replaced by the new node (the old one becomes unreachable).
    ///
    /// # Parameters
    /// - `parent`: The parent node
    /// - `action`: The action leading to the child
    /// - `data`: The data for the new child
    ///
    /// # Returns
    /// Identifier of the newly created child node
    pub fn add_child(&mut self, parent: NodeId, action: usize, data: T) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            action: Some(action),
            children: Vec::new(),
            data,
        });

        let children = &mut self.nodes[parent.0].children;
        match children.binary_search_by_key(&action, |(a, _)| *a) {
            Ok(position) => children[position].1 = id,
            Err(position) => children.insert(position, (action, id)),
        }

        id
    }

    /// Ids of the nodes from the root down to `id`, both included.
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;

        while let Some(parent) = self.get(current).parent {
            path.push(parent);
            current = parent;
        }

        path.reverse();
        path
    }

    /// Makes `new_root` the root of the tree and discards everything that is
    /// not in its subtree.
    ///
    /// The retained nodes keep their data untouched; they are renumbered in
    /// breadth-first order, so the new root gets the first slot.
    pub fn reroot(&mut self, new_root: NodeId) {
        let mut old_nodes: Vec<Option<Node<T>>> =
            std::mem::take(&mut self.nodes).into_iter().map(Some).collect();
        let mut remap: Vec<Option<NodeId>> = vec![None; old_nodes.len()];

        let mut order = vec![new_root];
        remap[new_root.0] = Some(NodeId(0));

        let mut cursor = 0;
        while cursor < order.len() {
            let current = order[cursor];
            cursor += 1;

            if let Some(node) = &old_nodes[current.0] {
                for (_, child) in &node.children {
                    remap[child.0] = Some(NodeId(order.len()));
                    order.push(*child);
                }
            }
        }

        let mut nodes = Vec::with_capacity(order.len());
        for old_id in order {
            if let Some(mut node) = old_nodes[old_id.0].take() {
                node.parent = node.parent.and_then(|parent| remap[parent.0]);
                for edge in &mut node.children {
                    if let Some(id) = remap[edge.1.index()] {
                        edge.1 = id;
                    }
                }
                nodes.push(node);
            }
        }

        if let Some(root) = nodes.first_mut() {
            root.parent = None;
            root.action = None;
        }

        self.nodes = nodes;
        self.root = NodeId(0);
    }
}
