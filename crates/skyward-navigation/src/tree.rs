//! Arena-backed search tree used by the RRT planner.
//!
//! Nodes live in a flat vector and refer to their parent by index. A parent
//! index always points at an earlier node, so walking parents terminates at
//! the root (node 0).

use crate::error::NavigationError;
use crate::map::ScreenPoint;

/// A single node of the search tree.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeNode {
    /// Position in the screen frame.
    pub position: ScreenPoint,
    /// Index of the parent node, `None` only for the root.
    pub parent: Option<usize>,
}

/// A rooted tree of screen-frame points.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    /// Creates a tree containing only the root.
    pub fn new(root: ScreenPoint) -> Self {
        Tree {
            nodes: vec![TreeNode { position: root, parent: None }],
        }
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false, the root exists from construction.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Gets a node by index.
    pub fn node(&self, index: usize) -> Option<&TreeNode> {
        self.nodes.get(index)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Appends a node under `parent` and returns its index.
    pub fn add_child(&mut self, parent: usize, position: ScreenPoint) -> Result<usize, NavigationError> {
        if parent >= self.nodes.len() {
            return Err(NavigationError::UnknownNode(parent));
        }
        self.nodes.push(TreeNode { position, parent: Some(parent) });
        Ok(self.nodes.len() - 1)
    }

    /// Moves an existing node.
    pub fn set_position(&mut self, index: usize, position: ScreenPoint) -> Result<(), NavigationError> {
        let node = self.nodes.get_mut(index).ok_or(NavigationError::UnknownNode(index))?;
        node.position = position;
        Ok(())
    }

    /// Parent index of a node.
    pub fn parent(&self, index: usize) -> Result<Option<usize>, NavigationError> {
        self.nodes.get(index).map(|n| n.parent).ok_or(NavigationError::UnknownNode(index))
    }

    /// Index of the node closest to `point`.
    ///
    /// Ties go to the node inserted first.
    pub fn nearest(&self, point: ScreenPoint) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, node) in self.nodes.iter().enumerate() {
            let d = node.position.distance(&point);
            if d < best_dist {
                best = i;
                best_dist = d;
            }
        }
        best
    }

    /// Every `(parent, child)` position pair.
    pub fn edges(&self) -> impl Iterator<Item = (ScreenPoint, ScreenPoint)> + '_ {
        self.nodes
            .iter()
            .filter_map(|n| n.parent.map(|p| (self.nodes[p].position, n.position)))
    }

    /// Walks parents from `index` up to the root.
    ///
    /// The returned trace starts at `index` and ends at the root.
    pub fn trace_back(&self, index: usize) -> Result<Vec<ScreenPoint>, NavigationError> {
        let mut trace = Vec::new();
        self.collect_trace(index, &mut trace)?;
        Ok(trace)
    }

    fn collect_trace(&self, index: usize, trace: &mut Vec<ScreenPoint>) -> Result<(), NavigationError> {
        let node = self.nodes.get(index).ok_or(NavigationError::UnknownNode(index))?;
        trace.push(node.position);
        match node.parent {
            Some(parent) => self.collect_trace(parent, trace),
            None => Ok(()),
        }
    }
}
