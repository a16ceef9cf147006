use crate::map::GridPoint;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Ordered, duplicate-free queue of grid cells the drone flies through.
///
/// Consumed from the front one node at a time and replaced wholesale on
/// every replan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trajectory {
    nodes: VecDeque<GridPoint>,
}

impl Trajectory {
    /// Creates an empty trajectory.
    pub fn new() -> Self {
        Trajectory { nodes: VecDeque::new() }
    }

    /// Builds a trajectory, keeping only the first occurrence of each cell.
    pub fn from_points(points: impl IntoIterator<Item = GridPoint>) -> Self {
        let mut seen = HashSet::new();
        let nodes = points.into_iter().filter(|p| seen.insert(*p)).collect();
        Trajectory { nodes }
    }

    /// Number of remaining nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no nodes remain.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node the drone is at or last left.
    pub fn current(&self) -> Option<GridPoint> {
        self.nodes.front().copied()
    }

    /// The node the drone is heading to.
    pub fn next(&self) -> Option<GridPoint> {
        self.nodes.get(1).copied()
    }

    /// Removes and returns the front node.
    pub fn pop_front(&mut self) -> Option<GridPoint> {
        self.nodes.pop_front()
    }

    /// Drops every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Iterates the remaining nodes front to back.
    pub fn iter(&self) -> impl Iterator<Item = &GridPoint> {
        self.nodes.iter()
    }

    /// The last node, where the trajectory ends.
    pub fn last(&self) -> Option<GridPoint> {
        self.nodes.back().copied()
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, p) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({}, {})", p.x, p.y)?;
        }
        write!(f, "]")
    }
}
