//! Map-related functionality for navigation.
//!
//! This module provides the occupancy grid with its frame transforms, the
//! services that write into it (obstacle insertion and dead reckoning) and the
//! on-disk formats for grids and paths.

pub mod dead_reckoning;
pub mod grid;
pub mod obstacle;
pub mod persist;
pub mod point_types;

pub use dead_reckoning::{DeadReckoner, LegProgress};
pub use grid::{CellState, MapFrame, OccupancyGrid};
pub use obstacle::{ObstacleInsertion, ObstacleMapper};
pub use point_types::{AreaPoint, GridPoint, ScreenPoint};
