//! Occupancy grid for navigation and path planning.
//!
//! The grid discretizes the operating area into cells that are either free,
//! already traversed by the drone, or blocked by an obstacle. It also owns the
//! fixed ratios between the three frames used by the navigation stack:
//!
//! - **grid frame**: integer cell indices `(col, row)`
//! - **screen frame**: continuous pixels, where the pose and planner nodes live
//! - **area frame**: continuous real-world centimeters
//!
//! All frames share a top-left origin with y growing downwards.

#![warn(missing_docs)]

use crate::error::NavigationError;
use super::{AreaPoint, GridPoint, ScreenPoint};

/// State of a single grid cell.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellState {
    /// Nothing known to be here
    #[default]
    Free = 0,
    /// The drone's dead-reckoned position has passed through this cell
    Traversed = 1,
    /// An obstacle was mapped here; permanent once set
    Obstacle = 2,
}

impl CellState {
    /// Converts the CellState to its u8 representation
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Creates a CellState from a u8 value, if it is one of `0`, `1`, `2`
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CellState::Free),
            1 => Some(CellState::Traversed),
            2 => Some(CellState::Obstacle),
            _ => None,
        }
    }
}

impl std::fmt::Display for CellState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellState::Free => write!(f, "Free"),
            CellState::Traversed => write!(f, "Traversed"),
            CellState::Obstacle => write!(f, "Obstacle"),
        }
    }
}

/// Fixed geometry relating the grid, screen and area frames.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapFrame {
    /// Width of the grid in cells
    pub width: usize,
    /// Height of the grid in cells
    pub height: usize,
    /// Screen extent in pixels `(width, height)`
    pub screen: (f64, f64),
    /// Real-world extent in centimeters `(width, height)`
    pub area: (f64, f64),
}

impl MapFrame {
    /// Creates a new frame after validating every extent.
    ///
    /// # Arguments
    /// * `width`, `height` - Grid size in cells
    /// * `screen` - Screen size in pixels
    /// * `area` - Operating area size in centimeters
    pub fn new(
        width: usize,
        height: usize,
        screen: (f64, f64),
        area: (f64, f64),
    ) -> Result<Self, NavigationError> {
        if width == 0 || height == 0 {
            return Err(NavigationError::InvalidDimensions("Width and height must be non-zero"));
        }
        if width > i32::MAX as usize || height > i32::MAX as usize {
            return Err(NavigationError::InvalidDimensions("Map dimensions too large"));
        }
        // Check for potential overflow in data allocation
        if width.checked_mul(height).is_none() {
            return Err(NavigationError::InvalidDimensions("Map dimensions too large, would cause overflow"));
        }
        if !(screen.0 > 0.0 && screen.1 > 0.0) {
            return Err(NavigationError::InvalidScale("Screen extent must be positive"));
        }
        if !(area.0 > 0.0 && area.1 > 0.0) {
            return Err(NavigationError::InvalidScale("Area extent must be positive"));
        }
        Ok(MapFrame { width, height, screen, area })
    }

    /// Frame whose grid has one cell per `cell_size` centimeters of area.
    pub fn from_area(area: (f64, f64), screen: (f64, f64), cell_size: f64) -> Result<Self, NavigationError> {
        if !(cell_size > 0.0) {
            return Err(NavigationError::InvalidScale("Cell size must be positive"));
        }
        let width = (area.0 / cell_size).floor() as usize;
        let height = (area.1 / cell_size).floor() as usize;
        MapFrame::new(width, height, screen, area)
    }

    /// Size of one cell in screen pixels `(w, h)`.
    pub fn cell_screen_size(&self) -> (f64, f64) {
        (self.screen.0 / self.width as f64, self.screen.1 / self.height as f64)
    }

    /// Size of one cell in centimeters `(w, h)`.
    pub fn cell_area_size(&self) -> (f64, f64) {
        (self.area.0 / self.width as f64, self.area.1 / self.height as f64)
    }

    /// Pixels per centimeter along x, used to scale measured distances.
    pub fn screen_per_area(&self) -> f64 {
        self.screen.0 / self.area.0
    }
}

/// A 2D occupancy grid with an append-only record of mapped obstacle cells.
///
/// Every access is bounds-checked. Reads outside the grid report [`CellState::Free`]
/// and writes outside the grid are ignored.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OccupancyGrid {
    frame: MapFrame,
    /// Row-major cell storage
    data: Vec<CellState>,
    /// Every cell that was ever marked as an obstacle, in marking order
    obstacles: Vec<GridPoint>,
}

impl OccupancyGrid {
    /// Creates an all-free grid for the given frame.
    pub fn new(frame: MapFrame) -> Self {
        OccupancyGrid {
            frame,
            data: vec![CellState::Free; frame.width * frame.height],
            obstacles: Vec::new(),
        }
    }

    /// Gets the frame geometry.
    pub fn frame(&self) -> &MapFrame {
        &self.frame
    }

    /// Gets the width of the grid in cells.
    pub fn width(&self) -> usize {
        self.frame.width
    }

    /// Gets the height of the grid in cells.
    pub fn height(&self) -> usize {
        self.frame.height
    }

    /// Returns true if the cell lies inside the grid.
    pub fn contains(&self, p: GridPoint) -> bool {
        p.x >= 0 && p.y >= 0 && (p.x as usize) < self.frame.width && (p.y as usize) < self.frame.height
    }

    fn get_index(&self, p: GridPoint) -> Option<usize> {
        if self.contains(p) {
            Some(p.y as usize * self.frame.width + p.x as usize)
        } else {
            None
        }
    }

    /// Gets the state of a cell. Out-of-bounds cells are reported as free.
    pub fn cell(&self, p: GridPoint) -> CellState {
        self.get_index(p).map(|i| self.data[i]).unwrap_or(CellState::Free)
    }

    /// Sets the state of a cell. Returns false if the cell is out of bounds.
    ///
    /// Obstacle cells are never downgraded.
    pub fn set_cell(&mut self, p: GridPoint, state: CellState) -> bool {
        let Some(index) = self.get_index(p) else {
            return false;
        };
        if self.data[index] == CellState::Obstacle {
            return state == CellState::Obstacle;
        }
        self.data[index] = state;
        if state == CellState::Obstacle {
            self.obstacles.push(p);
        }
        true
    }

    /// Returns true if the cell is an obstacle.
    pub fn is_obstacle(&self, p: GridPoint) -> bool {
        self.cell(p) == CellState::Obstacle
    }

    /// Marks a cell as traversed, leaving obstacles untouched.
    pub fn mark_traversed(&mut self, p: GridPoint) -> bool {
        if self.is_obstacle(p) {
            return false;
        }
        self.set_cell(p, CellState::Traversed)
    }

    /// Marks a cell as an obstacle and records it. Returns false if out of bounds.
    pub fn mark_obstacle(&mut self, p: GridPoint) -> bool {
        self.set_cell(p, CellState::Obstacle)
    }

    /// Every cell that was marked as an obstacle, in marking order.
    pub fn obstacles(&self) -> &[GridPoint] {
        &self.obstacles
    }

    /// Number of cells in the given state.
    pub fn count(&self, state: CellState) -> usize {
        self.data.iter().filter(|c| **c == state).count()
    }

    /// Iterates the grid row by row.
    pub fn rows(&self) -> impl Iterator<Item = &[CellState]> {
        self.data.chunks(self.frame.width)
    }

    /// Converts screen coordinates to the grid cell containing them.
    ///
    /// The result may lie outside the grid.
    pub fn screen_to_grid(&self, p: ScreenPoint) -> GridPoint {
        let x = (p.x * self.frame.width as f64 / self.frame.screen.0).floor();
        let y = (p.y * self.frame.height as f64 / self.frame.screen.1).floor();
        GridPoint::new(x as i32, y as i32)
    }

    /// Converts a grid cell to its screen rectangle `(top_left, bottom_right)`.
    pub fn grid_to_screen(&self, p: GridPoint) -> (ScreenPoint, ScreenPoint) {
        let (cell_w, cell_h) = self.frame.cell_screen_size();
        let start = ScreenPoint::new(
            (self.frame.screen.0 * (p.x as f64 / self.frame.width as f64)).round(),
            (self.frame.screen.1 * (p.y as f64 / self.frame.height as f64)).round(),
        );
        let end = ScreenPoint::new((start.x + cell_w).round(), (start.y + cell_h).round());
        (start, end)
    }

    /// Center of a cell in the screen frame.
    pub fn cell_center_screen(&self, p: GridPoint) -> ScreenPoint {
        let (cell_w, cell_h) = self.frame.cell_screen_size();
        ScreenPoint::new((p.x as f64 + 0.5) * cell_w, (p.y as f64 + 0.5) * cell_h)
    }

    /// Center of a cell in the area frame.
    pub fn cell_center_area(&self, p: GridPoint) -> AreaPoint {
        let (cell_w, cell_h) = self.frame.cell_area_size();
        AreaPoint::new((p.x as f64 + 0.5) * cell_w, (p.y as f64 + 0.5) * cell_h)
    }

    /// Converts screen coordinates to area coordinates.
    pub fn screen_to_area(&self, p: ScreenPoint) -> AreaPoint {
        AreaPoint::new(
            p.x * self.frame.area.0 / self.frame.screen.0,
            p.y * self.frame.area.1 / self.frame.screen.1,
        )
    }

    /// Converts area coordinates to screen coordinates.
    pub fn area_to_screen(&self, p: AreaPoint) -> ScreenPoint {
        ScreenPoint::new(
            p.x * self.frame.screen.0 / self.frame.area.0,
            p.y * self.frame.screen.1 / self.frame.area.1,
        )
    }

    /// In-bounds cells at exactly Manhattan distance `distance` from `center`.
    ///
    /// Distance 0 yields the center itself (if in bounds).
    pub fn manhattan_ring(&self, center: GridPoint, distance: u32) -> Vec<GridPoint> {
        let d = distance as i32;
        let mut ring = Vec::new();
        for y in (center.y - d)..=(center.y + d) {
            for x in (center.x - d)..=(center.x + d) {
                let p = GridPoint::new(x, y);
                if p.manhattan(&center) == distance && self.contains(p) {
                    ring.push(p);
                }
            }
        }
        ring
    }
}

impl std::fmt::Display for OccupancyGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "OccupancyGrid ({}x{}, screen: {:.0}x{:.0}px, area: {:.0}x{:.0}cm)",
            self.frame.width, self.frame.height, self.frame.screen.0, self.frame.screen.1, self.frame.area.0, self.frame.area.1
        )?;
        for row in self.rows() {
            for cell in row {
                let glyph = match cell {
                    CellState::Free => '.',
                    CellState::Traversed => 'o',
                    CellState::Obstacle => '#',
                };
                write!(f, "{}", glyph)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
