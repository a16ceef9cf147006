/// Represents a point in grid coordinates (cell indices).
///
/// Signed so that projections falling off the map stay representable; the grid
/// treats every out-of-bounds cell as free.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridPoint {
    /// The x-coordinate (column index) in the grid.
    pub x: i32,
    /// The y-coordinate (row index) in the grid.
    pub y: i32,
}

impl GridPoint {
    /// Creates a new `GridPoint`.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell.
    pub fn manhattan(&self, other: &GridPoint) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

/// Represents a point in the continuous screen frame (pixels).
///
/// The drone pose and every planner node live in this frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScreenPoint {
    /// The x-coordinate in pixels.
    pub x: f64,
    /// The y-coordinate in pixels.
    pub y: f64,
}

impl ScreenPoint {
    /// Creates a new `ScreenPoint`.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &ScreenPoint) -> f64 {
        skyward_kinematics::distance(self.as_tuple(), other.as_tuple())
    }

    /// Bearing of the vector from this point to `other`.
    pub fn bearing_to(&self, other: &ScreenPoint) -> f64 {
        skyward_kinematics::bearing(self.as_tuple(), other.as_tuple())
    }

    /// The point as an `(x, y)` tuple.
    pub fn as_tuple(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// Represents a point in the real-world area frame (centimeters).
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AreaPoint {
    /// The x-coordinate in centimeters.
    pub x: f64,
    /// The y-coordinate in centimeters.
    pub y: f64,
}

impl AreaPoint {
    /// Creates a new `AreaPoint`.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &AreaPoint) -> f64 {
        skyward_kinematics::distance((self.x, self.y), (other.x, other.y))
    }
}
