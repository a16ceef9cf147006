//! Dead reckoning of the drone pose onto the occupancy grid.
//!
//! There is no absolute position source. The pose is integrated from the
//! commanded motion between two trajectory nodes and every cell it passes
//! through is recorded as traversed.

use super::{GridPoint, OccupancyGrid};
use crate::error::NavigationError;
use skyward_kinematics::Pose;
use tracing::trace;

/// One tick's worth of motion along the current trajectory leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegProgress {
    /// Node the leg started from (grid frame).
    pub prev: GridPoint,
    /// Node the leg is heading to (grid frame).
    pub next: GridPoint,
    /// True once the drone has reached `next`; position is held.
    pub at_node: bool,
    /// Time budgeted for the whole leg in seconds.
    pub travel_time: f64,
    /// Forward velocity command currently being sent.
    pub commanded_forward: f64,
    /// Seconds elapsed since the previous update.
    pub dt: f64,
}

/// Integrates commanded motion into the pose and marks the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadReckoner {
    /// Scale applied to the nominal leg speed to match observed flight.
    pub calibration: f64,
}

impl Default for DeadReckoner {
    fn default() -> Self {
        DeadReckoner { calibration: 1.0 }
    }
}

impl DeadReckoner {
    /// Creates a dead reckoner with the given speed calibration factor.
    pub fn new(calibration: f64) -> Self {
        DeadReckoner { calibration }
    }

    /// Screen-frame speed (px/s) needed to cover a leg in its travel time.
    ///
    /// Zero when the forward command is zero, the drone is rotating in place.
    pub fn leg_speed(&self, grid: &OccupancyGrid, leg: &LegProgress) -> Result<f64, NavigationError> {
        if leg.commanded_forward == 0.0 {
            return Ok(0.0);
        }
        let from = grid.cell_center_screen(leg.prev);
        let to = grid.cell_center_screen(leg.next);
        let speed = skyward_kinematics::travel_speed(from.distance(&to) * self.calibration, leg.travel_time)?;
        Ok(speed)
    }

    /// Updates the pose for one tick along a leg and marks its cell traversed.
    ///
    /// While en route the heading is set to the bearing of the leg and the
    /// position advances by `speed * dt`. At a node the pose is held.
    ///
    /// # Returns
    /// * `Ok(GridPoint)` - Grid cell containing the updated pose
    /// * `Err(NavigationError)` - If the travel time or `dt` is invalid
    pub fn update_drone_pose(
        &self,
        grid: &mut OccupancyGrid,
        pose: &mut Pose,
        leg: LegProgress,
    ) -> Result<GridPoint, NavigationError> {
        let speed = self.leg_speed(grid, &leg)?;

        if !leg.at_node {
            let from = grid.cell_center_screen(leg.prev);
            let to = grid.cell_center_screen(leg.next);
            *pose = pose.with_heading(from.bearing_to(&to)).advance(speed, leg.dt)?;
        }

        let cell = grid.screen_to_grid(super::ScreenPoint::new(pose.x, pose.y));
        grid.mark_traversed(cell);
        trace!(?cell, speed, x = pose.x, y = pose.y, "Dead-reckoned pose");
        Ok(cell)
    }

    /// Advances the pose along its current heading and marks its cell traversed.
    ///
    /// Used while following a threat, when there is no trajectory leg.
    pub fn advance_along_heading(
        &self,
        grid: &mut OccupancyGrid,
        pose: &mut Pose,
        speed: f64,
        dt: f64,
    ) -> Result<GridPoint, NavigationError> {
        *pose = pose.advance(speed * self.calibration, dt)?;
        let cell = grid.screen_to_grid(super::ScreenPoint::new(pose.x, pose.y));
        grid.mark_traversed(cell);
        Ok(cell)
    }
}
