//! Curve smoothing of planner output.
//!
//! The raw path is split into chunks of `degree` consecutive waypoints. Each
//! chunk is treated as the control polygon of a Bezier curve and reduced with
//! De Casteljau's construction, keeping `num_points + 1` interpolation
//! parameters at every level. The resulting points are mapped to grid cells.

use crate::error::NavigationError;
use crate::map::{GridPoint, OccupancyGrid, ScreenPoint};
use crate::trajectory::Trajectory;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tuning for [`PathSmoother`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SmootherConfig {
    /// Waypoints per Bezier chunk.
    pub degree: usize,
    /// Interpolation intervals per reduction step.
    pub num_points: usize,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        SmootherConfig { degree: 3, num_points: 2 }
    }
}

/// Turns a planner path into a dense trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSmoother {
    config: SmootherConfig,
}

impl Default for PathSmoother {
    fn default() -> Self {
        PathSmoother { config: SmootherConfig::default() }
    }
}

impl PathSmoother {
    /// Creates a smoother after validating its configuration.
    pub fn new(config: SmootherConfig) -> Result<Self, NavigationError> {
        if config.degree == 0 {
            return Err(NavigationError::InvalidParameter("degree must be non-zero"));
        }
        if config.num_points == 0 {
            return Err(NavigationError::InvalidParameter("num_points must be non-zero"));
        }
        Ok(PathSmoother { config })
    }

    /// The active configuration.
    pub fn config(&self) -> SmootherConfig {
        self.config
    }

    /// Smooths `path` into a trajectory that starts at `pose_cell`.
    ///
    /// Repeated cells are removed, keeping the first occurrence.
    pub fn smooth(&self, grid: &OccupancyGrid, path: &[ScreenPoint], pose_cell: GridPoint) -> Trajectory {
        let mut curve = vec![pose_cell];
        for chunk in path.chunks(self.config.degree) {
            let sets = chunk.iter().map(|p| vec![*p]).collect();
            self.reduce(grid, sets, &mut curve);
        }
        let trajectory = Trajectory::from_points(curve);
        debug!(waypoints = path.len(), nodes = trajectory.len(), "Smoothed path");
        trajectory
    }

    /// Dense screen-frame curve for one chunk of control points.
    pub fn curve_points(&self, chunk: &[ScreenPoint]) -> Vec<ScreenPoint> {
        let mut sets: Vec<Vec<ScreenPoint>> = chunk.iter().map(|p| vec![*p]).collect();
        while sets.len() > 1 {
            sets = self.reduce_once(&sets);
        }
        sets.pop().unwrap_or_default()
    }

    fn reduce(&self, grid: &OccupancyGrid, sets: Vec<Vec<ScreenPoint>>, out: &mut Vec<GridPoint>) {
        match sets.len() {
            0 => {}
            1 => out.extend(sets[0].iter().map(|p| grid.screen_to_grid(*p))),
            _ => {
                let next = self.reduce_once(&sets);
                self.reduce(grid, next, out);
            }
        }
    }

    /// One De Casteljau level: every adjacent pair of point-sets is blended into one.
    fn reduce_once(&self, sets: &[Vec<ScreenPoint>]) -> Vec<Vec<ScreenPoint>> {
        let n = self.config.num_points;
        sets.windows(2)
            .map(|pair| {
                let mut blended = Vec::with_capacity((n + 1) * pair[0].len().min(pair[1].len()));
                for i in 0..=n {
                    let t = i as f64 / n as f64;
                    for (a, b) in pair[0].iter().zip(&pair[1]) {
                        blended.push(lerp(*a, *b, t));
                    }
                }
                blended
            })
            .collect()
    }
}

fn lerp(a: ScreenPoint, b: ScreenPoint, t: f64) -> ScreenPoint {
    ScreenPoint::new((1.0 - t) * a.x + t * b.x, (1.0 - t) * a.y + t * b.y)
}
