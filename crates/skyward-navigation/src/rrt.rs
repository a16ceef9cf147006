//! Rapidly-exploring random tree planner over an occupancy grid snapshot.
//!
//! The planner is an incremental state machine: [`RrtPlanner::step`] runs a
//! bounded number of iterations and reports whether the search is still going,
//! finished with a path, or gave up. This lets a control loop interleave
//! planning with issuing commands. [`RrtPlanner::plan`] runs to completion.

use crate::error::NavigationError;
use crate::map::{OccupancyGrid, ScreenPoint};
use crate::tree::Tree;
use rand::Rng;
use std::fmt;
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tuning for the RRT search.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct PlannerConfig {
    /// Maximum edge length in screen pixels. Defaults to a twelfth of the screen width.
    pub max_step: Option<f64>,
    /// Iterations before the search is abandoned.
    pub max_iterations: usize,
    /// Sub-segments checked along each candidate edge.
    pub edge_samples: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            max_step: None,
            max_iterations: 5000,
            edge_samples: 200,
        }
    }
}

impl PlannerConfig {
    /// Checks that every parameter is usable.
    pub fn validate(&self) -> Result<(), NavigationError> {
        if let Some(step) = self.max_step {
            if !(step > 0.0) {
                return Err(NavigationError::InvalidParameter("max_step must be positive"));
            }
        }
        if self.max_iterations == 0 {
            return Err(NavigationError::InvalidParameter("max_iterations must be non-zero"));
        }
        if self.edge_samples == 0 {
            return Err(NavigationError::InvalidParameter("edge_samples must be non-zero"));
        }
        Ok(())
    }
}

/// Outcome of a successful planning episode.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanResult {
    /// Waypoints from start to goal in the screen frame.
    pub path: Vec<ScreenPoint>,
    /// Nodes in the tree when the goal was reached.
    pub tree_size: usize,
    /// Iterations spent.
    pub iterations: usize,
}

impl fmt::Display for PlanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlanResult {{ path_length: {}, tree_size: {}, iterations: {} }}",
            self.path.len(),
            self.tree_size,
            self.iterations
        )
    }
}

/// Progress report from [`RrtPlanner::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerStatus {
    /// Budget spent without reaching the goal; call `step` again.
    Searching,
    /// Goal reached and path traced.
    Complete(PlanResult),
    /// Iteration cap reached, or the tree was inconsistent.
    Failed(NavigationError),
}

/// Single-episode RRT planner.
#[derive(Debug, Clone)]
pub struct RrtPlanner {
    grid: OccupancyGrid,
    tree: Tree,
    start: ScreenPoint,
    goal: ScreenPoint,
    max_step: f64,
    config: PlannerConfig,
    iterations: usize,
    goal_node: Option<usize>,
    found: bool,
    traced: bool,
    result: Option<PlanResult>,
}

impl RrtPlanner {
    /// Starts an episode from `start` to `goal` over a snapshot of the grid.
    pub fn new(
        grid: OccupancyGrid,
        start: ScreenPoint,
        goal: ScreenPoint,
        config: PlannerConfig,
    ) -> Result<Self, NavigationError> {
        config.validate()?;
        let max_step = config.max_step.unwrap_or(grid.frame().screen.0 / 12.0);
        Ok(RrtPlanner {
            grid,
            tree: Tree::new(start),
            start,
            goal,
            max_step,
            config,
            iterations: 0,
            goal_node: None,
            found: false,
            traced: false,
            result: None,
        })
    }

    /// The grid snapshot being planned against.
    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    /// The search tree grown so far.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Episode start.
    pub fn start(&self) -> ScreenPoint {
        self.start
    }

    /// Episode goal.
    pub fn goal(&self) -> ScreenPoint {
        self.goal
    }

    /// Effective maximum edge length.
    pub fn max_step(&self) -> f64 {
        self.max_step
    }

    /// Iterations spent so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// True once a node has been snapped onto the goal.
    pub fn is_found(&self) -> bool {
        self.found
    }

    /// True once the path has been traced back to the root.
    pub fn is_traced(&self) -> bool {
        self.traced
    }

    /// Uniform sample over the screen frame.
    pub fn sample_random_point<R: Rng>(&self, rng: &mut R) -> ScreenPoint {
        let (w, h) = self.grid.frame().screen;
        ScreenPoint::new(rng.random_range(0.0..w), rng.random_range(0.0..h))
    }

    /// Index of the tree node closest to `sample`.
    pub fn select_nearest(&self, sample: ScreenPoint) -> usize {
        self.tree.nearest(sample)
    }

    /// Point at most `max_step` from `from` in the direction of `towards`.
    pub fn steer(&self, from: ScreenPoint, towards: ScreenPoint) -> ScreenPoint {
        if from.distance(&towards) <= self.max_step {
            return towards;
        }
        let theta = from.bearing_to(&towards);
        ScreenPoint::new(from.x + self.max_step * theta.cos(), from.y + self.max_step * theta.sin())
    }

    /// True if any sub-point of the segment `a`-`b` falls in an obstacle cell.
    ///
    /// Sub-points that fall off the grid count as free, as do sub-points in the
    /// start cell: the drone is already there, so it cannot be blocked by it.
    pub fn collides_edge(&self, a: ScreenPoint, b: ScreenPoint) -> bool {
        let samples = self.config.edge_samples;
        let start_cell = self.grid.screen_to_grid(self.start);
        (0..=samples).any(|i| {
            let u = i as f64 / samples as f64;
            let p = ScreenPoint::new(a.x * u + b.x * (1.0 - u), a.y * u + b.y * (1.0 - u));
            let cell = self.grid.screen_to_grid(p);
            cell != start_cell && self.grid.is_obstacle(cell)
        })
    }

    /// One sample-nearest-steer extension.
    ///
    /// Returns true if a node was added.
    pub fn extend<R: Rng>(&mut self, rng: &mut R) -> Result<bool, NavigationError> {
        let sample = self.sample_random_point(rng);
        let nearest_idx = self.select_nearest(sample);
        let nearest = self.tree.node(nearest_idx).ok_or(NavigationError::UnknownNode(nearest_idx))?.position;

        let new_point = self.steer(nearest, sample);
        if new_point == nearest || self.collides_edge(nearest, new_point) {
            return Ok(false);
        }
        let new_idx = self.tree.add_child(nearest_idx, new_point)?;

        if !self.collides_edge(nearest, self.goal) && nearest.distance(&self.goal) <= 2.0 * self.max_step {
            self.tree.set_position(new_idx, self.goal)?;
            self.goal_node = Some(new_idx);
            self.found = true;
            debug!(iterations = self.iterations, tree_size = self.tree.len(), "Goal reached");
        }
        Ok(true)
    }

    /// Walks from `node` back to the root and stores the reversed trace as the path.
    pub fn trace_back(&mut self, node: usize) -> Result<Vec<ScreenPoint>, NavigationError> {
        let mut path = self.tree.trace_back(node)?;
        path.reverse();
        self.traced = true;
        Ok(path)
    }

    /// Runs at most `budget` iterations.
    pub fn step<R: Rng>(&mut self, rng: &mut R, budget: usize) -> PlannerStatus {
        if let Some(result) = &self.result {
            return PlannerStatus::Complete(result.clone());
        }

        let mut spent = 0;
        while !self.found && spent < budget {
            if self.iterations >= self.config.max_iterations {
                return PlannerStatus::Failed(NavigationError::PlanningFailed { iterations: self.iterations });
            }
            self.iterations += 1;
            spent += 1;
            if let Err(e) = self.extend(rng) {
                return PlannerStatus::Failed(e);
            }
        }

        match self.goal_node {
            Some(goal_node) if self.found => match self.trace_back(goal_node) {
                Ok(path) => {
                    let result = PlanResult {
                        path,
                        tree_size: self.tree.len(),
                        iterations: self.iterations,
                    };
                    info!(%result, "Planning complete");
                    self.result = Some(result.clone());
                    PlannerStatus::Complete(result)
                }
                Err(e) => PlannerStatus::Failed(e),
            },
            _ if self.iterations >= self.config.max_iterations => {
                PlannerStatus::Failed(NavigationError::PlanningFailed { iterations: self.iterations })
            }
            _ => PlannerStatus::Searching,
        }
    }

    /// Runs the episode to completion.
    pub fn plan<R: Rng>(&mut self, rng: &mut R) -> Result<PlanResult, NavigationError> {
        loop {
            match self.step(rng, self.config.max_iterations) {
                PlannerStatus::Searching => continue,
                PlannerStatus::Complete(result) => return Ok(result),
                PlannerStatus::Failed(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{GridPoint, MapFrame};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const EPSILON: f64 = 1e-9;

    fn create_test_grid() -> OccupancyGrid {
        OccupancyGrid::new(MapFrame::new(10, 10, (10.0, 10.0), (1000.0, 1000.0)).unwrap())
    }

    fn assert_edges_free(planner: &RrtPlanner) {
        for (a, b) in planner.tree().edges() {
            assert!(!planner.collides_edge(a, b), "edge {:?} -> {:?} crosses an obstacle", a, b);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(PlannerConfig::default().validate().is_ok());
        let bad = PlannerConfig { max_step: Some(0.0), ..Default::default() };
        assert!(matches!(bad.validate(), Err(NavigationError::InvalidParameter(_))));
        let bad = PlannerConfig { edge_samples: 0, ..Default::default() };
        assert!(RrtPlanner::new(create_test_grid(), ScreenPoint::default(), ScreenPoint::default(), bad).is_err());
    }

    #[test]
    fn test_default_max_step() {
        let grid = OccupancyGrid::new(MapFrame::new(10, 10, (600.0, 600.0), (1000.0, 1000.0)).unwrap());
        let planner = RrtPlanner::new(grid, ScreenPoint::default(), ScreenPoint::default(), PlannerConfig::default()).unwrap();
        assert!((planner.max_step() - 50.0).abs() < EPSILON);
    }

    #[test]
    fn test_steer() {
        let config = PlannerConfig { max_step: Some(2.0), ..Default::default() };
        let planner = RrtPlanner::new(create_test_grid(), ScreenPoint::default(), ScreenPoint::default(), config).unwrap();

        let near = planner.steer(ScreenPoint::new(1.0, 1.0), ScreenPoint::new(2.0, 2.0));
        assert_eq!(near, ScreenPoint::new(2.0, 2.0));

        let far = planner.steer(ScreenPoint::new(0.0, 0.0), ScreenPoint::new(0.0, 9.0));
        assert!(far.x.abs() < EPSILON);
        assert!((far.y - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_collides_edge() {
        let mut grid = create_test_grid();
        grid.mark_obstacle(GridPoint::new(5, 5));
        let planner = RrtPlanner::new(grid, ScreenPoint::default(), ScreenPoint::default(), PlannerConfig::default()).unwrap();

        assert!(planner.collides_edge(ScreenPoint::new(0.5, 5.5), ScreenPoint::new(9.5, 5.5)));
        assert!(!planner.collides_edge(ScreenPoint::new(0.5, 4.5), ScreenPoint::new(9.5, 4.5)));
        // Endpoints are checked too
        assert!(planner.collides_edge(ScreenPoint::new(5.5, 5.5), ScreenPoint::new(5.5, 5.5)));
        // Off-grid segments are free
        assert!(!planner.collides_edge(ScreenPoint::new(-5.0, -5.0), ScreenPoint::new(-1.0, 20.0)));
    }

    #[test]
    fn test_start_cell_never_blocks() {
        let mut grid = create_test_grid();
        grid.mark_obstacle(GridPoint::new(0, 0));
        let mut planner =
            RrtPlanner::new(grid, ScreenPoint::new(0.5, 0.5), ScreenPoint::new(9.5, 9.5), PlannerConfig::default())
                .unwrap();

        assert!(!planner.collides_edge(ScreenPoint::new(0.5, 0.5), ScreenPoint::new(0.9, 0.5)));
        let result = planner.plan(&mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(result.path.first(), Some(&ScreenPoint::new(0.5, 0.5)));
        assert_eq!(result.path.last(), Some(&ScreenPoint::new(9.5, 9.5)));
    }

    #[test]
    fn test_plan_open_grid() {
        let mut rng = StdRng::seed_from_u64(7);
        let start = ScreenPoint::new(0.0, 0.0);
        let goal = ScreenPoint::new(9.0, 9.0);
        let mut planner = RrtPlanner::new(create_test_grid(), start, goal, PlannerConfig::default()).unwrap();

        let result = planner.plan(&mut rng).unwrap();
        assert!(planner.is_found());
        assert!(planner.is_traced());
        assert!(result.iterations <= 5000);
        assert_eq!(result.path.first(), Some(&start));
        let last = result.path.last().unwrap();
        assert!(last.distance(&goal) <= 2.0 * planner.max_step());
        assert!(result.path.len() <= result.tree_size);

        // Consecutive waypoints are tree edges, so no longer than max_step
        for pair in result.path.windows(2).take(result.path.len().saturating_sub(2)) {
            assert!(pair[0].distance(&pair[1]) <= planner.max_step() + EPSILON);
        }
        assert_edges_free(&planner);
    }

    #[test]
    fn test_plan_around_wall() {
        let mut grid = create_test_grid();
        // Vertical wall at column 5 with a gap in the bottom two rows
        for y in 0..8 {
            grid.mark_obstacle(GridPoint::new(5, y));
        }
        let mut rng = StdRng::seed_from_u64(42);
        let start = ScreenPoint::new(1.5, 1.5);
        let goal = ScreenPoint::new(8.5, 1.5);
        let mut planner = RrtPlanner::new(grid, start, goal, PlannerConfig::default()).unwrap();

        let result = planner.plan(&mut rng).unwrap();
        assert_eq!(result.path.first(), Some(&start));
        assert_eq!(result.path.last(), Some(&goal));
        assert_edges_free(&planner);
        for pair in result.path.windows(2) {
            assert!(!planner.collides_edge(pair[0], pair[1]));
        }
    }

    #[test]
    fn test_step_budget_and_failure() {
        let mut grid = create_test_grid();
        // Goal boxed in by obstacles
        for y in 0..10 {
            grid.mark_obstacle(GridPoint::new(7, y));
        }
        let mut rng = StdRng::seed_from_u64(1);
        let config = PlannerConfig { max_iterations: 50, ..Default::default() };
        let mut planner =
            RrtPlanner::new(grid, ScreenPoint::new(1.0, 1.0), ScreenPoint::new(9.0, 9.0), config).unwrap();

        assert_eq!(planner.step(&mut rng, 10), PlannerStatus::Searching);
        assert_eq!(planner.iterations(), 10);

        let status = planner.step(&mut rng, 100);
        assert_eq!(status, PlannerStatus::Failed(NavigationError::PlanningFailed { iterations: 50 }));
        assert!(matches!(
            planner.plan(&mut rng),
            Err(NavigationError::PlanningFailed { iterations: 50 })
        ));
        assert_edges_free(&planner);
    }

    #[test]
    fn test_complete_is_sticky() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut planner = RrtPlanner::new(
            create_test_grid(),
            ScreenPoint::new(4.0, 4.0),
            ScreenPoint::new(5.0, 5.0),
            PlannerConfig::default(),
        )
        .unwrap();
        let first = planner.plan(&mut rng).unwrap();
        let again = planner.step(&mut rng, 10);
        assert_eq!(again, PlannerStatus::Complete(first.clone()));
        assert_eq!(first.path.len(), 2);
        assert!(format!("{}", first).contains("path_length: 2"));
    }
}
