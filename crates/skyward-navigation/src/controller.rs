//! Node-following navigation state machine.
//!
//! Each [`NavigationController::tick`] reads one [`SensorFrame`], advances any
//! in-flight planning episode by a bounded number of iterations, reacts to
//! threats and obstacles, follows the trajectory one node at a time while
//! dead-reckoning the pose, and finishes by sending exactly one velocity
//! command while the drone is flying.

use crate::clock::Clock;
use crate::error::NavigationError;
use crate::map::{
    persist, DeadReckoner, GridPoint, LegProgress, ObstacleMapper, OccupancyGrid, ScreenPoint,
};
use crate::rrt::{PlannerConfig, PlannerStatus, RrtPlanner};
use crate::sensors::{
    vector_to_command, DroneActuator, FollowBand, FollowGains, OperatorCommand, ProximityCalibration,
    ProximityReading, SensorFrame, ThreatObservation,
};
use crate::smoothing::{PathSmoother, SmootherConfig};
use crate::trajectory::Trajectory;
use rand::seq::IndexedRandom;
use rand::Rng;
use skyward_kinematics::{Pose, RcCommand, Rotation};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tuning for the control loop.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ControllerConfig {
    /// Cruise speed between nodes (cm/s).
    pub nominal_speed: f64,
    /// Forward command sent per unit of cruise speed.
    pub forward_command_gain: f64,
    /// Symmetric limit applied to every command component.
    pub command_limit: f64,
    /// Scale from nominal to dead-reckoned speed.
    pub pose_calibration: f64,
    /// Uncertainty radius (cells) of proximity obstacles.
    pub obstacle_radius: u32,
    /// Uncertainty radius (cells) of mapped threats.
    pub threat_radius: u32,
    /// Record followed threats as obstacles.
    pub map_threats: bool,
    /// Yaw command issued while turning away from an obstacle.
    pub avoid_yaw_command: f64,
    /// Degrees per second of heading change per unit of yaw command.
    pub yaw_degrees_per_command: f64,
    /// Consecutive threat-free ticks before returning to the trajectory.
    pub threat_clear_frames: u32,
    /// Speed (cm/s) per unit of forward command while following a threat.
    pub threat_speed_per_command: f64,
    /// Angular spacing (degrees) of candidate waypoints.
    pub waypoint_angle_step_deg: usize,
    /// Planner iterations run per tick.
    pub planner_iterations_per_tick: usize,
    /// Failed plans in a row before the controller gives up and hovers.
    pub max_consecutive_plan_failures: u32,
    /// Where to write the grid after every change.
    pub grid_dump_path: Option<PathBuf>,
    /// Where to write each new path.
    pub path_dump_path: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            nominal_speed: 100.0,
            forward_command_gain: 150.0 / 117.0,
            command_limit: 100.0,
            pose_calibration: 1.0,
            obstacle_radius: 2,
            threat_radius: 4,
            map_threats: true,
            avoid_yaw_command: 30.0,
            yaw_degrees_per_command: 15.0 / 36.0,
            threat_clear_frames: 50,
            threat_speed_per_command: 39.0 / 50.0,
            waypoint_angle_step_deg: 4,
            planner_iterations_per_tick: 250,
            max_consecutive_plan_failures: 5,
            grid_dump_path: None,
            path_dump_path: None,
        }
    }
}

/// Everything the navigation stack can be tuned with.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct NavigationConfig {
    pub planner: PlannerConfig,
    pub smoother: SmootherConfig,
    pub controller: ControllerConfig,
    pub proximity: ProximityCalibration,
    pub follow_band: FollowBand,
    pub follow_gains: FollowGains,
}

impl NavigationConfig {
    /// Checks every section.
    pub fn validate(&self) -> Result<(), NavigationError> {
        self.planner.validate()?;
        PathSmoother::new(self.smoother)?;
        let c = &self.controller;
        if !(c.nominal_speed > 0.0) {
            return Err(NavigationError::InvalidParameter("nominal_speed must be positive"));
        }
        if !(c.command_limit > 0.0) {
            return Err(NavigationError::InvalidParameter("command_limit must be positive"));
        }
        if !(c.pose_calibration > 0.0) {
            return Err(NavigationError::InvalidParameter("pose_calibration must be positive"));
        }
        if c.waypoint_angle_step_deg == 0 {
            return Err(NavigationError::InvalidParameter("waypoint_angle_step_deg must be non-zero"));
        }
        if c.planner_iterations_per_tick == 0 {
            return Err(NavigationError::InvalidParameter("planner_iterations_per_tick must be non-zero"));
        }
        Ok(())
    }
}

/// Progress along the current trajectory leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeState {
    /// Holding at the front node, ready to turn towards the next one.
    AtNode,
    /// Flying towards the second node.
    EnRoute {
        /// Clock time the leg started.
        started_at: f64,
        /// Seconds budgeted for the leg.
        travel_time: f64,
    },
}

/// Who is flying the drone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightMode {
    Landed,
    Autonomous,
    Manual,
}

/// Why a planning episode was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplanReason {
    Initial,
    NewGoal,
    Exhausted,
    ObstacleCleared,
    ThreatLost,
    PlanFailed,
    ManualReleased,
}

#[derive(Debug)]
struct PlanningEpisode {
    generation: u64,
    reason: ReplanReason,
    planner: RrtPlanner,
}

/// Drives the drone along planned trajectories.
pub struct NavigationController<C: Clock, R: Rng> {
    config: NavigationConfig,
    grid: OccupancyGrid,
    pose: Pose,
    goal: ScreenPoint,
    trajectory: Trajectory,
    node_state: NodeState,
    mode: FlightMode,
    smoother: PathSmoother,
    reckoner: DeadReckoner,
    episode: Option<PlanningEpisode>,
    generation: u64,
    plan_failures: u32,
    stalled: bool,
    waypoint_warned: bool,
    obstacle_flag: bool,
    threat_tracking: bool,
    no_threat_frames: u32,
    command: RcCommand,
    manual_command: RcCommand,
    last_tick: Option<f64>,
    clock: C,
    rng: R,
}

impl<C: Clock, R: Rng> NavigationController<C, R> {
    /// Creates a landed controller.
    ///
    /// # Arguments
    /// * `grid` - Map to navigate and update
    /// * `pose` - Starting pose in the screen frame
    /// * `goal` - First goal in the screen frame
    pub fn new(
        grid: OccupancyGrid,
        pose: Pose,
        goal: ScreenPoint,
        config: NavigationConfig,
        clock: C,
        rng: R,
    ) -> Result<Self, NavigationError> {
        config.validate()?;
        let smoother = PathSmoother::new(config.smoother)?;
        let reckoner = DeadReckoner::new(config.controller.pose_calibration);
        Ok(NavigationController {
            config,
            grid,
            pose,
            goal,
            trajectory: Trajectory::new(),
            node_state: NodeState::AtNode,
            mode: FlightMode::Landed,
            smoother,
            reckoner,
            episode: None,
            generation: 0,
            plan_failures: 0,
            stalled: false,
            waypoint_warned: false,
            obstacle_flag: false,
            threat_tracking: false,
            no_threat_frames: 0,
            command: RcCommand::hover(),
            manual_command: RcCommand::hover(),
            last_tick: None,
            clock,
            rng,
        })
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn goal(&self) -> ScreenPoint {
        self.goal
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn node_state(&self) -> NodeState {
        self.node_state
    }

    pub fn mode(&self) -> FlightMode {
        self.mode
    }

    /// Last command sent, before clamping.
    pub fn command(&self) -> RcCommand {
        self.command
    }

    /// True while a planning episode is in flight.
    pub fn is_planning(&self) -> bool {
        self.episode.is_some()
    }

    /// Generation of the most recent planning episode.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn obstacle_flagged(&self) -> bool {
        self.obstacle_flag
    }

    pub fn threat_tracking(&self) -> bool {
        self.threat_tracking
    }

    pub fn no_threat_frames(&self) -> u32 {
        self.no_threat_frames
    }

    /// True after too many failed plans in a row.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// True while hovering with no waypoint candidate; the warning is logged
    /// once per such stretch.
    pub fn waypoint_unreachable(&self) -> bool {
        self.waypoint_warned
    }

    /// Grid cell containing the pose.
    pub fn pose_cell(&self) -> GridPoint {
        self.grid.screen_to_grid(ScreenPoint::new(self.pose.x, self.pose.y))
    }

    /// Applies an operator command.
    pub fn handle_operator<A: DroneActuator + ?Sized>(
        &mut self,
        command: OperatorCommand,
        actuator: &mut A,
    ) -> anyhow::Result<()> {
        match command {
            OperatorCommand::TakeOff => {
                if self.mode != FlightMode::Landed {
                    return Ok(());
                }
                actuator.take_off()?;
                self.mode = FlightMode::Autonomous;
                self.last_tick = None;
                info!(pose = %self.pose, "Took off");
                if self.trajectory.len() < 2 && self.episode.is_none() {
                    self.request_replan(ReplanReason::Initial);
                }
            }
            OperatorCommand::Land => {
                if self.mode == FlightMode::Landed {
                    return Ok(());
                }
                self.command = RcCommand::hover();
                if let Err(e) = actuator.send_rc(RcCommand::hover()) {
                    warn!(error = %e, "Failed to zero velocity before landing");
                }
                actuator.land()?;
                self.mode = FlightMode::Landed;
                self.episode = None;
                self.node_state = NodeState::AtNode;
                info!(pose = %self.pose, "Landed");
            }
            OperatorCommand::ManualControl(true) => {
                if self.mode == FlightMode::Autonomous {
                    self.mode = FlightMode::Manual;
                    self.manual_command = RcCommand::hover();
                    info!("Manual control engaged");
                }
            }
            OperatorCommand::ManualControl(false) => {
                if self.mode == FlightMode::Manual {
                    self.mode = FlightMode::Autonomous;
                    self.last_tick = None;
                    info!("Manual control released");
                    self.request_replan(ReplanReason::ManualReleased);
                }
            }
            OperatorCommand::Manual(rc) => {
                self.manual_command = rc;
            }
        }
        Ok(())
    }

    /// Sets a new goal and plans towards it.
    pub fn navigate_to(&mut self, goal: ScreenPoint) {
        self.goal = goal;
        self.stalled = false;
        self.plan_failures = 0;
        self.request_replan(ReplanReason::NewGoal);
    }

    /// Starts a planning episode from the pose to the current goal.
    ///
    /// Any episode still in flight is discarded. The trajectory is dropped and
    /// the drone hovers until the new plan completes.
    pub fn request_replan(&mut self, reason: ReplanReason) {
        self.generation += 1;
        let start = ScreenPoint::new(self.pose.x, self.pose.y);
        match RrtPlanner::new(self.grid.clone(), start, self.goal, self.config.planner) {
            Ok(planner) => {
                if let Some(stale) = self.episode.take() {
                    debug!(generation = stale.generation, "Discarding stale planning episode");
                }
                info!(generation = self.generation, ?reason, ?start, goal = ?self.goal, "Replanning");
                self.episode = Some(PlanningEpisode {
                    generation: self.generation,
                    reason,
                    planner,
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to start planning episode");
                self.episode = None;
            }
        }
        self.trajectory.clear();
        self.node_state = NodeState::AtNode;
        self.command.forward = 0.0;
    }

    /// Smooths `path` from the current pose and makes it the active trajectory.
    pub fn replace_trajectory(&mut self, path: &[ScreenPoint]) {
        self.trajectory = self.smoother.smooth(&self.grid, path, self.pose_cell());
        self.node_state = NodeState::AtNode;
        self.command.forward = 0.0;
        info!(nodes = self.trajectory.len(), trajectory = %self.trajectory, "New trajectory");
    }

    /// In-grid, obstacle-free cells on a circle around the pose cell.
    ///
    /// The circle has a radius of half the grid width.
    pub fn waypoint_candidates(&self) -> Vec<GridPoint> {
        let center = self.pose_cell();
        let radius = (self.grid.width() / 2) as f64;
        let mut candidates: Vec<GridPoint> = Vec::new();
        for deg in (0..360).step_by(self.config.controller.waypoint_angle_step_deg) {
            let angle = (deg as f64).to_radians();
            let p = GridPoint::new(
                center.x + (angle.cos() * radius).trunc() as i32,
                center.y + (angle.sin() * radius).trunc() as i32,
            );
            if self.grid.contains(p) && !self.grid.is_obstacle(p) && !candidates.contains(&p) {
                candidates.push(p);
            }
        }
        candidates
    }

    /// Picks a random candidate waypoint and makes it the goal.
    pub fn select_waypoint(&mut self) -> Option<ScreenPoint> {
        let candidates = self.waypoint_candidates();
        let cell = *candidates.choose(&mut self.rng)?;
        self.goal = self.grid.cell_center_screen(cell);
        info!(?cell, goal = ?self.goal, "Selected waypoint");
        Some(self.goal)
    }

    /// Runs one control step.
    ///
    /// # Returns
    /// * `Some(RcCommand)` - The command sent to the actuator this tick
    /// * `None` - The drone is landed and nothing was sent
    pub fn tick<A: DroneActuator + ?Sized>(&mut self, frame: SensorFrame, actuator: &mut A) -> Option<RcCommand> {
        let now = self.clock.now();
        let prev_tick = self.last_tick.unwrap_or(now);
        self.last_tick = Some(now);
        let dt = (now - prev_tick).max(0.0);

        let command = match self.mode {
            FlightMode::Landed => return None,
            FlightMode::Manual => self.manual_command,
            FlightMode::Autonomous => {
                self.advance_planning();
                let threat_active = self.handle_threat(frame.threat, dt);
                if !threat_active && !self.threat_tracking && !self.obstacle_flag {
                    self.follow_trajectory(now, prev_tick, actuator);
                }
                self.handle_proximity(frame.proximity, dt);
                self.command
            }
        };

        let limit = self.config.controller.command_limit;
        let sent = command.clamped(limit).unwrap_or(RcCommand::hover());
        if let Err(e) = actuator.send_rc(sent) {
            warn!(error = %e, command = %sent, "Failed to send velocity command");
        }
        debug!(mode = ?self.mode, command = %sent, pose = %self.pose, "Tick");
        Some(sent)
    }

    fn advance_planning(&mut self) {
        let budget = self.config.controller.planner_iterations_per_tick;
        let Some(episode) = self.episode.as_mut() else {
            return;
        };
        match episode.planner.step(&mut self.rng, budget) {
            PlannerStatus::Searching => {}
            PlannerStatus::Complete(result) => {
                let generation = episode.generation;
                let reason = episode.reason;
                self.episode = None;
                self.plan_failures = 0;
                self.stalled = false;
                info!(generation, ?reason, %result, "Plan ready");
                if let Some(path) = &self.config.controller.path_dump_path {
                    if let Err(e) = persist::write_path(path, &result.path) {
                        warn!(error = %e, "Failed to write path");
                    }
                }
                self.replace_trajectory(&result.path);
            }
            PlannerStatus::Failed(e) => {
                let generation = episode.generation;
                self.episode = None;
                self.plan_failures += 1;
                warn!(generation, error = %e, failures = self.plan_failures, "Planning failed");
                if self.plan_failures >= self.config.controller.max_consecutive_plan_failures {
                    error!(failures = self.plan_failures, "Giving up on planning, hovering in place");
                    self.stalled = true;
                } else if self.select_waypoint().is_some() {
                    self.request_replan(ReplanReason::PlanFailed);
                }
            }
        }
    }

    /// Returns true if a threat was seen this tick.
    fn handle_threat(&mut self, observation: Option<ThreatObservation>, dt: f64) -> bool {
        match observation.filter(|o| o.present) {
            Some(threat) => {
                if !self.threat_tracking {
                    info!(distance = threat.distance, bearing = threat.bearing, "Threat detected");
                    self.node_state = NodeState::AtNode;
                }
                self.threat_tracking = true;
                self.no_threat_frames = 0;

                let (yaw, vertical) = vector_to_command(threat.follow, self.config.follow_gains);
                let forward = self.config.follow_band.forward_command(threat.distance);
                self.command = RcCommand::new(0.0, forward, vertical, yaw);

                self.pose = self.pose.with_heading(self.pose.heading + threat.bearing);
                let speed = forward
                    * self.config.controller.threat_speed_per_command
                    * self.grid.frame().screen_per_area();
                if let Err(e) = self.reckoner.advance_along_heading(&mut self.grid, &mut self.pose, speed, dt) {
                    warn!(error = %e, "Failed to dead-reckon while following threat");
                }

                if self.config.controller.map_threats {
                    // Bearing is zero: the heading already points at the threat
                    let radius = self.config.controller.threat_radius;
                    ObstacleMapper::insert_obstacle(&mut self.grid, &self.pose, threat.distance, 0.0, radius);
                    self.persist_grid();
                }
                true
            }
            None => {
                if self.threat_tracking {
                    self.command = RcCommand::hover();
                    self.no_threat_frames += 1;
                    if self.no_threat_frames >= self.config.controller.threat_clear_frames {
                        info!(frames = self.no_threat_frames, "Threat lost, resuming navigation");
                        self.no_threat_frames = 0;
                        self.threat_tracking = false;
                        self.request_replan(ReplanReason::ThreatLost);
                    }
                }
                false
            }
        }
    }

    fn handle_proximity(&mut self, raw: Option<f64>, dt: f64) {
        match self.config.proximity.classify(raw) {
            ProximityReading::Obstacle { distance } => {
                if !self.obstacle_flag {
                    info!(distance, "Obstacle ahead");
                }
                self.obstacle_flag = true;
                self.node_state = NodeState::AtNode;
                let radius = self.config.controller.obstacle_radius;
                ObstacleMapper::insert_obstacle(&mut self.grid, &self.pose, distance, 0.0, radius);
                self.persist_grid();
                self.avoid(dt);
            }
            ProximityReading::Indeterminate if self.obstacle_flag => self.avoid(dt),
            ProximityReading::Clear if self.obstacle_flag => {
                info!("Obstacle cleared");
                self.obstacle_flag = false;
                self.command.yaw = 0.0;
                self.request_replan(ReplanReason::ObstacleCleared);
            }
            _ => {}
        }
    }

    /// Turns in place away from an obstacle.
    fn avoid(&mut self, dt: f64) {
        let yaw = self.config.controller.avoid_yaw_command;
        self.command = RcCommand::new(0.0, 0.0, 0.0, yaw);
        let turn = (yaw * self.config.controller.yaw_degrees_per_command * dt).to_radians();
        self.pose = self.pose.with_heading(self.pose.heading + turn);
    }

    fn follow_trajectory<A: DroneActuator + ?Sized>(&mut self, now: f64, prev_tick: f64, actuator: &mut A) {
        let (Some(prev), Some(next)) = (self.trajectory.current(), self.trajectory.next()) else {
            self.command = RcCommand::hover();
            if self.episode.is_none() && !self.stalled {
                if self.select_waypoint().is_some() {
                    info!("Trajectory exhausted");
                    self.waypoint_warned = false;
                    self.request_replan(ReplanReason::Exhausted);
                } else if !self.waypoint_warned {
                    warn!(cell = ?self.pose_cell(), "No reachable waypoint, hovering");
                    self.waypoint_warned = true;
                }
            }
            return;
        };

        match self.node_state {
            NodeState::AtNode => {
                let from = self.grid.cell_center_area(prev);
                let to = self.grid.cell_center_area(next);
                let bearing = skyward_kinematics::bearing((from.x, from.y), (to.x, to.y));
                let delta = Pose::normalize_angle(bearing - self.pose.heading);
                let rotation = Rotation::from_delta(delta);
                if rotation.degrees > 0.0 {
                    if let Err(e) = actuator.rotate(rotation) {
                        warn!(error = %e, %rotation, "Failed to rotate");
                    }
                }
                self.pose = self.pose.with_heading(bearing);

                let travel_time = from.distance(&to) / self.config.controller.nominal_speed;
                if travel_time <= 0.0 {
                    self.trajectory.pop_front();
                    return;
                }
                let c = &self.config.controller;
                self.command = RcCommand::new(0.0, c.forward_command_gain * c.nominal_speed, 0.0, 0.0);
                self.node_state = NodeState::EnRoute { started_at: now, travel_time };
                debug!(?prev, ?next, travel_time, %rotation, "Leaving node");
            }
            NodeState::EnRoute { started_at, travel_time } => {
                let end = started_at + travel_time;
                let leg = LegProgress {
                    prev,
                    next,
                    at_node: false,
                    travel_time,
                    commanded_forward: self.command.forward,
                    dt: (now.min(end) - prev_tick.min(end)).max(0.0),
                };
                if let Err(e) = self.reckoner.update_drone_pose(&mut self.grid, &mut self.pose, leg) {
                    warn!(error = %e, "Failed to dead-reckon");
                }

                if now - started_at >= travel_time {
                    self.command.forward = 0.0;
                    self.trajectory.pop_front();
                    self.node_state = NodeState::AtNode;
                    debug!(node = ?next, pose = %self.pose, "Reached node");
                }
            }
        }
    }

    fn persist_grid(&self) {
        if let Some(path) = &self.config.controller.grid_dump_path {
            if let Err(e) = persist::write_grid(path, &self.grid) {
                warn!(error = %e, "Failed to write grid");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::map::{CellState, MapFrame};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;

    const EPSILON: f64 = 1e-9;

    #[derive(Default)]
    struct RecordingActuator {
        rotations: Vec<Rotation>,
        commands: Vec<RcCommand>,
        take_offs: usize,
        landings: usize,
    }

    impl DroneActuator for RecordingActuator {
        fn take_off(&mut self) -> anyhow::Result<()> {
            self.take_offs += 1;
            Ok(())
        }
        fn land(&mut self) -> anyhow::Result<()> {
            self.landings += 1;
            Ok(())
        }
        fn rotate(&mut self, rotation: Rotation) -> anyhow::Result<()> {
            self.rotations.push(rotation);
            Ok(())
        }
        fn send_rc(&mut self, command: RcCommand) -> anyhow::Result<()> {
            self.commands.push(command);
            Ok(())
        }
    }

    fn create_controller(
        clock: &SimulatedClock,
        config: NavigationConfig,
    ) -> NavigationController<SimulatedClock, StdRng> {
        // 10x10 cells of 10px on screen and 100cm in the area
        let grid = OccupancyGrid::new(MapFrame::new(10, 10, (100.0, 100.0), (1000.0, 1000.0)).unwrap());
        NavigationController::new(
            grid,
            Pose::new(5.0, 5.0, 0.0),
            ScreenPoint::new(95.0, 95.0),
            config,
            clock.clone(),
            StdRng::seed_from_u64(11),
        )
        .unwrap()
    }

    fn slow_config() -> NavigationConfig {
        let mut config = NavigationConfig::default();
        config.controller.nominal_speed = 50.0;
        config
    }

    #[test]
    fn test_invalid_config() {
        let mut config = NavigationConfig::default();
        config.controller.nominal_speed = 0.0;
        let grid = OccupancyGrid::new(MapFrame::new(10, 10, (100.0, 100.0), (1000.0, 1000.0)).unwrap());
        let result = NavigationController::new(
            grid,
            Pose::default(),
            ScreenPoint::default(),
            config,
            SimulatedClock::new(),
            StdRng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(NavigationError::InvalidParameter(_))));
    }

    #[test]
    fn test_landed_sends_nothing() {
        let clock = SimulatedClock::new();
        let mut nav = create_controller(&clock, slow_config());
        let mut actuator = RecordingActuator::default();
        assert_eq!(nav.tick(SensorFrame::default(), &mut actuator), None);
        assert!(actuator.commands.is_empty());
    }

    #[test]
    fn test_leg_travel_time_and_arrival() {
        let clock = SimulatedClock::new();
        let mut nav = create_controller(&clock, slow_config());
        let mut actuator = RecordingActuator::default();

        nav.replace_trajectory(&[ScreenPoint::new(5.0, 5.0), ScreenPoint::new(15.0, 5.0)]);
        assert_eq!(
            nav.trajectory().iter().copied().collect::<Vec<_>>(),
            vec![GridPoint::new(0, 0), GridPoint::new(1, 0)]
        );
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();
        assert!(!nav.is_planning());

        // Leave the first node: 100cm at 50cm/s
        let sent = nav.tick(SensorFrame::default(), &mut actuator).unwrap();
        match nav.node_state() {
            NodeState::EnRoute { started_at, travel_time } => {
                assert_eq!(started_at, 0.0);
                assert!((travel_time - 2.0).abs() < EPSILON);
            }
            other => panic!("expected EnRoute, got {:?}", other),
        }
        assert!((sent.forward - 50.0 * 150.0 / 117.0).abs() < EPSILON);
        assert!(actuator.rotations.is_empty());

        clock.advance(Duration::from_secs(1));
        nav.tick(SensorFrame::default(), &mut actuator);
        assert!(matches!(nav.node_state(), NodeState::EnRoute { .. }));
        assert!((nav.pose().x - 10.0).abs() < EPSILON);

        clock.advance(Duration::from_secs(1));
        let sent = nav.tick(SensorFrame::default(), &mut actuator).unwrap();
        assert_eq!(nav.node_state(), NodeState::AtNode);
        assert_eq!(sent.forward, 0.0);
        assert!((nav.pose().x - 15.0).abs() < EPSILON);
        assert_eq!(nav.trajectory().len(), 1);
        assert_eq!(nav.grid().cell(GridPoint::new(1, 0)), CellState::Traversed);
        assert_eq!(actuator.commands.len(), 3);
    }

    #[test]
    fn test_rotation_towards_next_node() {
        let clock = SimulatedClock::new();
        let mut nav = create_controller(&clock, slow_config());
        let mut actuator = RecordingActuator::default();

        // Next node is straight down the screen: a clockwise quarter turn
        nav.replace_trajectory(&[ScreenPoint::new(5.0, 5.0), ScreenPoint::new(5.0, 15.0)]);
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();
        nav.tick(SensorFrame::default(), &mut actuator);

        assert_eq!(actuator.rotations.len(), 1);
        let rotation = actuator.rotations[0];
        assert_eq!(rotation.direction, skyward_kinematics::RotationDirection::Clockwise);
        assert!((rotation.degrees - 90.0).abs() < EPSILON);
        assert!((nav.pose().heading - std::f64::consts::FRAC_PI_2).abs() < EPSILON);
    }

    #[test]
    fn test_exhaustion_selects_waypoint() {
        let clock = SimulatedClock::new();
        let mut nav = create_controller(&clock, slow_config());
        let mut actuator = RecordingActuator::default();

        nav.replace_trajectory(&[ScreenPoint::new(5.0, 5.0)]);
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();
        // A one-node trajectory triggers a plan on take-off
        assert!(nav.is_planning());
        assert_eq!(nav.generation(), 1);

        let candidates = nav.waypoint_candidates();
        assert!(!candidates.is_empty());
        let pose_cell = nav.pose_cell();
        for c in &candidates {
            assert!(nav.grid().contains(*c));
            let dx = (c.x - pose_cell.x) as f64;
            let dy = (c.y - pose_cell.y) as f64;
            assert!((dx * dx + dy * dy).sqrt() <= 5.0 + EPSILON);
        }

        let goal = nav.select_waypoint().unwrap();
        assert!(candidates.contains(&nav.grid().screen_to_grid(goal)));
    }

    #[test]
    fn test_plan_completes_into_trajectory() {
        let clock = SimulatedClock::new();
        let mut nav = create_controller(&clock, slow_config());
        let mut actuator = RecordingActuator::default();
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();

        for _ in 0..40 {
            if !nav.is_planning() {
                break;
            }
            nav.tick(SensorFrame::default(), &mut actuator);
            clock.advance(Duration::from_millis(33));
        }
        assert!(!nav.is_planning());
        assert!(nav.trajectory().len() >= 2);
        assert_eq!(nav.trajectory().current(), Some(GridPoint::new(0, 0)));
        assert!(nav.trajectory().iter().any(|p| *p == GridPoint::new(9, 9)));
    }

    #[test]
    fn test_stale_plan_is_discarded() {
        let clock = SimulatedClock::new();
        let mut config = slow_config();
        config.controller.planner_iterations_per_tick = 1;
        let mut nav = create_controller(&clock, config);
        let mut actuator = RecordingActuator::default();

        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();
        nav.tick(SensorFrame::default(), &mut actuator);
        assert_eq!(nav.generation(), 1);

        // Retarget before the first episode finishes
        nav.navigate_to(ScreenPoint::new(95.0, 5.0));
        assert_eq!(nav.generation(), 2);
        assert!(nav.trajectory().is_empty());

        for _ in 0..5000 {
            if !nav.is_planning() {
                break;
            }
            nav.tick(SensorFrame::default(), &mut actuator);
        }
        assert!(!nav.is_planning());
        assert_eq!(nav.goal(), ScreenPoint::new(95.0, 5.0));
        assert!(nav.trajectory().iter().any(|p| *p == GridPoint::new(9, 0)));
    }

    #[test]
    fn test_obstacle_interrupt_and_clear() {
        let clock = SimulatedClock::new();
        let mut nav = create_controller(&clock, slow_config());
        let mut actuator = RecordingActuator::default();
        nav.replace_trajectory(&[ScreenPoint::new(5.0, 5.0), ScreenPoint::new(15.0, 5.0)]);
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();

        // Raw 117.5 is 80cm, or 8px ahead of the pose
        let frame = SensorFrame { proximity: Some(235.0 * 0.5), ..Default::default() };
        let sent = nav.tick(frame, &mut actuator).unwrap();
        assert!(nav.obstacle_flagged());
        assert_eq!(sent.forward, 0.0);
        assert_eq!(sent.yaw, 30.0);
        // One cell ahead, so the uncertainty ring is clipped away
        assert!(nav.grid().is_obstacle(GridPoint::new(1, 0)));
        assert_eq!(nav.grid().obstacles().len(), 1);
        assert_eq!(nav.node_state(), NodeState::AtNode);

        // Between thresholds: keep turning, no replan
        clock.advance(Duration::from_secs(1));
        nav.tick(SensorFrame { proximity: Some(220.0), ..Default::default() }, &mut actuator);
        assert!(nav.obstacle_flagged());
        assert!(!nav.is_planning());
        assert!((nav.pose().heading - (12.5f64).to_radians()).abs() < EPSILON);

        nav.tick(SensorFrame { proximity: Some(240.0), ..Default::default() }, &mut actuator);
        assert!(!nav.obstacle_flagged());
        assert!(nav.is_planning());
    }

    #[test]
    fn test_threat_following_and_release() {
        let clock = SimulatedClock::new();
        let mut config = slow_config();
        config.controller.map_threats = false;
        let mut nav = create_controller(&clock, config);
        let mut actuator = RecordingActuator::default();
        nav.replace_trajectory(&[ScreenPoint::new(5.0, 5.0), ScreenPoint::new(15.0, 5.0)]);
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();

        let threat = ThreatObservation {
            distance: 50.0,
            bearing: 0.0,
            present: true,
            follow: crate::sensors::FollowVector { magnitude: 480.0, angle: 0.0 },
        };
        let sent = nav.tick(SensorFrame { threat: Some(threat), ..Default::default() }, &mut actuator).unwrap();
        assert!(nav.threat_tracking());
        assert!((sent.forward - 20.0).abs() < EPSILON);
        assert!((sent.yaw - 75.0).abs() < EPSILON);

        for i in 1..50 {
            let sent = nav.tick(SensorFrame::default(), &mut actuator).unwrap();
            assert!(sent.is_hover());
            assert_eq!(nav.no_threat_frames(), i);
            assert!(nav.threat_tracking());
        }
        assert!(!nav.is_planning());

        nav.tick(SensorFrame::default(), &mut actuator);
        assert!(!nav.threat_tracking());
        assert_eq!(nav.no_threat_frames(), 0);
        assert!(nav.is_planning());
    }

    #[test]
    fn test_threat_is_mapped() {
        let clock = SimulatedClock::new();
        let mut nav = create_controller(&clock, slow_config());
        let mut actuator = RecordingActuator::default();
        nav.replace_trajectory(&[ScreenPoint::new(5.0, 5.0), ScreenPoint::new(15.0, 5.0)]);
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();

        let threat = ThreatObservation {
            distance: 300.0,
            bearing: 0.0,
            present: true,
            follow: Default::default(),
        };
        nav.tick(SensorFrame { threat: Some(threat), ..Default::default() }, &mut actuator);
        // 300cm is 30px ahead: cell (3, 0) plus rings 1..2, short of the drone
        assert!(nav.grid().is_obstacle(GridPoint::new(3, 0)));
        assert!(nav.grid().is_obstacle(GridPoint::new(1, 0)));
        assert!(nav.grid().is_obstacle(GridPoint::new(5, 0)));
        assert!(!nav.grid().is_obstacle(GridPoint::new(0, 0)));
        assert!(!nav.grid().is_obstacle(GridPoint::new(6, 0)));
    }

    #[test]
    fn test_manual_and_land() {
        let clock = SimulatedClock::new();
        let mut nav = create_controller(&clock, slow_config());
        let mut actuator = RecordingActuator::default();
        nav.replace_trajectory(&[ScreenPoint::new(5.0, 5.0), ScreenPoint::new(15.0, 5.0)]);
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();

        nav.handle_operator(OperatorCommand::ManualControl(true), &mut actuator).unwrap();
        let manual = RcCommand::new(10.0, -20.0, 5.0, 0.0);
        nav.handle_operator(OperatorCommand::Manual(manual), &mut actuator).unwrap();
        assert_eq!(nav.tick(SensorFrame::default(), &mut actuator), Some(manual));
        assert_eq!(nav.mode(), FlightMode::Manual);

        nav.handle_operator(OperatorCommand::ManualControl(false), &mut actuator).unwrap();
        assert_eq!(nav.mode(), FlightMode::Autonomous);
        assert!(nav.is_planning());

        nav.handle_operator(OperatorCommand::Land, &mut actuator).unwrap();
        assert_eq!(nav.mode(), FlightMode::Landed);
        assert_eq!(actuator.landings, 1);
        assert_eq!(actuator.commands.last(), Some(&RcCommand::hover()));
        assert!(!nav.is_planning());
        assert_eq!(nav.tick(SensorFrame::default(), &mut actuator), None);
    }

    /// The default 40x30 map with the drone in cell (15, 15).
    fn create_field_controller(clock: &SimulatedClock) -> NavigationController<SimulatedClock, StdRng> {
        let grid = OccupancyGrid::new(MapFrame::new(40, 30, (400.0, 300.0), (2000.0, 1500.0)).unwrap());
        NavigationController::new(
            grid,
            Pose::new(155.0, 155.0, 0.0),
            ScreenPoint::new(385.0, 285.0),
            NavigationConfig::default(),
            clock.clone(),
            StdRng::seed_from_u64(5),
        )
        .unwrap()
    }

    fn tick_until_planned(
        nav: &mut NavigationController<SimulatedClock, StdRng>,
        clock: &SimulatedClock,
        actuator: &mut RecordingActuator,
    ) {
        for _ in 0..200 {
            if !nav.is_planning() {
                break;
            }
            nav.tick(SensorFrame::default(), actuator);
            clock.advance(Duration::from_millis(33));
        }
    }

    #[test]
    fn test_close_threat_does_not_trap_drone() {
        let clock = SimulatedClock::new();
        let mut nav = create_field_controller(&clock);
        let mut actuator = RecordingActuator::default();
        nav.replace_trajectory(&[ScreenPoint::new(155.0, 155.0), ScreenPoint::new(165.0, 155.0)]);
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();

        // Inside the follow band, so the drone holds still
        let threat = ThreatObservation {
            distance: 37.0,
            bearing: 0.0,
            present: true,
            follow: Default::default(),
        };
        nav.tick(SensorFrame { threat: Some(threat), ..Default::default() }, &mut actuator);
        assert_eq!(nav.pose_cell(), GridPoint::new(15, 15));
        assert!(!nav.grid().is_obstacle(GridPoint::new(15, 15)));

        for _ in 0..50 {
            nav.tick(SensorFrame::default(), &mut actuator);
        }
        assert!(!nav.threat_tracking());
        assert!(nav.is_planning());

        tick_until_planned(&mut nav, &clock, &mut actuator);
        assert!(!nav.is_planning());
        assert!(!nav.is_stalled());
        assert!(nav.trajectory().len() >= 2);
        assert!(!nav.grid().is_obstacle(nav.pose_cell()));
    }

    #[test]
    fn test_close_obstacle_does_not_trap_drone() {
        let clock = SimulatedClock::new();
        let mut nav = create_field_controller(&clock);
        let mut actuator = RecordingActuator::default();
        nav.replace_trajectory(&[ScreenPoint::new(155.0, 155.0), ScreenPoint::new(165.0, 155.0)]);
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();

        // Raw 20 is under 14cm: inside the drone's own cell
        nav.tick(SensorFrame { proximity: Some(20.0), ..Default::default() }, &mut actuator);
        assert!(nav.obstacle_flagged());
        assert!(nav.grid().obstacles().is_empty());

        // Raw 100 is 68cm: the next cell over, ring clipped away
        nav.tick(SensorFrame { proximity: Some(100.0), ..Default::default() }, &mut actuator);
        assert_eq!(nav.grid().obstacles(), &[GridPoint::new(16, 15)]);

        nav.tick(SensorFrame { proximity: Some(240.0), ..Default::default() }, &mut actuator);
        assert!(!nav.obstacle_flagged());
        tick_until_planned(&mut nav, &clock, &mut actuator);
        assert!(!nav.is_stalled());
        assert!(nav.trajectory().len() >= 2);
    }

    #[test]
    fn test_successful_plan_clears_stall() {
        let clock = SimulatedClock::new();
        let mut config = slow_config();
        config.planner.max_iterations = 1;
        config.controller.max_consecutive_plan_failures = 1;
        let mut nav = create_controller(&clock, config);
        let mut actuator = RecordingActuator::default();
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();

        nav.tick(SensorFrame::default(), &mut actuator);
        assert!(nav.is_stalled());
        assert!(!nav.is_planning());

        // An obstacle clearing replans towards the same goal
        nav.config.planner.max_iterations = 5000;
        nav.request_replan(ReplanReason::ObstacleCleared);
        tick_until_planned(&mut nav, &clock, &mut actuator);
        assert!(!nav.is_stalled());
        assert!(nav.trajectory().len() >= 2);
    }

    #[test]
    fn test_no_waypoint_is_flagged_once() {
        let clock = SimulatedClock::new();
        let mut grid = OccupancyGrid::new(MapFrame::new(10, 10, (100.0, 100.0), (1000.0, 1000.0)).unwrap());
        for x in 0..10 {
            for y in 0..10 {
                if (x, y) != (0, 0) {
                    grid.mark_obstacle(GridPoint::new(x, y));
                }
            }
        }
        let mut config = slow_config();
        config.planner.max_iterations = 50;
        let mut nav = NavigationController::new(
            grid,
            Pose::new(5.0, 5.0, 0.0),
            ScreenPoint::new(95.0, 95.0),
            config,
            clock.clone(),
            StdRng::seed_from_u64(11),
        )
        .unwrap();
        let mut actuator = RecordingActuator::default();
        nav.handle_operator(OperatorCommand::TakeOff, &mut actuator).unwrap();
        assert!(nav.waypoint_candidates().is_empty());

        for _ in 0..10 {
            let sent = nav.tick(SensorFrame::default(), &mut actuator).unwrap();
            assert!(sent.is_hover());
        }
        assert!(!nav.is_planning());
        assert!(!nav.is_stalled());
        assert!(nav.waypoint_unreachable());
    }
}
