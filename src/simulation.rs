//! Simulated collaborators for flying the navigation stack without hardware.

use crate::blackboard::{Blackboard, raise_fault, snapshot, touch_cmd};
use crate::bus::Topic;
use crate::settings::{ScriptedThreat, SimulatedObstacle};

use skyward_kinematics::{Pose, RcCommand, Rotation};
use skyward_navigation::map::{MapFrame, OccupancyGrid, ScreenPoint};
use skyward_navigation::sensors::{FollowVector, ProximityCalibration, ThreatObservation};
use skyward_navigation::{DroneActuator, OperatorCommand, ProximitySensor, VisionThreatSensor};
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Highest value the proximity sensor reports.
const MAX_RAW: f64 = 255.0;

/// Flight controller stand-in that records every command on the blackboard
/// and republishes it on the command topic.
pub struct SimulatedDrone {
    bb: Blackboard,
    commands: Topic<RcCommand>,
}

impl SimulatedDrone {
    pub fn new(bb: Blackboard, commands: Topic<RcCommand>) -> Self {
        SimulatedDrone { bb, commands }
    }
}

impl DroneActuator for SimulatedDrone {
    fn take_off(&mut self) -> anyhow::Result<()> {
        info!("Simulated drone taking off.");
        self.bb.write().flying = true;
        touch_cmd(&self.bb, RcCommand::hover());
        Ok(())
    }

    fn land(&mut self) -> anyhow::Result<()> {
        info!("Simulated drone landing.");
        self.bb.write().flying = false;
        Ok(())
    }

    fn rotate(&mut self, rotation: Rotation) -> anyhow::Result<()> {
        debug!(%rotation, "Simulated rotation");
        Ok(())
    }

    fn send_rc(&mut self, command: RcCommand) -> anyhow::Result<()> {
        if !snapshot(&self.bb).flying {
            anyhow::bail!("rc command {} sent while landed", command);
        }
        touch_cmd(&self.bb, command);
        self.commands.publish(command);
        Ok(())
    }
}

/// Raw reading the proximity sensor would give at `pose`.
///
/// Marches along the heading in 1cm steps until an obstacle rectangle is hit
/// or the sensor's range runs out.
pub fn simulated_raw(
    grid: &OccupancyGrid,
    pose: &Pose,
    obstacles: &[SimulatedObstacle],
    calibration: &ProximityCalibration,
) -> f64 {
    let origin = grid.screen_to_area(ScreenPoint::new(pose.x, pose.y));
    let range = MAX_RAW * calibration.distance_per_raw;
    let (sin, cos) = pose.heading.sin_cos();

    let mut d = 0.0;
    while d <= range {
        let x = origin.x + d * cos;
        let y = origin.y + d * sin;
        let hit = obstacles
            .iter()
            .any(|o| x >= o.x && x <= o.x + o.w && y >= o.y && y <= o.y + o.h);
        if hit {
            return (d / calibration.distance_per_raw).min(MAX_RAW);
        }
        d += 1.0;
    }
    MAX_RAW
}

/// Spawns the proximity sensor thread.
///
/// Reads the published pose from the blackboard and writes the raw reading
/// back at `rate_hz` until shutdown is flagged.
pub fn spawn_proximity_thread(
    bb: Blackboard,
    frame: MapFrame,
    obstacles: Vec<SimulatedObstacle>,
    calibration: ProximityCalibration,
    rate_hz: f64,
) -> anyhow::Result<JoinHandle<()>> {
    if !(rate_hz > 0.0) {
        anyhow::bail!("sensor rate must be positive, got {}", rate_hz);
    }
    let period = Duration::from_secs_f64(1.0 / rate_hz);
    let handle = std::thread::Builder::new().name("proximity".into()).spawn(move || {
        info!("Proximity sensor thread started.");
        let grid = OccupancyGrid::new(frame);
        let sleeper = SpinSleeper::new(10_000);
        loop {
            let state = snapshot(&bb);
            if state.shutdown {
                break;
            }
            let raw = simulated_raw(&grid, &state.pose, &obstacles, &calibration);
            bb.write().proximity_raw = Some(raw);
            sleeper.sleep(period);
        }
        info!("Proximity sensor thread stopped.");
    })?;
    Ok(handle)
}

/// Proximity sensor backed by the reading the sensor thread left on the blackboard.
pub struct BlackboardProximity {
    bb: Blackboard,
}

impl BlackboardProximity {
    pub fn new(bb: Blackboard) -> Self {
        BlackboardProximity { bb }
    }
}

impl ProximitySensor for BlackboardProximity {
    fn read_raw(&mut self) -> Option<f64> {
        snapshot(&self.bb).proximity_raw
    }
}

/// Camera that reports threats during fixed windows after start-up.
pub struct ScriptedVision {
    started: Instant,
    threats: Vec<ScriptedThreat>,
}

impl ScriptedVision {
    pub fn new(threats: Vec<ScriptedThreat>) -> Self {
        ScriptedVision { started: Instant::now(), threats }
    }

    pub fn observe_at(&self, elapsed: f64) -> ThreatObservation {
        let active = self
            .threats
            .iter()
            .find(|t| elapsed >= t.start_s && elapsed < t.end_s);
        match active {
            Some(t) => ThreatObservation {
                distance: t.distance,
                bearing: t.bearing_deg.to_radians(),
                present: true,
                follow: FollowVector::default(),
            },
            None => ThreatObservation {
                distance: 0.0,
                bearing: 0.0,
                present: false,
                follow: FollowVector::default(),
            },
        }
    }
}

impl VisionThreatSensor for ScriptedVision {
    fn observe(&mut self) -> Option<ThreatObservation> {
        Some(self.observe_at(self.started.elapsed().as_secs_f64()))
    }
}

/// Copies published poses to the blackboard until the drone lands.
///
/// Returns the number of commands seen on the command topic.
pub async fn telemetry(
    bb: Blackboard,
    mut pose_rx: broadcast::Receiver<Arc<Pose>>,
    mut command_rx: broadcast::Receiver<Arc<RcCommand>>,
    mut operator_rx: broadcast::Receiver<Arc<OperatorCommand>>,
) -> anyhow::Result<u64> {
    info!("Telemetry task started.");
    let mut commands = 0u64;
    loop {
        tokio::select! {
            pose = pose_rx.recv() => match pose {
                Ok(pose) => {
                    debug!(pose = %pose, "Pose update");
                    bb.write().pose = *pose;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Pose receiver lagged by {} messages in telemetry task.", n);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(commands),
            },
            command = command_rx.recv() => match command {
                Ok(command) => {
                    commands += 1;
                    debug!(command = %command, "Command sent");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    commands += n;
                    warn!("Command receiver lagged by {} messages in telemetry task.", n);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(commands),
            },
            command = operator_rx.recv() => match command {
                Ok(command) if matches!(*command, OperatorCommand::Land) => return Ok(commands),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return Ok(commands),
            },
        }
    }
}

/// Raises a fault whenever the drone is airborne and commands stop arriving.
pub async fn watchdog(
    bb: Blackboard,
    timeout: Duration,
    mut operator_rx: broadcast::Receiver<Arc<OperatorCommand>>,
) -> anyhow::Result<()> {
    info!("Watchdog task started.");
    let mut tick = tokio::time::interval(Duration::from_millis(25));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let state = snapshot(&bb);
                if !state.flying {
                    continue;
                }
                let age = Instant::now() - state.last_cmd_ts;
                if age > timeout {
                    warn!(?age, last_cmd_ts = ?state.last_cmd_ts, "Command timeout while airborne!");
                    raise_fault(&bb, "rc command timeout");
                }
            }
            command = operator_rx.recv() => match command {
                Ok(command) if matches!(*command, OperatorCommand::Land) => {
                    info!("Watchdog stopped after landing.");
                    return Ok(());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Operator receiver lagged by {} messages in watchdog.", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    error!("Operator channel closed. Watchdog cannot continue.");
                    return Err(anyhow::anyhow!("Operator channel closed for watchdog"));
                }
            },
        }
    }
}

/// Takes off, flies for `duration`, then lands.
pub async fn operator_script(topic: Topic<OperatorCommand>, duration: Duration) -> anyhow::Result<()> {
    // Let the other tasks subscribe and settle before take-off.
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("Operator: take off.");
    topic.publish(OperatorCommand::TakeOff);
    tokio::time::sleep(duration).await;
    info!("Operator: land.");
    topic.publish(OperatorCommand::Land);
    Ok(())
}
