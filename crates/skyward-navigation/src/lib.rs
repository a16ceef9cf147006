pub mod clock;
pub mod controller;
pub mod error;
pub mod map;
pub mod rrt;
pub mod sensors;
pub mod smoothing;
pub mod trajectory;
pub mod tree;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use controller::{ControllerConfig, FlightMode, NavigationConfig, NavigationController, NodeState, ReplanReason};
pub use error::NavigationError;
pub use rrt::{PlanResult, PlannerConfig, PlannerStatus, RrtPlanner};
pub use sensors::{DroneActuator, OperatorCommand, ProximitySensor, SensorFrame, VisionThreatSensor};
pub use smoothing::{PathSmoother, SmootherConfig};
pub use trajectory::Trajectory;

use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, info, warn};

use rand::Rng;
use skyward_kinematics::Pose;

/// Fixed-rate navigation task.
///
/// Polls the sensors and ticks the controller at `tick_hz`, publishing the pose
/// after every tick, and applies operator commands as they arrive. Returns once
/// the drone has landed.
///
/// # Arguments
/// * `controller` - The controller to drive
/// * `actuator` - Receives every command the controller issues
/// * `proximity`, `vision` - Sensors polled once per tick
/// * `operator_rx` - A Tokio broadcast receiver for operator commands
/// * `pose_tx` - A Tokio broadcast sender to publish the dead-reckoned pose
#[allow(clippy::too_many_arguments)]
pub async fn run_navigation_task<C, R, A, P, V>(
    controller: &mut NavigationController<C, R>,
    actuator: &mut A,
    proximity: &mut P,
    vision: &mut V,
    tick_hz: f64,
    operator_rx: &mut broadcast::Receiver<Arc<OperatorCommand>>,
    pose_tx: broadcast::Sender<Arc<Pose>>,
) -> anyhow::Result<()>
where
    C: Clock,
    R: Rng,
    A: DroneActuator,
    P: ProximitySensor,
    V: VisionThreatSensor,
{
    if !(tick_hz > 0.0) {
        anyhow::bail!("tick_hz must be positive, got {}", tick_hz);
    }
    info!(tick_hz, "Navigation task started.");
    let mut ticker = time::interval(Duration::from_secs_f64(1.0 / tick_hz));
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = SensorFrame::poll(proximity, vision);
                if controller.tick(frame, actuator).is_some() && pose_tx.receiver_count() > 0 {
                    if let Err(e) = pose_tx.send(Arc::new(controller.pose())) {
                        warn!("Failed to publish pose from navigation task: {}", e);
                    }
                }
            }
            result = operator_rx.recv() => {
                match result {
                    Ok(command) => {
                        debug!(?command, "Operator command received");
                        if let Err(e) = controller.handle_operator(*command, actuator) {
                            warn!(error = %e, ?command, "Operator command failed");
                            continue;
                        }
                        if matches!(*command, OperatorCommand::Land) {
                            info!(pose = %controller.pose(), "Navigation task finished after landing.");
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Operator receiver lagged by {} messages in navigation task.", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::error!("Operator channel closed. Navigation task cannot continue.");
                        return Err(anyhow::anyhow!("Operator channel closed for navigation task"));
                    }
                }
            }
        }
    }
}
