mod blackboard; // shared state between the async tasks and the sensor thread
mod bus;        // broadcast topics
mod settings;   // `config/default.toml` and environment overrides
mod simulation; // simulated drone, sensors and operator

use blackboard::{Blackboard, snapshot};
use bus::Topic;
use settings::Settings;
use simulation::{BlackboardProximity, ScriptedVision, SimulatedDrone};

use rand::SeedableRng;
use rand::rngs::StdRng;
use skyward_kinematics::{Pose, RcCommand};
use skyward_navigation::{NavigationController, OperatorCommand, SystemClock, run_navigation_task};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Skyward navigation started.");
    let settings = settings::load_settings()?;

    match run(settings).await {
        Ok(faults) if faults.is_empty() => info!("Flight finished cleanly."),
        Ok(faults) => warn!(?faults, "Flight finished with faults."),
        Err(e) => {
            error!("Flight failed: {:?}", e);
            return Err(e);
        }
    }
    Ok(())
}

/// Flies one simulated sortie and returns the faults raised along the way.
async fn run(settings: Settings) -> anyhow::Result<Vec<String>> {
    let bb: Blackboard = Arc::default();
    let grid = settings.map.grid()?;
    let pose = Pose::new(settings.map.start.0, settings.map.start.1, settings.map.heading);
    bb.write().pose = pose;

    let rng = match settings.runtime.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut controller = NavigationController::new(
        grid,
        pose,
        settings.map.goal(),
        settings.navigation(),
        SystemClock::new(),
        rng,
    )?;

    let operator_topic: Topic<OperatorCommand> = Topic::new(16);
    let pose_topic: Topic<Pose> = Topic::new(64);
    let command_topic: Topic<RcCommand> = Topic::new(64);
    let mut nav_operator_rx = operator_topic.subscribe();
    let watchdog_rx = operator_topic.subscribe();
    let telemetry_operator_rx = operator_topic.subscribe();
    let telemetry_pose_rx = pose_topic.subscribe();
    let telemetry_command_rx = command_topic.subscribe();

    info!("Spawning proximity sensor thread...");
    let sensor = simulation::spawn_proximity_thread(
        Arc::clone(&bb),
        settings.map.frame()?,
        settings.simulation.obstacles.clone(),
        settings.proximity,
        settings.runtime.sensor_hz,
    )?;

    let mut drone = SimulatedDrone::new(Arc::clone(&bb), command_topic.clone());
    let mut proximity = BlackboardProximity::new(Arc::clone(&bb));
    let mut vision = ScriptedVision::new(settings.simulation.threats.clone());

    let result = tokio::try_join!(
        run_navigation_task(
            &mut controller,
            &mut drone,
            &mut proximity,
            &mut vision,
            settings.runtime.tick_hz,
            &mut nav_operator_rx,
            pose_topic.sender(),
        ),
        simulation::telemetry(
            Arc::clone(&bb),
            telemetry_pose_rx,
            telemetry_command_rx,
            telemetry_operator_rx,
        ),
        simulation::watchdog(
            Arc::clone(&bb),
            Duration::from_millis(settings.runtime.watchdog_timeout_ms),
            watchdog_rx,
        ),
        simulation::operator_script(
            operator_topic.clone(),
            Duration::from_secs_f64(settings.runtime.flight_duration_s.max(0.0)),
        ),
    );

    bb.write().shutdown = true;
    if sensor.join().is_err() {
        warn!("Proximity sensor thread panicked.");
    }
    let ((), commands, (), ()) = result?;

    info!(
        pose = %controller.pose(),
        commands,
        obstacles = controller.grid().obstacles().len(),
        "Final state"
    );
    Ok(snapshot(&bb).faults)
}
