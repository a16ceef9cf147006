use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use skyward_navigation::map::{MapFrame, OccupancyGrid, ScreenPoint, persist};
use skyward_navigation::sensors::{FollowBand, FollowGains, ProximityCalibration};
use skyward_navigation::{ControllerConfig, NavigationConfig, PlannerConfig, SmootherConfig};
use std::path::PathBuf;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Navigation tick rate (Hz).
    pub tick_hz: f64,
    /// Proximity sensor thread rate (Hz).
    pub sensor_hz: f64,
    /// Age of the last command before the watchdog raises a fault.
    pub watchdog_timeout_ms: u64,
    /// Time between take-off and the scripted landing.
    pub flight_duration_s: f64,
    /// Fixed RNG seed for reproducible flights.
    pub seed: Option<u64>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        RuntimeSettings {
            tick_hz: 30.0,
            sensor_hz: 50.0,
            watchdog_timeout_ms: 500,
            flight_duration_s: 60.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapSettings {
    pub width: usize,
    pub height: usize,
    /// Screen extent (px).
    pub screen: (f64, f64),
    /// Physical extent (cm).
    pub area: (f64, f64),
    /// Initial drone position (px).
    pub start: (f64, f64),
    /// Initial heading (rad).
    #[serde(default)]
    pub heading: f64,
    /// First goal (px).
    pub goal: (f64, f64),
    /// Previously saved grid to start from.
    #[serde(default)]
    pub load_grid: Option<PathBuf>,
}

impl MapSettings {
    pub fn frame(&self) -> anyhow::Result<MapFrame> {
        Ok(MapFrame::new(self.width, self.height, self.screen, self.area)?)
    }

    /// Builds the starting grid, reading `load_grid` when it is set.
    pub fn grid(&self) -> anyhow::Result<OccupancyGrid> {
        let frame = self.frame()?;
        match &self.load_grid {
            Some(path) => persist::read_grid(path, frame)
                .with_context(|| format!("failed to load grid from {}", path.display())),
            None => Ok(OccupancyGrid::new(frame)),
        }
    }

    pub fn goal(&self) -> ScreenPoint {
        ScreenPoint::new(self.goal.0, self.goal.1)
    }
}

/// Rectangle (cm) the simulated proximity sensor can hit.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimulatedObstacle {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Window during which the simulated camera reports a threat.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScriptedThreat {
    pub start_s: f64,
    pub end_s: f64,
    /// Distance (cm).
    pub distance: f64,
    /// Bearing relative to the heading (deg).
    #[serde(default)]
    pub bearing_deg: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub obstacles: Vec<SimulatedObstacle>,
    pub threats: Vec<ScriptedThreat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    pub map: MapSettings,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub smoother: SmootherConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub proximity: ProximityCalibration,
    #[serde(default)]
    pub follow_band: FollowBand,
    #[serde(default)]
    pub follow_gains: FollowGains,
    #[serde(default)]
    pub simulation: SimulationSettings,
}

impl Settings {
    pub fn navigation(&self) -> NavigationConfig {
        NavigationConfig {
            planner: self.planner,
            smoother: self.smoother,
            controller: self.controller.clone(),
            proximity: self.proximity,
            follow_band: self.follow_band,
            follow_gains: self.follow_gains,
        }
    }
}

/// Reads `config/default.toml`, overridden by `SKYWARD__SECTION__KEY` variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    info!("Attempting to load configuration from {}", DEFAULT_CONFIG_PATH);

    let built = Config::builder()
        .add_source(File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(true))
        .add_source(Environment::with_prefix("SKYWARD").prefix_separator("__").separator("__"))
        .build();

    let config = match built {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let settings: Settings = config.try_deserialize().context("invalid configuration")?;
    settings.navigation().validate().context("invalid navigation configuration")?;
    info!(runtime = ?settings.runtime, "Successfully loaded configuration");
    Ok(settings)
}
