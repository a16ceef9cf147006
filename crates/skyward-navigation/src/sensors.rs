//! Narrow interfaces to the drone's sensors and actuators.
//!
//! Hardware bindings (serial proximity decoding, the camera pipeline, the
//! vendor flight API) live outside this crate and plug in through the traits
//! below. This module also holds the calibration that turns their raw output
//! into navigation inputs.

use crate::map::ScreenPoint;
use skyward_kinematics::{RcCommand, Rotation};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Forward-facing range sensor.
pub trait ProximitySensor: Send {
    /// Latest raw reading, `None` on dropout.
    fn read_raw(&mut self) -> Option<f64>;
}

/// Camera-based threat detector.
pub trait VisionThreatSensor: Send {
    /// Threat seen in the latest frame, `None` if nothing was detected.
    fn observe(&mut self) -> Option<ThreatObservation>;
}

/// Flight controller commands.
///
/// Failures are reported to the caller, which decides whether they are fatal.
pub trait DroneActuator: Send {
    /// Takes off and hovers.
    fn take_off(&mut self) -> anyhow::Result<()>;
    /// Lands in place.
    fn land(&mut self) -> anyhow::Result<()>;
    /// Rotates in place.
    fn rotate(&mut self, rotation: Rotation) -> anyhow::Result<()>;
    /// Sends a velocity command.
    fn send_rc(&mut self, command: RcCommand) -> anyhow::Result<()>;
}

/// Offset of a threat from the center of the camera image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FollowVector {
    /// Length of the offset in image pixels.
    pub magnitude: f64,
    /// Direction of the offset (rad), y pointing down the image.
    pub angle: f64,
}

impl FollowVector {
    /// Vector from the image center to the threat's bounding-box center.
    pub fn from_image(center: ScreenPoint, target: ScreenPoint) -> Self {
        FollowVector {
            magnitude: center.distance(&target),
            angle: center.bearing_to(&target),
        }
    }
}

/// Gains that turn an image-plane [`FollowVector`] into yaw and vertical commands.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct FollowGains {
    /// Yaw command per horizontal pixel.
    pub yaw_per_px: f64,
    /// Vertical command per vertical pixel.
    pub vertical_per_px: f64,
}

impl Default for FollowGains {
    fn default() -> Self {
        // Full image half-width/half-height maps to a command of 75
        FollowGains {
            yaw_per_px: 75.0 / 480.0,
            vertical_per_px: 75.0 / 360.0,
        }
    }
}

/// Splits an image-plane vector into `(yaw, vertical)` commands.
///
/// Image y grows downwards, so a threat below center yields a negative
/// (descending) vertical command.
pub fn vector_to_command(vector: FollowVector, gains: FollowGains) -> (f64, f64) {
    let vx = vector.magnitude * vector.angle.cos();
    let vy = vector.magnitude * vector.angle.sin();
    (gains.yaw_per_px * vx, -(gains.vertical_per_px * vy))
}

/// Distance band the drone holds while following a threat.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct FollowBand {
    /// Back away when closer than this (cm).
    pub min: f64,
    /// Close in when farther than this (cm).
    pub max: f64,
    /// Forward command per centimeter outside the band.
    pub gain: f64,
}

impl Default for FollowBand {
    fn default() -> Self {
        FollowBand { min: 35.0, max: 40.0, gain: 2.0 }
    }
}

impl FollowBand {
    /// Forward command that brings `distance` back inside the band.
    pub fn forward_command(&self, distance: f64) -> f64 {
        if distance < self.min {
            -(self.min - distance) * self.gain
        } else if distance > self.max {
            (distance - self.max) * self.gain
        } else {
            0.0
        }
    }
}

/// A threat detected in one camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThreatObservation {
    /// Estimated distance to the threat (cm).
    pub distance: f64,
    /// Direction of the threat relative to the drone heading (rad).
    pub bearing: f64,
    /// False when the detector ran but found nothing.
    pub present: bool,
    /// Image-plane offset used for yaw and vertical tracking.
    pub follow: FollowVector,
}

/// Interpretation of a proximity reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProximityReading {
    /// Something is close ahead, at the given distance (cm).
    Obstacle { distance: f64 },
    /// The way ahead is clear.
    Clear,
    /// Between the obstacle and clear thresholds.
    Indeterminate,
}

/// Raw-to-distance calibration and hysteresis thresholds of the proximity sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ProximityCalibration {
    /// Raw readings below this are obstacles.
    pub obstacle_raw_threshold: f64,
    /// Raw readings at or above this are clear.
    pub clear_raw_threshold: f64,
    /// Centimeters per raw unit.
    pub distance_per_raw: f64,
    /// Distance reported when the reading is zero (cm).
    pub min_distance: f64,
}

impl Default for ProximityCalibration {
    fn default() -> Self {
        ProximityCalibration {
            obstacle_raw_threshold: 200.0,
            clear_raw_threshold: 235.0,
            distance_per_raw: 16.0 / 235.0 * 10.0,
            min_distance: 4.0,
        }
    }
}

impl ProximityCalibration {
    /// Converts a raw reading to centimeters.
    pub fn distance(&self, raw: f64) -> f64 {
        let distance = raw * self.distance_per_raw;
        if distance == 0.0 { self.min_distance } else { distance }
    }

    /// Classifies a reading. Dropouts count as clear.
    pub fn classify(&self, raw: Option<f64>) -> ProximityReading {
        match raw {
            None => ProximityReading::Clear,
            Some(raw) if raw < self.obstacle_raw_threshold => ProximityReading::Obstacle {
                distance: self.distance(raw),
            },
            Some(raw) if raw >= self.clear_raw_threshold => ProximityReading::Clear,
            Some(_) => ProximityReading::Indeterminate,
        }
    }
}

/// Everything the controller reads in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorFrame {
    /// Raw proximity reading, `None` on dropout.
    pub proximity: Option<f64>,
    /// Threat seen this frame, `None` on dropout.
    pub threat: Option<ThreatObservation>,
}

impl SensorFrame {
    /// Polls both sensors once.
    pub fn poll(proximity: &mut dyn ProximitySensor, vision: &mut dyn VisionThreatSensor) -> Self {
        SensorFrame {
            proximity: proximity.read_raw(),
            threat: vision.observe(),
        }
    }
}

/// Commands from the human operator.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OperatorCommand {
    TakeOff,
    Land,
    /// Enables or disables manual control.
    ManualControl(bool),
    /// Velocity command forwarded as-is while manual control is on.
    Manual(RcCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_proximity_classification() {
        let cal = ProximityCalibration::default();
        assert_eq!(cal.classify(None), ProximityReading::Clear);
        assert_eq!(cal.classify(Some(235.0)), ProximityReading::Clear);
        assert_eq!(cal.classify(Some(210.0)), ProximityReading::Indeterminate);
        assert_eq!(cal.classify(Some(200.0)), ProximityReading::Indeterminate);

        match cal.classify(Some(117.5)) {
            ProximityReading::Obstacle { distance } => assert!((distance - 80.0).abs() < EPSILON),
            other => panic!("expected obstacle, got {:?}", other),
        }
        assert_eq!(cal.classify(Some(0.0)), ProximityReading::Obstacle { distance: 4.0 });
    }

    #[test]
    fn test_follow_band() {
        let band = FollowBand::default();
        assert_eq!(band.forward_command(37.0), 0.0);
        assert_eq!(band.forward_command(30.0), -10.0);
        assert_eq!(band.forward_command(50.0), 20.0);
    }

    #[test]
    fn test_vector_to_command() {
        let gains = FollowGains::default();
        let (yaw, vertical) = vector_to_command(FollowVector { magnitude: 480.0, angle: 0.0 }, gains);
        assert!((yaw - 75.0).abs() < EPSILON);
        assert!(vertical.abs() < EPSILON);

        // Threat below the image center: descend
        let (yaw, vertical) = vector_to_command(FollowVector { magnitude: 360.0, angle: FRAC_PI_2 }, gains);
        assert!(yaw.abs() < 1e-6);
        assert!((vertical + 75.0).abs() < EPSILON);
    }

    #[test]
    fn test_follow_vector_from_image() {
        let v = FollowVector::from_image(ScreenPoint::new(480.0, 360.0), ScreenPoint::new(480.0, 400.0));
        assert!((v.magnitude - 40.0).abs() < EPSILON);
        assert!((v.angle - FRAC_PI_2).abs() < EPSILON);
    }
}
