#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library for planar drone pose math."]
#![doc = ""]
#![doc = "This crate provides the pose, bearing and velocity-command types shared by the"]
#![doc = "navigation stack, and the dead-reckoning step that integrates commanded speed."]

use core::f64::consts::PI;
use core::fmt;
use libm::{atan2, cos, fabs, hypot, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::KinematicsError;

/// A 2‑D pose `(x, y, heading)` in screen units and radians.
///
/// The frame has its origin in the top-left corner with y growing downwards,
/// so a positive heading change is a clockwise turn when seen from above.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// x position.
    pub x: f64,
    /// y position.
    pub y: f64,
    /// Heading (rad), normalized to `[-PI, PI)`.
    pub heading: f64,
}

impl Pose {
    /// Construct a new pose.
    ///
    /// # Arguments
    ///
    /// * `x`: x position.
    /// * `y`: y position.
    /// * `heading`: Heading in radians.
    pub const fn new(x: f64, y: f64, heading: f64) -> Self {
        Pose { x, y, heading }
    }

    /// Normalize an angle to be within `[-PI, PI)`.
    ///
    /// Angles at `PI` will be normalized to `-PI`.
    ///
    /// # Arguments
    ///
    /// * `angle`: The angle in radians to normalize.
    ///
    /// # Returns
    ///
    /// The normalized angle in radians.
    pub fn normalize_angle(angle: f64) -> f64 {
        let a = angle % (2.0 * PI);
        if a >= PI {
            a - 2.0 * PI
        } else if a < -PI {
            a + 2.0 * PI
        } else {
            a
        }
    }

    /// Returns a copy of this pose with a different heading (normalized).
    pub fn with_heading(self, heading: f64) -> Self {
        Pose {
            heading: Pose::normalize_angle(heading),
            ..self
        }
    }

    /// Advances the pose along its current heading.
    ///
    /// Position moves by `speed * dt` along `heading`; the heading itself is unchanged.
    /// This is the only integration step used for dead reckoning, there is no
    /// absolute position source.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::NegativeTimeDelta)` if `dt` is negative.
    pub fn advance(&self, speed: f64, dt: f64) -> Result<Pose, KinematicsError> {
        if dt < 0.0 {
            return Err(KinematicsError::NegativeTimeDelta("must be non-negative"));
        }

        Ok(Pose {
            x: self.x + cos(self.heading) * speed * dt,
            y: self.y + sin(self.heading) * speed * dt,
            heading: self.heading,
        })
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.2}, y: {:.2}, heading: {:.2} rad)", self.x, self.y, self.heading)
    }
}

/// Euclidean distance between two planar points.
pub fn distance(from: (f64, f64), to: (f64, f64)) -> f64 {
    hypot(to.0 - from.0, to.1 - from.1)
}

/// Bearing (rad) of the vector `from -> to`, measured from the +x axis.
pub fn bearing(from: (f64, f64), to: (f64, f64)) -> f64 {
    atan2(to.1 - from.1, to.0 - from.0)
}

/// Scalar speed needed to cover `distance` in `travel_time` seconds.
///
/// # Errors
///
/// Returns `Err(KinematicsError::InvalidTravelTime)` if `travel_time` is not positive.
pub fn travel_speed(distance: f64, travel_time: f64) -> Result<f64, KinematicsError> {
    if travel_time <= 0.0 {
        return Err(KinematicsError::InvalidTravelTime("must be positive"));
    }
    Ok(distance / travel_time)
}

/// Direction of an in-place yaw rotation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDirection {
    /// Positive heading change.
    Clockwise,
    /// Negative heading change.
    CounterClockwise,
}

/// A discrete in-place rotation, as accepted by the actuator.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    /// Which way to turn.
    pub direction: RotationDirection,
    /// Magnitude of the turn in degrees (always non-negative).
    pub degrees: f64,
}

impl Rotation {
    /// Builds the rotation that applies a signed heading change.
    ///
    /// Positive deltas turn clockwise, anything else turns counter-clockwise.
    pub fn from_delta(delta_rad: f64) -> Self {
        let direction = if delta_rad > 0.0 {
            RotationDirection::Clockwise
        } else {
            RotationDirection::CounterClockwise
        };
        Rotation {
            direction,
            degrees: fabs(delta_rad).to_degrees(),
        }
    }

    /// Signed heading change in radians.
    pub fn signed_radians(&self) -> f64 {
        match self.direction {
            RotationDirection::Clockwise => self.degrees.to_radians(),
            RotationDirection::CounterClockwise => -self.degrees.to_radians(),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            RotationDirection::Clockwise => write!(f, "cw {:.1}°", self.degrees),
            RotationDirection::CounterClockwise => write!(f, "ccw {:.1}°", self.degrees),
        }
    }
}

/// The four independent velocity components of a remote-control command.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RcCommand {
    /// Left/right velocity.
    pub lateral: f64,
    /// Forward/backward velocity.
    pub forward: f64,
    /// Up/down velocity.
    pub vertical: f64,
    /// Yaw rate.
    pub yaw: f64,
}

impl RcCommand {
    /// Construct a new command.
    pub const fn new(lateral: f64, forward: f64, vertical: f64, yaw: f64) -> Self {
        RcCommand {
            lateral,
            forward,
            vertical,
            yaw,
        }
    }

    /// All components zero.
    pub const fn hover() -> Self {
        RcCommand::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Returns true if every component is zero.
    pub fn is_hover(&self) -> bool {
        self.lateral == 0.0 && self.forward == 0.0 && self.vertical == 0.0 && self.yaw == 0.0
    }

    /// Clamps each component to `[-limit, limit]`.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidCommandLimit)` if `limit` is not positive.
    pub fn clamped(&self, limit: f64) -> Result<RcCommand, KinematicsError> {
        if limit <= 0.0 {
            return Err(KinematicsError::InvalidCommandLimit("must be positive"));
        }
        Ok(RcCommand {
            lateral: self.lateral.clamp(-limit, limit),
            forward: self.forward.clamp(-limit, limit),
            vertical: self.vertical.clamp(-limit, limit),
            yaw: self.yaw.clamp(-limit, limit),
        })
    }
}

impl fmt::Display for RcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(lr: {:.0}, fb: {:.0}, ud: {:.0}, yaw: {:.0})",
            self.lateral, self.forward, self.vertical, self.yaw
        )
    }
}
