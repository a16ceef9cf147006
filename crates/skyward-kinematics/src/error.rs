//! Error types for the kinematics library.
//!
//! This module defines error types that can occur during dead-reckoning
//! and command conversions.

use core::fmt;

/// Errors that can occur in kinematic calculations.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// Error for negative time delta.
    /// This variant is returned when a negative time delta is used for pose updates.
    NegativeTimeDelta(&'static str),
    /// Error for an unusable travel time.
    /// This variant is returned when a speed is derived from a zero or negative travel time.
    InvalidTravelTime(&'static str),
    /// Error for an invalid command limit.
    /// This variant is returned when clamping against a limit that is not positive.
    InvalidCommandLimit(&'static str),
}

impl fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinematicsError::NegativeTimeDelta(msg) => write!(f, "Negative time delta: {}", msg),
            KinematicsError::InvalidTravelTime(msg) => write!(f, "Invalid travel time: {}", msg),
            KinematicsError::InvalidCommandLimit(msg) => write!(f, "Invalid command limit: {}", msg),
        }
    }
}

impl core::error::Error for KinematicsError {}
