//! This module defines the error types used by the `skyward-navigation` crate.

#![warn(missing_docs)]

use skyward_kinematics::KinematicsError;

/// Error type for navigation operations.
///
/// This enum encapsulates all possible errors that can occur during
/// navigation operations, such as invalid map parameters, malformed persisted
/// data or a planner that ran out of iterations.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationError {
    /// Error for invalid map dimensions.
    /// This variant is returned when map width or height is zero.
    InvalidDimensions(&'static str),
    /// Error for invalid frame scale.
    /// This variant is returned when a screen or area extent is not positive.
    InvalidScale(&'static str),
    /// Error for invalid planner or smoother parameters.
    InvalidParameter(&'static str),
    /// A tree node index that does not exist.
    UnknownNode(usize),
    /// The planner hit its iteration cap without reaching the goal.
    PlanningFailed {
        /// Iterations spent before giving up.
        iterations: usize,
    },
    /// A persisted grid could not be parsed.
    MalformedGrid {
        /// 1-based line of the offending row.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// A persisted path could not be parsed.
    MalformedPath {
        /// 1-based line of the offending waypoint.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// Reading or writing a persisted artifact failed.
    Persistence(String),
    /// A kinematics calculation was rejected.
    Kinematics(KinematicsError),
}

impl core::fmt::Display for NavigationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NavigationError::InvalidDimensions(msg) => write!(f, "Invalid map dimensions: {}", msg),
            NavigationError::InvalidScale(msg) => write!(f, "Invalid frame scale: {}", msg),
            NavigationError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            NavigationError::UnknownNode(idx) => write!(f, "Tree node {} does not exist", idx),
            NavigationError::PlanningFailed { iterations } => {
                write!(f, "Planning failed: goal not reached after {} iterations", iterations)
            }
            NavigationError::MalformedGrid { line, reason } => {
                write!(f, "Malformed grid at line {}: {}", line, reason)
            }
            NavigationError::MalformedPath { line, reason } => {
                write!(f, "Malformed path at line {}: {}", line, reason)
            }
            NavigationError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            NavigationError::Kinematics(err) => write!(f, "Kinematics error: {}", err),
        }
    }
}

impl core::error::Error for NavigationError {}

impl From<KinematicsError> for NavigationError {
    fn from(err: KinematicsError) -> Self {
        NavigationError::Kinematics(err)
    }
}

impl From<std::io::Error> for NavigationError {
    fn from(err: std::io::Error) -> Self {
        NavigationError::Persistence(err.to_string())
    }
}

impl From<csv::Error> for NavigationError {
    fn from(err: csv::Error) -> Self {
        NavigationError::Persistence(err.to_string())
    }
}
