//! # Exoskeleton library.
//!
//! This library allows other crates in the workspace to access items defined inside the
//! exoskeleton crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Calibration - converts joint angles into raw drive positions
pub mod calib;

/// Joint driver - commands the joint drives through the daemon
pub mod driver;

/// Gait runner - the poll loops which feed the sequencer
pub mod gait;

/// Operator input - the push buttons, read over CAN or GPIO
pub mod input;

/// Parameters for the exoskeleton executable
pub mod params;

/// Motion sequencer - steps the joints through a trajectory
pub mod seq;

/// Trajectory tables
pub mod traj;

/// Link telemetry archiving
pub mod tm;

#[cfg(test)]
mod sim;
