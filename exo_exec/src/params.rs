//! # Exoskeleton Executable Parameters
//!
//! This module provides parameters for the exoskeleton executable, loaded from `exo_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::LinkParams;
use serde::Deserialize;

use crate::{
    input::InputParams,
    seq::{Extreme, GaitKind},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ExoExecParams {
    /// Link to the CANopen daemon
    #[serde(default)]
    pub link: LinkParams,

    /// Operator button input
    pub input: InputParams,

    /// Calibration file, relative to the parameters directory
    pub calib_file: String,

    /// Half width of the window in which a joint is considered to have reached its target.
    ///
    /// Units: raw position counts
    pub tolerance: i32,

    /// Target period of the gait poll loop.
    ///
    /// Units: seconds
    pub poll_period_s: f64,

    /// Period of the start gate loop, which also reports the joint positions.
    ///
    /// Units: seconds
    pub start_poll_period_s: f64,

    /// Motion profile applied to every joint at initialisation
    pub profile: ProfileParams,

    /// The gait stages to run, in order
    pub plan: Vec<StageParams>,
}

/// Profile position mode settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProfileParams {
    /// Units: raw counts per second
    pub velocity: i32,

    /// Used for both acceleration and deceleration.
    ///
    /// Units: raw counts per second squared
    pub acceleration: i32,
}

/// One stage of the gait plan.
#[derive(Debug, Clone, Deserialize)]
pub struct StageParams {
    pub name: String,

    pub kind: GaitKind,

    /// Trajectory file, relative to the parameters directory
    pub traj_file: String,

    /// Extreme the exoskeleton is at when the stage starts
    pub start: Extreme,

    /// Extreme at which the operator may leave the stage
    pub exit: Extreme,

    /// Profile velocity to switch to before the stage starts, if any
    #[serde(default)]
    pub velocity: Option<i32>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Parameter values which deserialise but cannot be run with.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("The tolerance must be positive, found {0}")]
    NonPositiveTolerance(i32),

    #[error("{name} must be a finite, non-negative number of seconds, found {value}")]
    InvalidPeriod { name: &'static str, value: f64 },

    #[error("The gait plan is empty")]
    EmptyPlan,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ExoExecParams {
    /// Check the values serde cannot.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.tolerance <= 0 {
            return Err(ParamsError::NonPositiveTolerance(self.tolerance));
        }

        check_period("poll_period_s", self.poll_period_s)?;
        check_period("start_poll_period_s", self.start_poll_period_s)?;

        if self.plan.is_empty() {
            return Err(ParamsError::EmptyPlan);
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_period(name: &'static str, value: f64) -> Result<(), ParamsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParamsError::InvalidPeriod { name, value })
    }
}
