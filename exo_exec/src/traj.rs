//! # Trajectory tables
//!
//! A trajectory is a fixed table of waypoints, each holding one target angle per joint. The first
//! and last waypoints are the two extremes of the gait (for example standing and seated).
//!
//! Tables are loaded from parameter files in one of two layouts:
//!
//! - `mirrored`: a `hip` and a `knee` column, applied to both legs (sit-stand);
//! - `per_joint`: one column per joint (walking).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::joint::{JointId, NUM_JOINTS};
use serde::{Deserialize, Serialize};
use util::params;

use crate::calib::Angle;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A fixed table of per-joint angle waypoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    name: String,
    waypoints: Vec<[Angle; NUM_JOINTS]>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A trajectory table as stored in a parameter file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum TrajParams {
    /// One hip and one knee column, mirrored to both legs.
    Mirrored {
        name: String,
        hip_deg: Vec<f64>,
        knee_deg: Vec<f64>,
    },

    /// One column per joint.
    PerJoint {
        name: String,
        left_hip_deg: Vec<f64>,
        left_knee_deg: Vec<f64>,
        right_hip_deg: Vec<f64>,
        right_knee_deg: Vec<f64>,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum TrajError {
    #[error("Trajectory {0:?} has no waypoints")]
    Empty(String),

    #[error(
        "Column {column} of trajectory {name:?} has {found} waypoints but {expected} were expected"
    )]
    LengthMismatch {
        name: String,
        column: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Trajectory {name:?} has a non-finite angle at waypoint {index}")]
    NonFinite { name: String, index: usize },

    #[error("Could not load the trajectory file: {0}")]
    LoadError(#[from] params::LoadError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Trajectory {
    /// Create a new trajectory from its waypoints.
    pub fn new<S: Into<String>>(
        name: S,
        waypoints: Vec<[Angle; NUM_JOINTS]>,
    ) -> Result<Self, TrajError> {
        let name = name.into();

        if waypoints.is_empty() {
            return Err(TrajError::Empty(name));
        }

        if let Some(index) = waypoints
            .iter()
            .position(|w| w.iter().any(|a| !a.0.is_finite()))
        {
            return Err(TrajError::NonFinite { name, index });
        }

        Ok(Self { name, waypoints })
    }

    /// Load a trajectory from a file in the parameters directory.
    pub fn load(param_file: &str) -> Result<Self, TrajError> {
        let p: TrajParams = params::load(param_file)?;
        Self::from_params(p)
    }

    /// Build and validate a trajectory from its parameters.
    pub fn from_params(p: TrajParams) -> Result<Self, TrajError> {
        match p {
            TrajParams::Mirrored {
                name,
                hip_deg,
                knee_deg,
            } => {
                check_len(&name, "knee_deg", hip_deg.len(), knee_deg.len())?;

                let waypoints = hip_deg
                    .iter()
                    .zip(knee_deg.iter())
                    .map(|(h, k)| [Angle(*h), Angle(*k), Angle(*h), Angle(*k)])
                    .collect();

                Self::new(name, waypoints)
            }
            TrajParams::PerJoint {
                name,
                left_hip_deg,
                left_knee_deg,
                right_hip_deg,
                right_knee_deg,
            } => {
                let len = left_hip_deg.len();
                check_len(&name, "left_knee_deg", len, left_knee_deg.len())?;
                check_len(&name, "right_hip_deg", len, right_hip_deg.len())?;
                check_len(&name, "right_knee_deg", len, right_knee_deg.len())?;

                let waypoints = (0..len)
                    .map(|i| {
                        let mut w = [Angle::default(); NUM_JOINTS];
                        w[JointId::LeftHip.index()] = Angle(left_hip_deg[i]);
                        w[JointId::LeftKnee.index()] = Angle(left_knee_deg[i]);
                        w[JointId::RightHip.index()] = Angle(right_hip_deg[i]);
                        w[JointId::RightKnee.index()] = Angle(right_knee_deg[i]);
                        w
                    })
                    .collect();

                Self::new(name, waypoints)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of waypoints, always at least one.
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Index of the last extreme.
    pub fn last_index(&self) -> usize {
        self.waypoints.len() - 1
    }

    pub fn waypoint(&self, index: usize) -> Option<&[Angle; NUM_JOINTS]> {
        self.waypoints.get(index)
    }

    pub fn waypoints(&self) -> &[[Angle; NUM_JOINTS]] {
        &self.waypoints
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_len(
    name: &str,
    column: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), TrajError> {
    if expected == found {
        Ok(())
    } else {
        Err(TrajError::LengthMismatch {
            name: name.into(),
            column,
            expected,
            found,
        })
    }
}
