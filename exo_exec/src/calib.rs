//! # Joint calibration
//!
//! Converts joint angles in degrees into the drives' raw position units. Each joint class (hip
//! or knee) is calibrated by two reference points, each pairing a raw position with the angle
//! measured at it, which define the affine map `raw = a * angle + b`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::joint::{JointClass, JointId, RawPosition, NUM_JOINTS};
use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A joint angle.
///
/// Units: degrees
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[serde(transparent)]
pub struct Angle(pub f64);

/// A raw position measured at a known angle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CalibPoint {
    pub raw: i32,

    /// Units: degrees
    pub angle_deg: f64,
}

/// Reference points for both joint classes, as loaded from `calib.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalibPoints {
    pub hip: [CalibPoint; 2],
    pub knee: [CalibPoint; 2],
}

/// Affine map from angle to raw position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMap {
    a: f64,
    b: f64,
}

/// Calibration of every joint class.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMap {
    hip: AffineMap,
    knee: AffineMap,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibError {
    #[error("The {0:?} reference points are both at {1} degrees, the calibration is undefined")]
    DegenerateReference(JointClass, f64),

    #[error("The {0:?} reference points contain a non-finite angle")]
    NonFiniteAngle(JointClass),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} deg", self.0)
    }
}

/// Reference points measured on the deployed hardware.
impl Default for CalibPoints {
    fn default() -> Self {
        Self {
            hip: [
                CalibPoint {
                    raw: 250880,
                    angle_deg: 90.0,
                },
                CalibPoint {
                    raw: 0,
                    angle_deg: 180.0,
                },
            ],
            knee: [
                CalibPoint {
                    raw: 250880,
                    angle_deg: 90.0,
                },
                CalibPoint {
                    raw: 0,
                    angle_deg: 0.0,
                },
            ],
        }
    }
}

impl AffineMap {
    /// Compute the map passing through both reference points.
    pub fn from_points(
        class: JointClass,
        p1: CalibPoint,
        p2: CalibPoint,
    ) -> Result<Self, CalibError> {
        let (x1, y1) = (p1.angle_deg, p1.raw as f64);
        let (x2, y2) = (p2.angle_deg, p2.raw as f64);

        if !x1.is_finite() || !x2.is_finite() {
            return Err(CalibError::NonFiniteAngle(class));
        }

        if x1 == x2 {
            return Err(CalibError::DegenerateReference(class, x1));
        }

        Ok(Self {
            a: (y2 - y1) / (x2 - x1),
            b: (y1 * x2 - y2 * x1) / (x2 - x1),
        })
    }

    /// Convert an angle to a raw position, truncating toward zero.
    pub fn to_raw(&self, angle: Angle) -> RawPosition {
        RawPosition((self.a * angle.0 + self.b) as i32)
    }

    pub fn to_angle(&self, raw: RawPosition) -> Angle {
        Angle((raw.0 as f64 - self.b) / self.a)
    }
}

impl CalibrationMap {
    pub fn new(points: &CalibPoints) -> Result<Self, CalibError> {
        Ok(Self {
            hip: AffineMap::from_points(JointClass::Hip, points.hip[0], points.hip[1])?,
            knee: AffineMap::from_points(JointClass::Knee, points.knee[0], points.knee[1])?,
        })
    }

    pub fn class_map(&self, class: JointClass) -> &AffineMap {
        match class {
            JointClass::Hip => &self.hip,
            JointClass::Knee => &self.knee,
        }
    }

    /// Convert the angle of the given joint into a raw position.
    pub fn to_raw(&self, joint: JointId, angle: Angle) -> RawPosition {
        self.class_map(joint.class()).to_raw(angle)
    }

    /// Convert a raw position of the given joint into an angle.
    pub fn to_angle(&self, joint: JointId, raw: RawPosition) -> Angle {
        self.class_map(joint.class()).to_angle(raw)
    }

    /// Convert a sequence of angles for one joint class.
    pub fn convert_seq(&self, class: JointClass, angles: &[Angle]) -> Vec<RawPosition> {
        let map = self.class_map(class);
        angles.iter().map(|a| map.to_raw(*a)).collect()
    }

    /// Convert a waypoint, holding one angle per joint, into raw positions.
    pub fn convert_waypoint(&self, waypoint: &[Angle; NUM_JOINTS]) -> [RawPosition; NUM_JOINTS] {
        let mut raw = [RawPosition::default(); NUM_JOINTS];

        for joint in JointId::ALL.iter() {
            raw[joint.index()] = self.to_raw(*joint, waypoint[joint.index()]);
        }

        raw
    }
}
