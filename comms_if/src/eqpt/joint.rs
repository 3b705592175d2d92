//! # Exoskeleton joints
//!
//! Each joint is driven by one CiA 402 drive on the CAN bus, run in profile position mode. This
//! module maps joints to their node ids and builds the commands used to drive them.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::co::{Command, DataType, ObjAddr};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of joints on the exoskeleton.
pub const NUM_JOINTS: usize = 4;

/// Controlword value which enables the operation with the new set point bit low.
pub const CONTROL_WORD_ARM: i64 = 47;

/// Controlword value which raises the new set point bit, starting the move.
pub const CONTROL_WORD_TRIGGER: i64 = 63;

/// Modes of operation value for profile position mode.
pub const PROFILE_POSITION_MODE: i64 = 1;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A position in the drive's internal units (encoder counts).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct RawPosition(pub i32);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Identifies one of the exoskeleton's joints.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointId {
    LeftHip,
    LeftKnee,
    RightHip,
    RightKnee,
}

/// The class of a joint, which determines its calibration.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointClass {
    Hip,
    Knee,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown joint {0:?}, expected one of lhip, lknee, rhip, rknee")]
pub struct ParseJointError(String);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointId {
    /// All joints, in node id order.
    pub const ALL: [JointId; NUM_JOINTS] = [
        JointId::LeftHip,
        JointId::LeftKnee,
        JointId::RightHip,
        JointId::RightKnee,
    ];

    /// CANopen node id of the joint's drive.
    pub fn node_id(self) -> u8 {
        match self {
            JointId::LeftHip => 1,
            JointId::LeftKnee => 2,
            JointId::RightHip => 3,
            JointId::RightKnee => 4,
        }
    }

    pub fn class(self) -> JointClass {
        match self {
            JointId::LeftHip | JointId::RightHip => JointClass::Hip,
            JointId::LeftKnee | JointId::RightKnee => JointClass::Knee,
        }
    }

    /// Position of the joint in [`JointId::ALL`], used to index per-joint arrays.
    pub fn index(self) -> usize {
        self.node_id() as usize - 1
    }

    /// Short lowercase name, as used on the console and in archives.
    pub fn short_name(self) -> &'static str {
        match self {
            JointId::LeftHip => "lhip",
            JointId::LeftKnee => "lknee",
            JointId::RightHip => "rhip",
            JointId::RightKnee => "rknee",
        }
    }

    /// Read the actual position of the joint.
    pub fn read_position(self) -> Command {
        Command::read(self.node_id(), ObjAddr::POSITION_ACTUAL, DataType::I32)
    }

    pub fn set_target_position(self, target: RawPosition) -> Command {
        Command::write(
            self.node_id(),
            ObjAddr::TARGET_POSITION,
            DataType::I32,
            target.0 as i64,
        )
    }

    /// The three commands which move the joint to an absolute position: the target write followed
    /// by the controlword low then high edge.
    pub fn move_burst(self, target: RawPosition) -> [Command; 3] {
        [
            self.set_target_position(target),
            self.control_word(CONTROL_WORD_ARM),
            self.control_word(CONTROL_WORD_TRIGGER),
        ]
    }

    pub fn control_word(self, word: i64) -> Command {
        Command::write(self.node_id(), ObjAddr::CONTROL_WORD, DataType::I16, word)
    }

    pub fn set_profile_velocity(self, velocity: i32) -> Command {
        Command::write(
            self.node_id(),
            ObjAddr::PROFILE_VELOCITY,
            DataType::I32,
            velocity as i64,
        )
    }

    /// Set both the profile acceleration and deceleration.
    pub fn set_profile_acceleration(self, accel: i32) -> [Command; 2] {
        [
            Command::write(
                self.node_id(),
                ObjAddr::PROFILE_ACCELERATION,
                DataType::I32,
                accel as i64,
            ),
            Command::write(
                self.node_id(),
                ObjAddr::PROFILE_DECELERATION,
                DataType::I32,
                accel as i64,
            ),
        ]
    }

    pub fn set_position_mode(self) -> Command {
        Command::write(
            self.node_id(),
            ObjAddr::MODES_OF_OPERATION,
            DataType::I8,
            PROFILE_POSITION_MODE,
        )
    }

    pub fn start(self) -> Command {
        Command::start(self.node_id())
    }

    /// Put the drive into pre-operational, disabling motion.
    pub fn preop(self) -> Command {
        Command::preop(self.node_id())
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for JointId {
    type Err = ParseJointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        JointId::ALL
            .iter()
            .copied()
            .find(|j| j.short_name() == lower)
            .ok_or_else(|| ParseJointError(s.into()))
    }
}

impl fmt::Display for RawPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
