//! # Motion Sequencer
//!
//! Steps the joints through a trajectory one waypoint at a time. A move towards the neighbouring
//! waypoint is started by the operator, after which the sequencer waits for every joint to reach
//! its target within tolerance before accepting the next press.
//!
//! The waypoint index runs from `-1` to `len`, the two ends being sentinels one step outside the
//! table, used when the gait starts at a known extreme whose waypoint has not been commanded yet.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::driver::DriverError;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Position of the sequencer in the trajectory.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaitState {
    /// Index of the last waypoint reached, or a sentinel (`-1` or `len`).
    pub current_index: isize,

    pub motion: MotionDirection,
}

/// Status of the sequencer, archived whenever it changes.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub time_s: f64,
    pub gait: GaitKind,
    pub current_index: isize,
    pub motion: MotionDirection,
    pub target_index: Option<isize>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionDirection {
    Idle,
    Advancing,
    Retreating,
}

/// One of the two ends of a trajectory.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Extreme {
    First,
    Last,
}

/// The kind of gait, which determines how moves are described.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GaitKind {
    SitStand,
    Walk,
}

/// Result of one sequencer step.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The gait is still running.
    Continue,

    /// The operator left the gait at its exit extreme.
    Exited,

    /// The operator aborted, every joint has been quiesced.
    Aborted,
}

#[derive(thiserror::Error, Debug)]
pub enum SeqError {
    #[error("Could not command the move to waypoint {index}, joints quiesced: {source}")]
    MoveFailed { index: isize, source: DriverError },

    #[error("Lost the joints while waiting for convergence: {0}")]
    FeedbackLost(DriverError),

    #[error("Could not quiesce the joints: {0}")]
    QuiesceFailed(DriverError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GaitState {
    /// Seed the state for a gait starting at the given extreme of a trajectory of `len`
    /// waypoints.
    pub fn new(start: Extreme, len: usize) -> Self {
        let current_index = match start {
            Extreme::First => -1,
            Extreme::Last => len as isize,
        };

        Self {
            current_index,
            motion: MotionDirection::Idle,
        }
    }

    /// Index of the waypoint currently being moved to.
    pub fn target_index(&self) -> Option<isize> {
        match self.motion {
            MotionDirection::Idle => None,
            MotionDirection::Advancing => Some(self.current_index + 1),
            MotionDirection::Retreating => Some(self.current_index - 1),
        }
    }
}

impl Extreme {
    /// Index of this extreme in a trajectory whose last index is `last_index`.
    pub fn index(self, last_index: usize) -> isize {
        match self {
            Extreme::First => 0,
            Extreme::Last => last_index as isize,
        }
    }
}

impl GaitKind {
    /// Description of a move towards the last waypoint.
    pub fn advance_label(self) -> &'static str {
        match self {
            GaitKind::SitStand => "Sitting down",
            GaitKind::Walk => "WalkForward",
        }
    }

    /// Description of a move towards the first waypoint.
    pub fn retreat_label(self) -> &'static str {
        match self {
            GaitKind::SitStand => "Standing up",
            GaitKind::Walk => "WalkBack",
        }
    }

    /// Description of reaching an extreme.
    pub fn extreme_label(self, extreme: Extreme) -> &'static str {
        match (self, extreme) {
            (GaitKind::SitStand, Extreme::First) => "full standing position",
            (GaitKind::SitStand, Extreme::Last) => "fully seated position",
            (GaitKind::Walk, Extreme::First) => "first array position",
            (GaitKind::Walk, Extreme::Last) => "final array position",
        }
    }
}
