//! # Gait runner
//!
//! Runs the poll loops of the executable: the start gate, which waits for the operator before the
//! joints are powered, and the gait loop, which feeds button samples to a [`MotionSequencer`]
//! until the operator leaves or aborts the gait.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use comms_if::eqpt::joint::JointId;
use log::{error, info};
use serde::Serialize;
use std::ops::ControlFlow;
use util::{poll::PollLoop, session};

use crate::{
    driver::{DriverError, JointDriver},
    input::{InputError, InputSource},
    seq::{MotionSequencer, SeqError, StepOutcome},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Summary of one stage of the gait plan, saved with the session.
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub name: String,
    pub trajectory: String,
    pub started: DateTime<Utc>,
    pub duration_s: f64,
    pub outcome: StageOutcome,
    pub final_index: isize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Exited,
    Aborted,

    /// The stage ended on an error, the joints have been quiesced.
    Failed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum GaitError {
    #[error("Operator input failed: {0}")]
    Input(#[from] InputError),

    #[error("Sequencer failed: {0}")]
    Seq(#[from] SeqError),

    #[error("Joint driver failed: {0}")]
    Driver(#[from] DriverError),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Report the joint positions until the operator presses confirm.
///
/// Returns [`StepOutcome::Exited`] on confirm, or [`StepOutcome::Aborted`] if abort was pressed
/// instead.
pub fn wait_for_start<I, D>(
    input: &mut I,
    driver: &mut D,
    period_s: f64,
) -> Result<StepOutcome, GaitError>
where
    I: InputSource + ?Sized,
    D: JointDriver + ?Sized,
{
    info!("Press confirm to start");

    PollLoop::new(period_s).run(|_| {
        let mut report = Vec::with_capacity(JointId::ALL.len());
        for joint in JointId::ALL.iter() {
            match driver.position(*joint) {
                Ok(p) => report.push(format!("{}: {}", joint, p)),
                Err(e) if e.is_link_failure() => return Err(e.into()),
                Err(_) => report.push(format!("{}: ?", joint)),
            }
        }
        info!("{}", report.join(", "));

        let buttons = input.sample()?;

        if buttons.abort {
            info!("Abort pressed before start");
            driver.quiesce_all()?;
            Ok(ControlFlow::Break(StepOutcome::Aborted))
        } else if buttons.confirm {
            Ok(ControlFlow::Break(StepOutcome::Exited))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    })
}

/// Run a gait until the operator leaves or aborts it.
///
/// Any error quiesces the joints before it is returned.
pub fn run_gait<I, D>(
    seq: &mut MotionSequencer,
    input: &mut I,
    driver: &mut D,
    period_s: f64,
) -> Result<StepOutcome, GaitError>
where
    I: InputSource + ?Sized,
    D: JointDriver + ?Sized,
{
    let state = seq.state();
    info!(
        "{:?} gait on {:?} from waypoint {}",
        seq.kind(),
        seq.trajectory().name(),
        state.current_index
    );

    PollLoop::new(period_s).run(|_| {
        let buttons = match input.sample() {
            Ok(b) => b,
            Err(e) => {
                error!("Input lost during gait: {}", e);
                if let Err(qe) = driver.quiesce_all() {
                    error!("Joints could not all be quiesced: {}", qe);
                }
                return Err(e.into());
            }
        };

        match seq.step(&buttons, driver)? {
            StepOutcome::Continue => Ok(ControlFlow::Continue(())),
            outcome => Ok(ControlFlow::Break(outcome)),
        }
    })
}

/// Run one stage of the gait plan, recording its summary in `summaries` however it ends.
pub fn run_stage<I, D>(
    name: &str,
    seq: &mut MotionSequencer,
    input: &mut I,
    driver: &mut D,
    period_s: f64,
    summaries: &mut Vec<StageSummary>,
) -> Result<StepOutcome, GaitError>
where
    I: InputSource + ?Sized,
    D: JointDriver + ?Sized,
{
    let started = Utc::now();
    let start_s = session::get_elapsed_seconds();

    let res = run_gait(seq, input, driver, period_s);

    let outcome = match res {
        Ok(StepOutcome::Aborted) => StageOutcome::Aborted,
        Ok(_) => StageOutcome::Exited,
        Err(ref e) => StageOutcome::Failed(e.to_string()),
    };

    summaries.push(StageSummary {
        name: name.into(),
        trajectory: seq.trajectory().name().into(),
        started,
        duration_s: session::get_elapsed_seconds() - start_s,
        outcome,
        final_index: seq.state().current_index,
    });

    res
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        calib::{CalibPoints, CalibrationMap},
        driver::CoJointDriver,
        input::Buttons,
        seq::{Extreme, GaitKind},
        sim::{SimDaemon, SimReply},
        traj::{TrajParams, Trajectory},
    };
    use std::{cell::RefCell, collections::VecDeque, rc::Rc};

    /// Plays back a list of samples, then fails.
    struct ScriptedInput(VecDeque<Buttons>);

    impl InputSource for ScriptedInput {
        fn sample(&mut self) -> Result<Buttons, InputError> {
            self.0.pop_front().ok_or_else(|| InputError::GpioRead(
                crate::input::Button::Abort,
                "script exhausted".into(),
            ))
        }
    }

    fn script(samples: &[(bool, bool, bool, bool)]) -> ScriptedInput {
        ScriptedInput(
            samples
                .iter()
                .map(|&(advance, retreat, abort, confirm)| Buttons {
                    advance,
                    retreat,
                    abort,
                    confirm,
                })
                .collect(),
        )
    }

    const NONE: (bool, bool, bool, bool) = (false, false, false, false);
    const ADVANCE: (bool, bool, bool, bool) = (true, false, false, false);
    const RETREAT: (bool, bool, bool, bool) = (false, true, false, false);
    const ABORT: (bool, bool, bool, bool) = (false, false, true, false);
    const CONFIRM: (bool, bool, bool, bool) = (false, false, false, true);

    fn sit_stand() -> Trajectory {
        Trajectory::from_params(TrajParams::Mirrored {
            name: "sit_stand".into(),
            hip_deg: vec![180.0, 96.23],
            knee_deg: vec![0.0, 84.42],
        })
        .unwrap()
    }

    fn preops(daemon: &SimDaemon) -> Vec<String> {
        daemon
            .sent_wire()
            .into_iter()
            .filter(|w| w.ends_with("preop"))
            .collect()
    }

    #[test]
    fn test_stand_up_then_sit_down() {
        let traj = sit_stand();
        let calib = CalibrationMap::new(&CalibPoints::default()).unwrap();
        let mut driver = CoJointDriver::new(SimDaemon::new(), 0);

        // Stand up from seated
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            5000,
            Extreme::Last,
            Extreme::First,
        );
        let mut input = script(&[
            RETREAT, NONE, NONE, NONE, RETREAT, RETREAT, NONE, NONE, NONE, CONFIRM,
        ]);
        assert_eq!(
            run_gait(&mut seq, &mut input, &mut driver, 0.0).unwrap(),
            StepOutcome::Exited
        );
        assert_eq!(driver.link().target_writes(), 8);
        assert_eq!(driver.link().positions, [0; 4]);

        // Sit back down
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            5000,
            Extreme::First,
            Extreme::Last,
        );
        let mut input = script(&[
            CONFIRM, ADVANCE, NONE, NONE, NONE, ADVANCE, NONE, NONE, NONE, ADVANCE, CONFIRM,
        ]);
        assert_eq!(
            run_gait(&mut seq, &mut input, &mut driver, 0.0).unwrap(),
            StepOutcome::Exited
        );
        assert_eq!(
            driver.link().positions,
            [233513, 235325, 233513, 235325]
        );
        assert_eq!(driver.link().target_writes(), 16);
    }

    #[test]
    fn test_abort_quiesces() {
        let traj = sit_stand();
        let calib = CalibrationMap::new(&CalibPoints::default()).unwrap();
        let mut driver = CoJointDriver::new(SimDaemon::new(), 0);
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            5000,
            Extreme::First,
            Extreme::Last,
        );
        let mut input = script(&[ADVANCE, ABORT]);

        assert_eq!(
            run_gait(&mut seq, &mut input, &mut driver, 0.0).unwrap(),
            StepOutcome::Aborted
        );
        assert_eq!(
            preops(driver.link()),
            vec!["[1] 1 preop", "[1] 2 preop", "[1] 3 preop", "[1] 4 preop"]
        );
    }

    #[test]
    fn test_input_loss_quiesces() {
        let traj = sit_stand();
        let calib = CalibrationMap::new(&CalibPoints::default()).unwrap();
        let mut driver = CoJointDriver::new(SimDaemon::new(), 0);
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            5000,
            Extreme::First,
            Extreme::Last,
        );
        let mut input = script(&[ADVANCE, NONE]);

        assert!(matches!(
            run_gait(&mut seq, &mut input, &mut driver, 0.0),
            Err(GaitError::Input(_))
        ));
        assert_eq!(preops(driver.link()).len(), 4);
    }

    #[test]
    fn test_wait_for_start() {
        let mut driver = CoJointDriver::new(SimDaemon::new(), 0);
        let mut input = script(&[NONE, ADVANCE, CONFIRM]);

        assert_eq!(
            wait_for_start(&mut input, &mut driver, 0.0).unwrap(),
            StepOutcome::Exited
        );
        assert_eq!(driver.link().sent.len(), 12);
        assert_eq!(driver.link().target_writes(), 0);

        let mut input = script(&[ABORT]);
        assert_eq!(
            wait_for_start(&mut input, &mut driver, 0.0).unwrap(),
            StepOutcome::Aborted
        );
        assert_eq!(preops(driver.link()).len(), 4);
    }

    #[test]
    fn test_failed_stage_still_summarised() {
        let traj = sit_stand();
        let calib = CalibrationMap::new(&CalibPoints::default()).unwrap();
        let daemon = Rc::new(RefCell::new(SimDaemon::new()));
        let mut driver = CoJointDriver::new(daemon.clone(), 0);
        let mut summaries = Vec::new();

        // Stand at the first waypoint and leave
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            5000,
            Extreme::First,
            Extreme::First,
        );
        let mut input = script(&[ADVANCE, NONE, CONFIRM]);
        assert_eq!(
            run_stage("stand", &mut seq, &mut input, &mut driver, 0.0, &mut summaries).unwrap(),
            StepOutcome::Exited
        );

        // Lose the link on the first command of the next move
        daemon.borrow_mut().inject(SimReply::LinkDown);
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            5000,
            Extreme::First,
            Extreme::Last,
        );
        let mut input = script(&[ADVANCE]);
        assert!(matches!(
            run_stage("sit", &mut seq, &mut input, &mut driver, 0.0, &mut summaries),
            Err(GaitError::Seq(SeqError::MoveFailed { index: 0, .. }))
        ));

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "stand");
        assert_eq!(summaries[0].trajectory, "sit_stand");
        assert_eq!(summaries[0].outcome, StageOutcome::Exited);
        assert_eq!(summaries[0].final_index, 0);

        assert_eq!(summaries[1].name, "sit");
        assert_eq!(summaries[1].final_index, -1);
        match &summaries[1].outcome {
            StageOutcome::Failed(msg) => assert!(msg.contains("simulated link loss")),
            other => panic!("Expected a failed stage, got {:?}", other),
        }
        assert_eq!(preops(&daemon.borrow()).len(), 4);
    }
}
