//! Implementation of the motion sequencer state machine

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use comms_if::eqpt::joint::{JointId, RawPosition, NUM_JOINTS};
use log::{debug, error, info, warn};

// Internal
use super::{Extreme, GaitKind, GaitState, MotionDirection, SeqError, StatusReport, StepOutcome};
use crate::{calib::CalibrationMap, driver::JointDriver, input::Buttons, traj::Trajectory};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    session,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Drives the joints through one gait.
pub struct MotionSequencer<'a> {
    kind: GaitKind,

    traj: &'a Trajectory,

    /// Raw targets of every waypoint.
    targets: Vec<[RawPosition; NUM_JOINTS]>,

    /// Half width of the convergence window, in raw units.
    tolerance: i32,

    exit: Extreme,

    state: GaitState,

    /// Last state written to the archive.
    archived_state: Option<GaitState>,
    arch_report: Archiver,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> MotionSequencer<'a> {
    /// Create a sequencer for a gait which starts at the `start` extreme and may only be left at
    /// the `exit` extreme.
    pub fn new(
        kind: GaitKind,
        traj: &'a Trajectory,
        calib: &'a CalibrationMap,
        tolerance: i32,
        start: Extreme,
        exit: Extreme,
    ) -> Self {
        let targets = traj
            .waypoints()
            .iter()
            .map(|w| calib.convert_waypoint(w))
            .collect();

        Self {
            kind,
            traj,
            targets,
            tolerance,
            exit,
            state: GaitState::new(start, traj.len()),
            archived_state: None,
            arch_report: Archiver::default(),
        }
    }

    /// Archive status reports with the given archiver.
    pub fn with_archiver(mut self, archiver: Archiver) -> Self {
        self.arch_report = archiver;
        self
    }

    pub fn state(&self) -> GaitState {
        self.state
    }

    pub fn kind(&self) -> GaitKind {
        self.kind
    }

    pub fn trajectory(&self) -> &Trajectory {
        self.traj
    }

    /// Raw targets of the waypoint at `index`.
    pub fn target(&self, index: usize) -> Option<&[RawPosition; NUM_JOINTS]> {
        self.targets.get(index)
    }

    /// Perform one poll of the sequencer with a fresh button sample.
    ///
    /// Abort is handled before anything else. While a move is in flight only convergence is
    /// checked and the other buttons are ignored.
    ///
    /// On error every joint has been quiesced, as far as the link allowed.
    pub fn step<D>(&mut self, buttons: &Buttons, driver: &mut D) -> Result<StepOutcome, SeqError>
    where
        D: JointDriver + ?Sized,
    {
        if buttons.abort {
            info!("Abort pressed, quiescing all joints");
            self.state.motion = MotionDirection::Idle;
            self.archive();

            driver.quiesce_all().map_err(SeqError::QuiesceFailed)?;

            return Ok(StepOutcome::Aborted);
        }

        let outcome = match self.state.motion {
            MotionDirection::Idle => self.step_idle(buttons, driver)?,
            MotionDirection::Advancing | MotionDirection::Retreating => {
                self.step_moving(driver)?;
                StepOutcome::Continue
            }
        };

        self.archive();

        Ok(outcome)
    }

    fn last_index(&self) -> isize {
        self.traj.last_index() as isize
    }

    fn step_idle<D>(&mut self, buttons: &Buttons, driver: &mut D) -> Result<StepOutcome, SeqError>
    where
        D: JointDriver + ?Sized,
    {
        let index = self.state.current_index;

        if buttons.advance && index < self.last_index() {
            info!("{}", self.kind.advance_label());
            self.begin_move(MotionDirection::Advancing, driver)?;
        } else if buttons.retreat && index > 0 {
            info!("{}", self.kind.retreat_label());
            self.begin_move(MotionDirection::Retreating, driver)?;
        } else if buttons.confirm && index == self.exit.index(self.traj.last_index()) {
            info!(
                "Leaving {:?} gait at waypoint {} of {:?}",
                self.kind,
                index,
                self.traj.name()
            );
            return Ok(StepOutcome::Exited);
        }

        Ok(StepOutcome::Continue)
    }

    /// Send the move burst of the neighbouring waypoint to every joint.
    fn begin_move<D>(&mut self, direction: MotionDirection, driver: &mut D) -> Result<(), SeqError>
    where
        D: JointDriver + ?Sized,
    {
        self.state.motion = direction;

        let index = match self.state.target_index() {
            Some(i) => i,
            None => return Ok(()),
        };
        let target = self.targets[index as usize];

        debug!("Target waypoint {}: {:?}", index, target);

        for joint in JointId::ALL.iter() {
            if let Err(e) = driver.move_to(*joint, target[joint.index()]) {
                error!("Move of {} to waypoint {} failed: {}", joint, index, e);
                self.state.motion = MotionDirection::Idle;
                quiesce_after_failure(driver);
                return Err(SeqError::MoveFailed { index, source: e });
            }
        }

        Ok(())
    }

    /// Check whether every joint has reached the target waypoint, completing the move if so.
    fn step_moving<D>(&mut self, driver: &mut D) -> Result<(), SeqError>
    where
        D: JointDriver + ?Sized,
    {
        let index = match self.state.target_index() {
            Some(i) => i,
            None => return Ok(()),
        };
        let target = self.targets[index as usize];

        for joint in JointId::ALL.iter() {
            match driver.position(*joint) {
                Ok(pos) => {
                    if !within_tolerance(pos, target[joint.index()], self.tolerance) {
                        return Ok(());
                    }
                }
                Err(e) if e.is_link_failure() => {
                    error!("Position of {} unavailable: {}", joint, e);
                    quiesce_after_failure(driver);
                    return Err(SeqError::FeedbackLost(e));
                }
                Err(e) => {
                    warn!("Position of {} unavailable, not converged: {}", joint, e);
                    return Ok(());
                }
            }
        }

        info!("Position reached.");
        self.state.current_index = index;
        self.state.motion = MotionDirection::Idle;

        if index == 0 {
            info!("{}", self.kind.extreme_label(Extreme::First));
        }
        if index == self.last_index() {
            info!("{}", self.kind.extreme_label(Extreme::Last));
        }

        Ok(())
    }

    /// Archive the status if the state changed since the last write.
    fn archive(&mut self) {
        if self.archived_state == Some(self.state) {
            return;
        }

        match self.write() {
            Ok(_) => self.archived_state = Some(self.state),
            Err(e) => warn!("Could not archive the sequencer status: {}", e),
        }
    }
}

impl<'a> Archived for MotionSequencer<'a> {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(StatusReport {
            time_s: session::get_elapsed_seconds(),
            gait: self.kind,
            current_index: self.state.current_index,
            motion: self.state.motion,
            target_index: self.state.target_index(),
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Strict window check, a joint exactly `tolerance` away has not converged.
fn within_tolerance(pos: RawPosition, target: RawPosition, tolerance: i32) -> bool {
    let (pos, target, tol) = (pos.0 as i64, target.0 as i64, tolerance as i64);
    pos > target - tol && pos < target + tol
}

fn quiesce_after_failure<D: JointDriver + ?Sized>(driver: &mut D) {
    if let Err(e) = driver.quiesce_all() {
        error!("Joints could not all be quiesced: {}", e);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        calib::{Angle, CalibPoints},
        driver::DriverError,
    };
    use comms_if::{
        eqpt::co::ProtocolError,
        net::LinkError,
    };

    const TOL: i32 = 5000;

    /// Driver whose joints report whatever position the test sets.
    #[derive(Default)]
    struct MockDriver {
        /// `None` makes the position query fail with a protocol error.
        positions: [Option<i32>; NUM_JOINTS],
        link_down: bool,
        fail_moves: bool,
        moves: Vec<(JointId, RawPosition)>,
        queries: usize,
        quiesced: Vec<JointId>,
    }

    impl MockDriver {
        fn arrive(&mut self, target: &[RawPosition; NUM_JOINTS]) {
            for j in JointId::ALL.iter() {
                self.positions[j.index()] = Some(target[j.index()].0);
            }
        }
    }

    impl JointDriver for MockDriver {
        fn move_to(&mut self, joint: JointId, target: RawPosition) -> Result<(), DriverError> {
            if self.fail_moves {
                return Err(DriverError::Protocol {
                    node: joint.node_id(),
                    command: "write".into(),
                    source: ProtocolError::Device("[1] ERROR: 0x06090030".into()),
                });
            }
            self.moves.push((joint, target));
            Ok(())
        }

        fn position(&mut self, joint: JointId) -> Result<RawPosition, DriverError> {
            self.queries += 1;
            if self.link_down {
                return Err(DriverError::Link(LinkError::RetriesExhausted {
                    command: "read".into(),
                    reconnects: 10,
                    source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "down"),
                }));
            }
            self.positions[joint.index()]
                .map(RawPosition)
                .ok_or_else(|| DriverError::Protocol {
                    node: joint.node_id(),
                    command: "read".into(),
                    source: ProtocolError::NotNumeric("garbage".into()),
                })
        }

        fn quiesce(&mut self, joint: JointId) -> Result<(), DriverError> {
            self.quiesced.push(joint);
            Ok(())
        }
    }

    fn calib() -> CalibrationMap {
        CalibrationMap::new(&CalibPoints::default()).unwrap()
    }

    fn sit_stand() -> Trajectory {
        Trajectory::new(
            "sit_stand",
            vec![
                [Angle(180.0), Angle(0.0), Angle(180.0), Angle(0.0)],
                [Angle(96.23), Angle(84.42), Angle(96.23), Angle(84.42)],
            ],
        )
        .unwrap()
    }

    fn three_point() -> Trajectory {
        Trajectory::new(
            "three",
            vec![
                [Angle(170.0), Angle(0.0), Angle(170.0), Angle(0.0)],
                [Angle(150.0), Angle(30.0), Angle(160.0), Angle(10.0)],
                [Angle(130.0), Angle(60.0), Angle(140.0), Angle(20.0)],
            ],
        )
        .unwrap()
    }

    fn press(advance: bool, retreat: bool, confirm: bool) -> Buttons {
        Buttons {
            advance,
            retreat,
            abort: false,
            confirm,
        }
    }

    const NONE: Buttons = Buttons {
        advance: false,
        retreat: false,
        abort: false,
        confirm: false,
    };

    const ABORT: Buttons = Buttons {
        advance: false,
        retreat: false,
        abort: true,
        confirm: false,
    };

    #[test]
    fn test_walk_through_and_bounds() {
        let traj = three_point();
        let calib = calib();
        let mut seq = MotionSequencer::new(
            GaitKind::Walk,
            &traj,
            &calib,
            TOL,
            Extreme::First,
            Extreme::Last,
        );
        let mut driver = MockDriver::default();

        assert_eq!(seq.state().current_index, -1);

        // Advance through every waypoint, the index moves by one per convergence
        for expected in 0..3 {
            seq.step(&press(true, false, false), &mut driver).unwrap();
            assert_eq!(seq.state().motion, MotionDirection::Advancing);
            assert_eq!(seq.state().current_index, expected - 1);

            let target = *seq.target(expected as usize).unwrap();
            driver.arrive(&target);
            seq.step(&NONE, &mut driver).unwrap();

            assert_eq!(seq.state().current_index, expected);
            assert_eq!(seq.state().motion, MotionDirection::Idle);
        }
        assert_eq!(driver.moves.len(), 12);

        // Advance is blocked at the last waypoint
        seq.step(&press(true, false, false), &mut driver).unwrap();
        assert_eq!(seq.state().motion, MotionDirection::Idle);
        assert_eq!(driver.moves.len(), 12);

        // Retreat back to the first waypoint
        for expected in (0..2).rev() {
            seq.step(&press(false, true, false), &mut driver).unwrap();
            assert_eq!(seq.state().motion, MotionDirection::Retreating);

            let target = *seq.target(expected as usize).unwrap();
            driver.arrive(&target);
            seq.step(&NONE, &mut driver).unwrap();
            assert_eq!(seq.state().current_index, expected);
        }

        // Retreat is blocked at the first waypoint
        seq.step(&press(false, true, false), &mut driver).unwrap();
        assert_eq!(seq.state().motion, MotionDirection::Idle);
        assert_eq!(seq.state().current_index, 0);
        assert_eq!(driver.moves.len(), 20);
    }

    #[test]
    fn test_advance_wins_over_retreat() {
        let traj = three_point();
        let calib = calib();
        let mut seq = MotionSequencer::new(
            GaitKind::Walk,
            &traj,
            &calib,
            TOL,
            Extreme::First,
            Extreme::Last,
        );
        let mut driver = MockDriver::default();
        driver.arrive(seq.target(0).unwrap());
        seq.step(&press(true, false, false), &mut driver).unwrap();
        seq.step(&NONE, &mut driver).unwrap();
        assert_eq!(seq.state().current_index, 0);

        seq.step(&press(true, true, false), &mut driver).unwrap();
        assert_eq!(seq.state().motion, MotionDirection::Advancing);
    }

    #[test]
    fn test_single_flight() {
        let traj = three_point();
        let calib = calib();
        let mut seq = MotionSequencer::new(
            GaitKind::Walk,
            &traj,
            &calib,
            TOL,
            Extreme::First,
            Extreme::Last,
        );
        let mut driver = MockDriver::default();
        driver.positions = [Some(-100000); NUM_JOINTS];

        seq.step(&press(true, false, false), &mut driver).unwrap();
        assert_eq!(driver.moves.len(), 4);

        for buttons in [
            press(true, false, false),
            press(false, true, false),
            press(false, false, true),
            press(true, true, true),
        ] {
            assert_eq!(
                seq.step(&buttons, &mut driver).unwrap(),
                StepOutcome::Continue
            );
            assert_eq!(seq.state().motion, MotionDirection::Advancing);
            assert_eq!(driver.moves.len(), 4);
        }
    }

    #[test]
    fn test_all_joints_must_converge() {
        let traj = three_point();
        let calib = calib();
        let mut seq = MotionSequencer::new(
            GaitKind::Walk,
            &traj,
            &calib,
            TOL,
            Extreme::First,
            Extreme::Last,
        );
        let mut driver = MockDriver::default();

        seq.step(&press(true, false, false), &mut driver).unwrap();
        let target = *seq.target(0).unwrap();
        driver.arrive(&target);

        // Right knee still outside the window
        driver.positions[JointId::RightKnee.index()] = Some(target[3].0 + TOL + 1000);
        seq.step(&NONE, &mut driver).unwrap();
        assert_eq!(seq.state().current_index, -1);
        assert_eq!(seq.state().motion, MotionDirection::Advancing);

        // The first joint out of the window stops the check
        driver.queries = 0;
        driver.positions[JointId::LeftHip.index()] = Some(target[0].0 - TOL);
        seq.step(&NONE, &mut driver).unwrap();
        assert_eq!(driver.queries, 1);
        assert_eq!(seq.state().current_index, -1);

        // Just inside the window on every joint
        driver.arrive(&target);
        driver.positions[JointId::LeftHip.index()] = Some(target[0].0 - TOL + 1);
        driver.positions[JointId::RightKnee.index()] = Some(target[3].0 + TOL - 1);
        seq.step(&NONE, &mut driver).unwrap();
        assert_eq!(seq.state().current_index, 0);
    }

    #[test]
    fn test_abort_from_every_state() {
        let traj = three_point();
        let calib = calib();

        // Idle, advancing and retreating
        for moves in [vec![], vec![press(true, false, false)], vec![
            press(true, false, false),
            NONE,
            press(true, false, false),
            NONE,
            press(false, true, false),
        ]] {
            let mut seq = MotionSequencer::new(
                GaitKind::Walk,
                &traj,
                &calib,
                TOL,
                Extreme::First,
                Extreme::Last,
            );
            let mut driver = MockDriver::default();

            for b in moves.iter() {
                if let Some(i) = seq.state().target_index() {
                    driver.arrive(seq.target(i as usize).unwrap());
                }
                seq.step(b, &mut driver).unwrap();
            }

            // Abort wins even when other buttons are held
            let mut buttons = ABORT;
            buttons.advance = true;
            buttons.confirm = true;

            assert_eq!(
                seq.step(&buttons, &mut driver).unwrap(),
                StepOutcome::Aborted
            );
            assert_eq!(driver.quiesced, JointId::ALL.to_vec());
        }
    }

    #[test]
    fn test_stand_up_from_seated_sentinel() {
        let traj = sit_stand();
        let calib = calib();
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            TOL,
            Extreme::Last,
            Extreme::First,
        );
        let mut driver = MockDriver::default();
        assert_eq!(seq.state().current_index, 2);

        // Past the last waypoint, moving further is blocked
        seq.step(&press(true, false, false), &mut driver).unwrap();
        assert!(driver.moves.is_empty());

        // Moving back targets the seated waypoint
        seq.step(&press(false, true, false), &mut driver).unwrap();
        assert_eq!(
            driver.moves,
            vec![
                (JointId::LeftHip, RawPosition(233513)),
                (JointId::LeftKnee, RawPosition(235325)),
                (JointId::RightHip, RawPosition(233513)),
                (JointId::RightKnee, RawPosition(235325)),
            ]
        );

        driver.positions = [Some(233000), Some(236000), Some(234000), Some(235000)];
        seq.step(&NONE, &mut driver).unwrap();
        assert_eq!(seq.state().current_index, 1);

        // Exit is only accepted at the standing extreme
        assert_eq!(
            seq.step(&press(false, false, true), &mut driver).unwrap(),
            StepOutcome::Continue
        );

        seq.step(&press(false, true, false), &mut driver).unwrap();
        driver.positions = [Some(0); NUM_JOINTS];
        seq.step(&NONE, &mut driver).unwrap();
        assert_eq!(seq.state().current_index, 0);

        // Retreat at the first waypoint does nothing
        seq.step(&press(false, true, false), &mut driver).unwrap();
        assert_eq!(seq.state().motion, MotionDirection::Idle);
        assert_eq!(driver.moves.len(), 8);

        assert_eq!(
            seq.step(&press(false, false, true), &mut driver).unwrap(),
            StepOutcome::Exited
        );
    }

    #[test]
    fn test_unreadable_position_not_converged() {
        let traj = sit_stand();
        let calib = calib();
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            TOL,
            Extreme::First,
            Extreme::Last,
        );
        let mut driver = MockDriver::default();

        seq.step(&press(true, false, false), &mut driver).unwrap();
        driver.positions = [None; NUM_JOINTS];

        assert_eq!(
            seq.step(&NONE, &mut driver).unwrap(),
            StepOutcome::Continue
        );
        assert_eq!(seq.state().motion, MotionDirection::Advancing);
        assert_eq!(seq.state().current_index, -1);
    }

    #[test]
    fn test_failed_burst_quiesces() {
        let traj = sit_stand();
        let calib = calib();
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            TOL,
            Extreme::First,
            Extreme::Last,
        );
        let mut driver = MockDriver {
            fail_moves: true,
            ..Default::default()
        };

        assert!(matches!(
            seq.step(&press(true, false, false), &mut driver),
            Err(SeqError::MoveFailed { index: 0, .. })
        ));
        assert_eq!(driver.quiesced.len(), NUM_JOINTS);
        assert_eq!(seq.state().motion, MotionDirection::Idle);
    }

    #[test]
    fn test_link_loss_while_moving_quiesces() {
        let traj = sit_stand();
        let calib = calib();
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            TOL,
            Extreme::First,
            Extreme::Last,
        );
        let mut driver = MockDriver::default();

        seq.step(&press(true, false, false), &mut driver).unwrap();
        driver.link_down = true;

        assert!(matches!(
            seq.step(&NONE, &mut driver),
            Err(SeqError::FeedbackLost(_))
        ));
        assert_eq!(driver.quiesced.len(), NUM_JOINTS);
    }

    #[test]
    fn test_status_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.csv");

        let traj = sit_stand();
        let calib = calib();
        let mut seq = MotionSequencer::new(
            GaitKind::SitStand,
            &traj,
            &calib,
            TOL,
            Extreme::First,
            Extreme::Last,
        )
        .with_archiver(Archiver::from_file_path(&path).unwrap());
        let mut driver = MockDriver::default();

        seq.step(&NONE, &mut driver).unwrap();
        seq.step(&NONE, &mut driver).unwrap();
        seq.step(&press(true, false, false), &mut driver).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines[0], "time_s,gait,current_index,motion,target_index");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",sit_stand,-1,Idle,"));
        assert!(lines[2].ends_with(",sit_stand,-1,Advancing,0"));
    }
}
