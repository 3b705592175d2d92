//! Main exoskeleton executable entry point.
//!
//! # Architecture
//!
//! The executable runs the exoskeleton through the gait plan given in its parameters:
//!
//!     - Wait for the operator to press confirm, reporting the joint positions
//!     - Bring the joints up in profile position mode
//!     - For each stage of the plan:
//!         - Set the stage's profile velocity
//!         - Sequence the stage's trajectory under operator control
//!     - Quiesce the joints and close the link
//!
//! An abort from the operator quiesces the joints and ends the executable cleanly. Any fatal
//! error quiesces the joints, as far as the link allows, before the executable exits with it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{error, info, warn};
use std::{cell::RefCell, rc::Rc};

use comms_if::net::{DeviceLink, Transport};

// Internal
use exo_lib::{
    calib::{CalibPoints, CalibrationMap},
    driver::{CoJointDriver, JointDriver},
    gait::{self, StageSummary},
    input::{CanButtons, GpioButtons, InputKind, InputSource},
    params::ExoExecParams,
    seq::{MotionSequencer, StepOutcome},
    tm::ExchangeArchiver,
    traj::Trajectory,
};
use util::{
    archive::Archiver,
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("exo_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Exoskeleton Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: ExoExecParams =
        util::params::load("exo_exec.toml").wrap_err("Could not load exec params")?;
    params.validate().wrap_err("Invalid exec params")?;

    let calib_points: CalibPoints = util::params::load(&params.calib_file)
        .wrap_err("Could not load the calibration points")?;
    let calib = CalibrationMap::new(&calib_points).wrap_err("Invalid calibration")?;

    let trajs = params
        .plan
        .iter()
        .map(|stage| {
            Trajectory::load(&stage.traj_file)
                .wrap_err_with(|| format!("Could not load the trajectory of stage {}", stage.name))
        })
        .collect::<Result<Vec<_>>>()?;

    info!("Parameters loaded, {} stages in the plan", params.plan.len());

    // ---- LINK INITIALISATION ----

    let mut link = DeviceLink::connect(params.link.clone())
        .wrap_err("Could not connect to the CANopen daemon")?;
    link.set_update_handler(Box::new(ExchangeArchiver::new(
        Archiver::from_path(&session, "link/exchanges.csv")
            .wrap_err("Could not create the link archive")?,
    )));

    // The link is shared between the joint driver and the CAN buttons
    let link = Rc::new(RefCell::new(link));

    let mut input: Box<dyn InputSource> = match params.input.kind {
        InputKind::Can => Box::new(CanButtons::new(link.clone(), &params.input.can)),
        InputKind::Gpio => Box::new(
            GpioButtons::from_sysfs(&params.input.gpio)
                .wrap_err("Could not set up the GPIO buttons")?,
        ),
    };

    let mut driver = CoJointDriver::new(link.clone(), params.link.burst_retries);

    info!("Initialisation complete");

    // ---- RUN ----

    let mut summaries = Vec::with_capacity(params.plan.len());

    let res = run(
        &params,
        &calib,
        &trajs,
        &session,
        input.as_mut(),
        &mut driver,
        &mut summaries,
    );

    if let Err(ref e) = res {
        error!("Fatal error: {:#}", e);
        if driver.quiesce_all().is_err() {
            error!("Joints may still be enabled");
        }
    }

    info!("{} stages run", summaries.len());
    session.save("stages.json", summaries);

    // ---- SHUTDOWN ----

    link.borrow_mut().close();
    session.exit();

    res
}

/// Run the start gate and every stage of the plan.
fn run<T: Transport>(
    params: &ExoExecParams,
    calib: &CalibrationMap,
    trajs: &[Trajectory],
    session: &Session,
    input: &mut dyn InputSource,
    driver: &mut CoJointDriver<T>,
    summaries: &mut Vec<StageSummary>,
) -> Result<()> {
    // ---- START GATE ----

    match gait::wait_for_start(input, driver, params.start_poll_period_s)
        .wrap_err("Start gate failed")?
    {
        StepOutcome::Exited => (),
        _ => {
            info!("Aborted before start");
            return Ok(());
        }
    }

    driver
        .init(&params.profile)
        .wrap_err("Could not initialise the joints")?;

    // ---- GAIT PLAN ----

    for (stage, traj) in params.plan.iter().zip(trajs.iter()) {
        info!("Stage {}: {:?} mode", stage.name, stage.kind);

        if let Some(v) = stage.velocity {
            driver
                .set_profile_velocity(v)
                .wrap_err_with(|| format!("Could not set the velocity of stage {}", stage.name))?;
        }

        let archiver = Archiver::from_path(session, format!("seq/{}_status.csv", stage.name))
            .unwrap_or_else(|e| {
                warn!("Sequencer status of {} will not be archived: {}", stage.name, e);
                Archiver::default()
            });

        let mut seq = MotionSequencer::new(
            stage.kind,
            traj,
            calib,
            params.tolerance,
            stage.start,
            stage.exit,
        )
        .with_archiver(archiver);

        let outcome = gait::run_stage(
            &stage.name,
            &mut seq,
            input,
            driver,
            params.poll_period_s,
            summaries,
        )
        .wrap_err_with(|| format!("Stage {} failed", stage.name))?;

        match outcome {
            StepOutcome::Exited => info!("Stage {} complete", stage.name),
            StepOutcome::Aborted => {
                info!("Terminating program ({})", stage.name);
                return Ok(());
            }
            StepOutcome::Continue => {
                return Err(eyre!("Stage {} ended without an outcome", stage.name))
            }
        }
    }

    // ---- STOP ----

    driver
        .quiesce_all()
        .wrap_err("Could not quiesce the joints")?;

    Ok(())
}
