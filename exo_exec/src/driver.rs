//! # Joint Driver
//!
//! This module provides the command and query capability the sequencer needs from the joints,
//! abstracted behind the [`JointDriver`] trait. [`CoJointDriver`] implements it over a link to the
//! CANopen daemon.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::{
        co::{Command, ProtocolError},
        joint::{JointId, RawPosition},
    },
    net::{LinkError, Transport},
};
use log::{debug, error, info, warn};
use std::convert::TryFrom;

use crate::params::ProfileParams;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for commanding the joints.
pub trait JointDriver {
    /// Command the joint to move to an absolute position.
    ///
    /// On success the joint is armed with the new target and the move has been started.
    fn move_to(&mut self, joint: JointId, target: RawPosition) -> Result<(), DriverError>;

    /// Query the joint's actual position.
    fn position(&mut self, joint: JointId) -> Result<RawPosition, DriverError>;

    /// Put the joint into pre-operational, disabling motion.
    fn quiesce(&mut self, joint: JointId) -> Result<(), DriverError>;

    /// Quiesce every joint.
    ///
    /// All joints are attempted even if one fails, the first error is returned.
    fn quiesce_all(&mut self) -> Result<(), DriverError> {
        let mut result = Ok(());

        for joint in JointId::ALL.iter() {
            if let Err(e) = self.quiesce(*joint) {
                error!("Could not quiesce {}: {}", joint, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Joint driver sending CANopen commands over a [`Transport`].
pub struct CoJointDriver<T: Transport> {
    link: T,

    /// Number of retries of each burst command after a protocol error.
    burst_retries: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("Link failure: {0}")]
    Link(#[from] LinkError),

    #[error("Node {node} failed \"{command}\": {source}")]
    Protocol {
        node: u8,
        command: String,
        source: ProtocolError,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriverError {
    /// Returns true if the link to the daemon has been lost.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, DriverError::Link(_))
    }
}

impl<T: Transport> CoJointDriver<T> {
    pub fn new(link: T, burst_retries: u32) -> Self {
        Self {
            link,
            burst_retries,
        }
    }

    /// Bring every joint up: NMT start, profile position mode, acceleration and velocity profile.
    pub fn init(&mut self, profile: &ProfileParams) -> Result<(), DriverError> {
        for joint in JointId::ALL.iter() {
            self.write(&joint.start())?;
            self.write(&joint.set_position_mode())?;

            for cmd in joint.set_profile_acceleration(profile.acceleration).iter() {
                self.write(cmd)?;
            }

            self.write(&joint.set_profile_velocity(profile.velocity))?;

            info!("{} initialised", joint);
        }

        Ok(())
    }

    /// Set the profile velocity of every joint.
    pub fn set_profile_velocity(&mut self, velocity: i32) -> Result<(), DriverError> {
        for joint in JointId::ALL.iter() {
            self.write(&joint.set_profile_velocity(velocity))?;
        }

        info!("Profile velocity set to {}", velocity);

        Ok(())
    }

    /// Query the position of every joint.
    pub fn positions(&mut self) -> Vec<(JointId, Result<RawPosition, DriverError>)> {
        JointId::ALL
            .iter()
            .map(|j| (*j, self.position(*j)))
            .collect()
    }

    /// Get a reference to the underlying link.
    pub fn link(&self) -> &T {
        &self.link
    }

    /// Send a command which the daemon acknowledges with `OK`.
    fn write(&mut self, cmd: &Command) -> Result<(), DriverError> {
        self.link
            .request(cmd)?
            .check_ok()
            .map_err(|e| protocol_error(cmd, e))
    }

    /// Send one command of a move burst, retrying on protocol errors.
    fn write_retried(&mut self, cmd: &Command) -> Result<(), DriverError> {
        let mut attempt = 0;

        loop {
            match self.write(cmd) {
                Err(DriverError::Protocol { source, .. }) if attempt < self.burst_retries => {
                    attempt += 1;
                    warn!(
                        "Node {} rejected \"{}\" ({}), retry {} of {}",
                        cmd.node, cmd, source, attempt, self.burst_retries
                    );
                }
                r => return r,
            }
        }
    }
}

impl<T: Transport> JointDriver for CoJointDriver<T> {
    fn move_to(&mut self, joint: JointId, target: RawPosition) -> Result<(), DriverError> {
        debug!("Moving {} to {}", joint, target);

        for cmd in joint.move_burst(target).iter() {
            self.write_retried(cmd)?;
        }

        Ok(())
    }

    fn position(&mut self, joint: JointId) -> Result<RawPosition, DriverError> {
        let cmd = joint.read_position();

        let value = self
            .link
            .request(&cmd)?
            .value()
            .map_err(|e| protocol_error(&cmd, e))?;

        i32::try_from(value)
            .map(RawPosition)
            .map_err(|_| protocol_error(&cmd, ProtocolError::OutOfRange(value)))
    }

    fn quiesce(&mut self, joint: JointId) -> Result<(), DriverError> {
        self.write(&joint.preop())?;
        info!("{} quiesced", joint);
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn protocol_error(cmd: &Command, source: ProtocolError) -> DriverError {
    DriverError::Protocol {
        node: cmd.node,
        command: cmd.to_string(),
        source,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{SimDaemon, SimReply};
    use comms_if::eqpt::co::{ObjAddr, Verb};

    #[test]
    fn test_init_sequence() {
        let mut driver = CoJointDriver::new(SimDaemon::new(), 0);
        driver
            .init(&ProfileParams {
                velocity: 900000,
                acceleration: 40000,
            })
            .unwrap();

        let sent: Vec<String> = driver.link().sent_wire().into_iter().take(5).collect();
        assert_eq!(
            sent,
            vec![
                "[1] 1 start",
                "[1] 1 write 0x6060 0 i8 1",
                "[1] 1 write 0x6083 0 i32 40000",
                "[1] 1 write 0x6084 0 i32 40000",
                "[1] 1 write 0x6081 0 i32 900000",
            ]
        );
        assert_eq!(driver.link().sent.len(), 20);
        assert!(driver.link().operational.iter().all(|o| *o));
    }

    #[test]
    fn test_move_and_read_back() {
        let mut driver = CoJointDriver::new(SimDaemon::new(), 0);

        driver.move_to(JointId::LeftKnee, RawPosition(235325)).unwrap();
        assert_eq!(
            driver.position(JointId::LeftKnee).unwrap(),
            RawPosition(235325)
        );
        assert_eq!(driver.position(JointId::LeftHip).unwrap(), RawPosition(0));
    }

    #[test]
    fn test_position_lags_move() {
        let mut daemon = SimDaemon::new();
        daemon.settle_reads = 1;
        let mut driver = CoJointDriver::new(daemon, 0);

        driver.move_to(JointId::LeftHip, RawPosition(5000)).unwrap();
        assert_eq!(driver.position(JointId::LeftHip).unwrap(), RawPosition(0));
        assert_eq!(driver.position(JointId::LeftHip).unwrap(), RawPosition(5000));
    }

    #[test]
    fn test_burst_command_retried() {
        let mut daemon = SimDaemon::new();
        // Reject the first controlword write once
        daemon.inject_after(1, SimReply::Raw("[1] ERROR: 0x06090030".into()));
        let mut driver = CoJointDriver::new(daemon, 2);

        driver.move_to(JointId::RightHip, RawPosition(1000)).unwrap();

        let control_words = driver
            .link()
            .sent
            .iter()
            .filter(|c| matches!(c.verb, Verb::Write { addr, .. } if addr == ObjAddr::CONTROL_WORD))
            .count();
        assert_eq!(control_words, 3);
        assert_eq!(driver.position(JointId::RightHip).unwrap(), RawPosition(1000));
    }

    #[test]
    fn test_burst_fails_after_retries() {
        let mut daemon = SimDaemon::new();
        for _ in 0..3 {
            daemon.inject(SimReply::Raw("[1] ERROR: 0x06090030".into()));
        }
        let mut driver = CoJointDriver::new(daemon, 2);

        match driver.move_to(JointId::RightHip, RawPosition(1000)) {
            Err(DriverError::Protocol { node, .. }) => assert_eq!(node, 3),
            other => panic!("Expected a protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_position_errors() {
        let mut daemon = SimDaemon::new();
        daemon.inject(SimReply::Raw("[1] garbage".into()));
        daemon.inject(SimReply::Raw("[1] 99999999999".into()));
        daemon.inject(SimReply::LinkDown);
        let mut driver = CoJointDriver::new(daemon, 0);

        assert!(matches!(
            driver.position(JointId::LeftHip),
            Err(DriverError::Protocol {
                source: ProtocolError::NotNumeric(_),
                ..
            })
        ));
        assert!(matches!(
            driver.position(JointId::LeftHip),
            Err(DriverError::Protocol {
                source: ProtocolError::OutOfRange(_),
                ..
            })
        ));
        assert!(driver
            .position(JointId::LeftHip)
            .unwrap_err()
            .is_link_failure());
    }

    #[test]
    fn test_quiesce_all_attempts_every_joint() {
        let mut daemon = SimDaemon::new();
        daemon.inject(SimReply::Raw("[1] ERROR: 0x05040000".into()));
        let mut driver = CoJointDriver::new(daemon, 0);

        assert!(driver.quiesce_all().is_err());
        assert_eq!(
            driver.link().sent_wire(),
            vec!["[1] 1 preop", "[1] 2 preop", "[1] 3 preop", "[1] 4 preop"]
        );
    }
}
