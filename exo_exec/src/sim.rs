//! Simulated CANopen daemon for tests.
//!
//! Emulates four joint drives in profile position mode and the button node, answering typed
//! commands directly without a socket. Replies can be scripted to inject errors.

use comms_if::{
    eqpt::{
        co::{Command, ObjAddr, Response, Verb},
        joint::NUM_JOINTS,
    },
    net::{LinkError, Transport},
};
use std::{collections::VecDeque, io};

use crate::input::can::{BUTTON_PRESSED, DEFAULT_BUTTON_NODE};

/// A scripted reply which replaces the simulated one.
#[derive(Debug, Clone)]
pub enum SimReply {
    Raw(String),
    LinkDown,
}

#[derive(Debug, Default)]
pub struct SimDaemon {
    /// Every command received, in order.
    pub sent: Vec<Command>,

    pub positions: [i32; NUM_JOINTS],

    pub operational: [bool; NUM_JOINTS],

    pub profile_velocity: [i32; NUM_JOINTS],

    /// Pressed state of buttons 1 to 4.
    pub buttons: [bool; 4],

    /// Number of position reads after a move is triggered before the joint arrives.
    pub settle_reads: u32,

    pending_target: [Option<i32>; NUM_JOINTS],

    moving: [Option<(i32, u32)>; NUM_JOINTS],

    script: VecDeque<Option<SimReply>>,
}

impl SimDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the reply to the next unscripted request.
    pub fn inject(&mut self, reply: SimReply) {
        self.script.push_back(Some(reply));
    }

    /// Replace the reply to the request after `n` further simulated ones.
    pub fn inject_after(&mut self, n: usize, reply: SimReply) {
        for _ in 0..n {
            self.script.push_back(None);
        }
        self.script.push_back(Some(reply));
    }

    /// Commands received, formatted for bus 1.
    pub fn sent_wire(&self) -> Vec<String> {
        self.sent.iter().map(|c| c.to_wire(1)).collect()
    }

    /// Number of position-affecting writes (target positions) received.
    pub fn target_writes(&self) -> usize {
        self.sent
            .iter()
            .filter(|c| matches!(c.verb, Verb::Write { addr, .. } if addr == ObjAddr::TARGET_POSITION))
            .count()
    }

    fn simulate(&mut self, cmd: &Command) -> String {
        if cmd.node == DEFAULT_BUTTON_NODE {
            return match cmd.verb {
                Verb::Read { addr, .. } if (0x0101..=0x0104).contains(&addr.index) => {
                    let pressed = self.buttons[(addr.index - 0x0101) as usize];
                    if pressed {
                        format!("[1] 0x{:08X}\r", BUTTON_PRESSED)
                    } else {
                        "[1] 0x00000000\r".into()
                    }
                }
                _ => "[1] ERROR: 0x06020000\r".into(),
            };
        }

        let idx = match cmd.node {
            1..=4 => (cmd.node - 1) as usize,
            _ => return "[1] ERROR: 0x06020000\r".into(),
        };

        match cmd.verb {
            Verb::Start => {
                self.operational[idx] = true;
                "[1] OK\r".into()
            }
            Verb::Preop => {
                self.operational[idx] = false;
                self.moving[idx] = None;
                "[1] OK\r".into()
            }
            Verb::Read { addr, .. } if addr == ObjAddr::POSITION_ACTUAL => {
                match self.moving[idx] {
                    Some((target, 0)) => {
                        self.positions[idx] = target;
                        self.moving[idx] = None;
                    }
                    Some((target, n)) => self.moving[idx] = Some((target, n - 1)),
                    None => (),
                }
                format!("[1] {}\r", self.positions[idx])
            }
            Verb::Write { addr, value, .. } if addr == ObjAddr::TARGET_POSITION => {
                self.pending_target[idx] = Some(value as i32);
                "[1] OK\r".into()
            }
            Verb::Write { addr, value, .. } if addr == ObjAddr::CONTROL_WORD => {
                if value == 63 {
                    if let Some(t) = self.pending_target[idx].take() {
                        self.moving[idx] = Some((t, self.settle_reads));
                    }
                }
                "[1] OK\r".into()
            }
            Verb::Write { addr, value, .. } if addr == ObjAddr::PROFILE_VELOCITY => {
                self.profile_velocity[idx] = value as i32;
                "[1] OK\r".into()
            }
            Verb::Write { .. } => "[1] OK\r".into(),
            Verb::Read { .. } => "[1] 0\r".into(),
        }
    }
}

impl Transport for SimDaemon {
    fn request(&mut self, cmd: &Command) -> Result<Response, LinkError> {
        self.sent.push(*cmd);

        match self.script.pop_front().flatten() {
            Some(SimReply::Raw(s)) => Ok(Response::parse(&s)),
            Some(SimReply::LinkDown) => Err(LinkError::RetriesExhausted {
                command: cmd.to_wire(1),
                reconnects: 0,
                source: io::Error::new(io::ErrorKind::BrokenPipe, "simulated link loss"),
            }),
            None => Ok(Response::parse(&self.simulate(cmd))),
        }
    }
}
