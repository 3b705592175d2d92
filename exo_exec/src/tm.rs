//! # Link telemetry
//!
//! Archives every exchange with the daemon to `link/exchanges.csv` in the session archive.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::co::{Command, Response},
    net::JointUpdateHandler,
};
use log::warn;
use serde::Serialize;
use util::{archive::Archiver, session};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// One archived command/response pair.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRecord<'a> {
    pub time_s: f64,
    pub node: u8,
    pub command: &'a str,
    pub response: &'a str,
}

/// Writes each exchange on the link to an archive.
pub struct ExchangeArchiver {
    arch: Archiver,

    /// Set once a write has failed, so the failure is only reported once.
    failed: bool,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl ExchangeArchiver {
    pub fn new(arch: Archiver) -> Self {
        Self {
            arch,
            failed: false,
        }
    }
}

impl JointUpdateHandler for ExchangeArchiver {
    fn on_exchange(&mut self, cmd: &Command, wire: &str, response: &Response) {
        let res = self.arch.serialise(ExchangeRecord {
            time_s: session::get_elapsed_seconds(),
            node: cmd.node,
            command: wire,
            response: response.raw(),
        });

        if let Err(e) = res {
            if !self.failed {
                warn!("Could not archive link exchanges: {}", e);
                self.failed = true;
            }
        }
    }
}
