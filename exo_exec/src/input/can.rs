//! CAN bus buttons
//!
//! The button node exposes each button as a `u32` entry at `0x0100 + n`, subindex 1. A pressed
//! button reads back the bit pattern of the float `1.0`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::co::{Command, DataType, ObjAddr},
    net::Transport,
};
use log::warn;
use serde::Deserialize;

use super::{Button, Buttons, InputError, InputSource};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Value read from a pressed button, `1.0f32` as raw bits.
pub const BUTTON_PRESSED: i64 = 0x3F80_0000;

pub const DEFAULT_BUTTON_NODE: u8 = 9;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CanButtonParams {
    /// Node id of the button node.
    pub node: u8,
}

/// Buttons read through the daemon.
pub struct CanButtons<T: Transport> {
    link: T,
    node: u8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CanButtonParams {
    fn default() -> Self {
        Self {
            node: DEFAULT_BUTTON_NODE,
        }
    }
}

impl<T: Transport> CanButtons<T> {
    pub fn new(link: T, params: &CanButtonParams) -> Self {
        Self {
            link,
            node: params.node,
        }
    }

    fn read_command(&self, button: Button) -> Command {
        let n = match button {
            Button::Advance => 1,
            Button::Retreat => 2,
            Button::Abort => 3,
            Button::Confirm => 4,
        };

        Command::read(self.node, ObjAddr::new(0x0100 + n, 1), DataType::U32)
    }
}

impl<T: Transport> InputSource for CanButtons<T> {
    fn sample(&mut self) -> Result<Buttons, InputError> {
        let mut buttons = Buttons::default();

        for button in Button::ALL.iter() {
            let cmd = self.read_command(*button);

            let response = self
                .link
                .request(&cmd)
                .map_err(|e| InputError::Link(*button, e))?;

            // A button which can't be read is treated as released
            let pressed = match response.value() {
                Ok(v) => v == BUTTON_PRESSED,
                Err(e) => {
                    warn!("Could not read the {:?} button: {}", button, e);
                    false
                }
            };

            buttons.set(*button, pressed);
        }

        Ok(buttons)
    }
}
