//! # Operator Input
//!
//! The operator drives the exoskeleton with four push buttons. This module abstracts the buttons
//! behind the [`InputSource`] trait so the sequencer does not care how they are wired. Polarity is
//! normalised by each source: in a [`Buttons`] sample `true` always means pressed.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Buttons read over the CAN bus from the button node.
pub mod can;

/// Buttons wired to GPIO pins.
pub mod gpio;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::LinkError;
use serde::{Deserialize, Serialize};

pub use can::{CanButtonParams, CanButtons};
pub use gpio::{GpioButtonParams, GpioButtons};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of button samples.
pub trait InputSource {
    /// Sample all four buttons once.
    fn sample(&mut self) -> Result<Buttons, InputError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One sample of the operator buttons.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons {
    /// Move towards the last waypoint (red).
    pub advance: bool,

    /// Move towards the first waypoint (blue).
    pub retreat: bool,

    /// Stop everything (yellow).
    pub abort: bool,

    /// Start, or leave the current gait (green).
    pub confirm: bool,
}

/// Parameters of the operator input.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct InputParams {
    pub kind: InputKind,

    #[serde(default)]
    pub can: CanButtonParams,

    #[serde(default)]
    pub gpio: GpioButtonParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The four logical buttons.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Advance,
    Retreat,
    Abort,
    Confirm,
}

/// How the buttons are read.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Can,
    Gpio,
}

#[derive(thiserror::Error, Debug)]
pub enum InputError {
    #[error("Could not read the {0:?} button over the link: {1}")]
    Link(Button, LinkError),

    #[error("Could not set up the GPIO pin {pin} for the {button:?} button: {msg}")]
    GpioSetup { button: Button, pin: u64, msg: String },

    #[error("Could not read the GPIO pin for the {0:?} button: {1}")]
    GpioRead(Button, String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Button {
    /// All buttons in sampling order. Abort is always sampled first.
    pub const ALL: [Button; 4] = [
        Button::Abort,
        Button::Advance,
        Button::Retreat,
        Button::Confirm,
    ];
}

impl Buttons {
    pub fn set(&mut self, button: Button, pressed: bool) {
        match button {
            Button::Advance => self.advance = pressed,
            Button::Retreat => self.retreat = pressed,
            Button::Abort => self.abort = pressed,
            Button::Confirm => self.confirm = pressed,
        }
    }

    pub fn get(&self, button: Button) -> bool {
        match button {
            Button::Advance => self.advance,
            Button::Retreat => self.retreat,
            Button::Abort => self.abort,
            Button::Confirm => self.confirm,
        }
    }

    pub fn any(&self) -> bool {
        self.advance || self.retreat || self.abort || self.confirm
    }
}

impl Default for InputKind {
    fn default() -> Self {
        InputKind::Gpio
    }
}

impl<I: InputSource + ?Sized> InputSource for Box<I> {
    fn sample(&mut self) -> Result<Buttons, InputError> {
        (**self).sample()
    }
}
