//! GPIO buttons
//!
//! Buttons wired directly to GPIO inputs. On the rig the buttons pull the line low when pressed,
//! so pins are active low by default.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::digital::v2::InputPin;
use linux_embedded_hal::{sysfs_gpio::Direction, SysfsPin};
use serde::Deserialize;
use std::fmt::Debug;

use super::{Button, Buttons, InputError, InputSource};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// GPIO line numbers of each button.
///
/// The defaults are the BeagleBone header pins used on the rig: P8_7 (advance), P8_8 (retreat),
/// P8_9 (confirm) and P8_10 (abort).
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GpioButtonParams {
    pub advance_pin: u64,
    pub retreat_pin: u64,
    pub abort_pin: u64,
    pub confirm_pin: u64,

    /// If true a low line means the button is pressed.
    pub active_low: bool,
}

/// Buttons read from GPIO input pins.
pub struct GpioButtons<P: InputPin> {
    advance: P,
    retreat: P,
    abort: P,
    confirm: P,
    active_low: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for GpioButtonParams {
    fn default() -> Self {
        Self {
            advance_pin: 66,
            retreat_pin: 67,
            abort_pin: 68,
            confirm_pin: 69,
            active_low: true,
        }
    }
}

impl GpioButtonParams {
    fn pin(&self, button: Button) -> u64 {
        match button {
            Button::Advance => self.advance_pin,
            Button::Retreat => self.retreat_pin,
            Button::Abort => self.abort_pin,
            Button::Confirm => self.confirm_pin,
        }
    }
}

impl<P> GpioButtons<P>
where
    P: InputPin,
    P::Error: Debug,
{
    pub fn new(advance: P, retreat: P, abort: P, confirm: P, active_low: bool) -> Self {
        Self {
            advance,
            retreat,
            abort,
            confirm,
            active_low,
        }
    }

    fn pin(&self, button: Button) -> &P {
        match button {
            Button::Advance => &self.advance,
            Button::Retreat => &self.retreat,
            Button::Abort => &self.abort,
            Button::Confirm => &self.confirm,
        }
    }
}

impl GpioButtons<SysfsPin> {
    /// Export and configure the sysfs pins given in the parameters.
    pub fn from_sysfs(params: &GpioButtonParams) -> Result<Self, InputError> {
        let open = |button: Button| -> Result<SysfsPin, InputError> {
            let num = params.pin(button);
            let pin = SysfsPin::new(num);

            pin.export()
                .and_then(|_| pin.set_direction(Direction::In))
                .map_err(|e| InputError::GpioSetup {
                    button,
                    pin: num,
                    msg: e.to_string(),
                })?;

            Ok(pin)
        };

        Ok(Self::new(
            open(Button::Advance)?,
            open(Button::Retreat)?,
            open(Button::Abort)?,
            open(Button::Confirm)?,
            params.active_low,
        ))
    }
}

impl<P> InputSource for GpioButtons<P>
where
    P: InputPin,
    P::Error: Debug,
{
    fn sample(&mut self) -> Result<Buttons, InputError> {
        let mut buttons = Buttons::default();

        for button in Button::ALL.iter() {
            let high = self
                .pin(*button)
                .is_high()
                .map_err(|e| InputError::GpioRead(*button, format!("{:?}", e)))?;

            buttons.set(*button, high != self.active_low);
        }

        Ok(buttons)
    }
}
