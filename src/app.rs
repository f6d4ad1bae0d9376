//! The badge's application mode machine.
//!
//! Three modes, stepped by [`Badge::tick`]: `Off` until the standby
//! button wakes the badge, one `Calibrating` pass, then `Reading` frames
//! and painting them until a button asks for standby or another
//! calibration. Button sampling is board business, behind [`Controls`].
//!
//! `tick` never retries: a failed bus operation surfaces as an error with
//! the mode unchanged, and the caller decides whether to halt, retry, or
//! power down the rail.

use embedded_hal::i2c::ErrorKind;

use crate::drivers::{
    i2c::I2cController,
    oled::{self, Oled},
    thermal::{self, ThermalSensor},
};
use crate::i2c::I2cHardware;

/// Board inputs the mode machine samples.
pub trait Controls {
    /// `true` while the standby button is held.
    fn standby_pressed(&self) -> bool;

    /// `true` while the recalibrate button is held.
    fn recalibrate_pressed(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Waiting for the standby button; the bus is left alone.
    Off,
    /// Running the sensor's calibration cycle.
    Calibrating,
    /// Acquiring frames and painting them to the display.
    Reading,
}

pub struct Badge<C, H: I2cHardware> {
    controls: C,
    bus: I2cController<H>,
    sensor: ThermalSensor,
    oled: Oled,
    mode: Mode,
}

impl<C: Controls, H: I2cHardware> Badge<C, H> {
    pub fn new(controls: C, bus: I2cController<H>) -> Self {
        Self {
            controls,
            bus,
            sensor: ThermalSensor::new(thermal::DEFAULT_ADDR),
            oled: Oled::new(oled::DEFAULT_ADDR),
            mode: Mode::Off,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Advance the mode machine by one step.
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self), fields(mode = ?self.mode))]
    pub fn tick(&mut self) -> Result<(), ErrorKind> {
        let next = match self.mode {
            Mode::Off => {
                if self.controls.standby_pressed() {
                    Mode::Calibrating
                } else {
                    Mode::Off
                }
            }
            Mode::Calibrating => {
                self.sensor.calibrate(&mut self.bus)?;
                Mode::Reading
            }
            Mode::Reading => {
                let frame = self.sensor.read_frame(&mut self.bus)?;
                self.oled.render_bitline(&frame);
                self.oled.flush(&mut self.bus)?;

                if self.controls.standby_pressed() {
                    Mode::Off
                } else if self.controls.recalibrate_pressed() {
                    Mode::Calibrating
                } else {
                    Mode::Reading
                }
            }
        };

        if next != self.mode {
            tracing::debug!(?next, "mode change");
        }
        self.mode = next;
        Ok(())
    }
}
