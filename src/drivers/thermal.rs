//! Driver for the badge's thermal sensor.
//!
//! The sensor speaks a small command protocol: a three-byte register
//! write to (re)calibrate, and a three-byte measure command followed by a
//! 16-byte frame read. A frame is 128 one-bit samples, packed MSB-first —
//! one sample per display column.

use embedded_hal::i2c::ErrorKind;

use crate::drivers::i2c::I2cController;
use crate::i2c::{Addr, I2cHardware};

/// Bus address the sensor ships strapped to.
pub const DEFAULT_ADDR: Addr = Addr::new(0x2c);

/// Length of one raw sensor frame, in bytes.
pub const FRAME_LEN: usize = 16;

/// One raw sensor frame: 128 one-bit samples, packed MSB-first.
pub type Frame = [u8; FRAME_LEN];

/// Register write that starts a (re)calibration cycle.
const CMD_CALIBRATE: [u8; 3] = [0x2c, 0x26, 0x00];

/// Command that latches a measurement for the next frame read.
const CMD_MEASURE: [u8; 3] = [0x03, 0x00, 0x00];

pub struct ThermalSensor {
    addr: Addr,
}

impl ThermalSensor {
    pub const fn new(addr: Addr) -> Self {
        Self { addr }
    }

    /// Run the sensor's calibration cycle.
    ///
    /// The sensor self-times the cycle; it simply NACKs further commands
    /// until it is ready again, which surfaces from the next operation as
    /// a transfer error.
    pub fn calibrate<H: I2cHardware>(
        &self,
        bus: &mut I2cController<H>,
    ) -> Result<(), ErrorKind> {
        tracing::debug!("calibrating sensor");
        bus.write(self.addr, &CMD_CALIBRATE)
    }

    /// Latch a measurement and read back the resulting frame.
    pub fn read_frame<H: I2cHardware>(
        &self,
        bus: &mut I2cController<H>,
    ) -> Result<Frame, ErrorKind> {
        bus.write(self.addr, &CMD_MEASURE)?;

        let mut frame: Frame = [0; FRAME_LEN];
        let captured = bus.read(self.addr, &mut frame)?;
        // A successful transfer is all-or-nothing; a short capture can
        // only accompany an error return.
        debug_assert_eq!(captured, FRAME_LEN);
        Ok(frame)
    }
}
