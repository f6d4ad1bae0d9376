//! # Glance MSPM0 support library
//!
//! Hardware support for the Glance sensor badge: a thermal sensor and a
//! 128×64 monochrome OLED sharing one I<sup>2</sup>C bus on a TI
//! MSPM0-class controller.
//!
//! The heart of the crate is the interrupt-driven transfer engine in
//! [`drivers::i2c`]: blocking `write`/`read` calls in the foreground, FIFO
//! refill/drain bursts in the interrupt handler, and a shared status cell
//! between them. Everything hardware-specific sits behind the
//! [`i2c::I2cHardware`] trait, so the whole stack runs against a mock
//! peripheral in tests and against the real register block on the board.
//!
//! On top of the engine sit the two device drivers ([`drivers::thermal`],
//! [`drivers::oled`]) and the badge's mode machine ([`app`]). Board
//! bring-up — clock tree, pinmux, interrupt vector wiring — belongs to the
//! board crate, which is expected to:
//!
//! * place one [`drivers::i2c::I2cBus`] in a `static` per bus,
//! * call [`I2cBus::handle_interrupt`](drivers::i2c::I2cBus::handle_interrupt)
//!   from the bus's interrupt vector, and
//! * hand the same `static` to [`drivers::i2c::I2cController::new`].

#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod drivers;
pub mod i2c;
#[cfg(test)]
pub(crate) mod test_util;

pub use self::{
    app::{Badge, Controls, Mode},
    drivers::i2c::{I2cBus, I2cController},
};
