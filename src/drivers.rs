//! Drivers for the badge's bus peripherals.

pub mod i2c;
pub mod oled;
pub mod thermal;
