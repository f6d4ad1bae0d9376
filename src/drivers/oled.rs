//! Driver for the badge's 128×64 monochrome OLED.
//!
//! The display is page-addressed: each byte of the framebuffer holds
//! eight vertically-stacked pixels of one column, so bit `(x, y)` lives
//! at `buf[(y / 8) * WIDTH + x]`, mask `1 << (y & 7)`. The controller on
//! the glass keeps its own RAM in the same layout, which makes flushing a
//! straight byte stream: packets of one data-control byte plus up to 15
//! framebuffer bytes.
//!
//! The panel's command/init sequence is board bring-up and is not sent
//! from here.

use core::convert::Infallible;

use embedded_graphics::{pixelcolor::BinaryColor, prelude::*, primitives::{PrimitiveStyle, Rectangle}};
use embedded_hal::i2c::ErrorKind;

use crate::drivers::i2c::I2cController;
use crate::drivers::thermal::Frame;
use crate::i2c::{Addr, I2cHardware};

pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 64;

// Every byte is one column-slice of an 8-row page.
const PAGES: usize = HEIGHT / 8;
const BUF_BYTES: usize = WIDTH * PAGES;

/// Bus address the display ships strapped to.
pub const DEFAULT_ADDR: Addr = Addr::new(0x3c);

mod packet {
    /// Control byte marking a packet's payload as display data.
    pub const DATA_CONTROL: u8 = 0x40;
    /// On-wire packet size: the control byte plus the data bytes.
    pub const LEN: usize = 16;
    pub const DATA_BYTES: usize = LEN - 1;
}

/// The whole display's worth of pixels, one bit per pixel, in the
/// display's own page-addressed layout.
pub struct FrameBuffer {
    buf: [u8; BUF_BYTES],
}

impl FrameBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; BUF_BYTES],
        }
    }

    pub fn clear(&mut self) {
        self.buf = [0; BUF_BYTES];
    }

    /// The raw page-addressed bytes, as they go on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    fn set_px(&mut self, x: usize, y: usize, on: bool) {
        if x >= WIDTH || y >= HEIGHT {
            return;
        }
        let idx = (y / 8) * WIDTH + x;
        let mask = 1 << (y & 7);

        if on {
            self.buf[idx] |= mask;
        } else {
            self.buf[idx] &= !mask;
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Dimensions for FrameBuffer {
    fn bounding_box(&self) -> Rectangle {
        Rectangle::new(
            Point { x: 0, y: 0 },
            Size {
                width: WIDTH as u32,
                height: HEIGHT as u32,
            },
        )
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for px in pixels {
            self.set_px(px.0.x as usize, px.0.y as usize, px.1.is_on());
        }
        Ok(())
    }
}

pub struct Oled {
    addr: Addr,
    frame: FrameBuffer,
}

impl Oled {
    pub const fn new(addr: Addr) -> Self {
        Self {
            addr,
            frame: FrameBuffer::new(),
        }
    }

    /// The backing framebuffer, for drawing with `embedded-graphics`.
    pub fn frame_mut(&mut self) -> &mut FrameBuffer {
        &mut self.frame
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Render a sensor frame: its 128 samples map one-to-one onto the 128
    /// columns, a set sample turning its column fully on.
    pub fn render_bitline(&mut self, frame: &Frame) {
        for (i, byte) in frame.iter().enumerate() {
            for bit in 0..8 {
                // Samples are packed MSB-first.
                let x = (i * 8 + bit) as i32;
                let on = byte & (0x80 >> bit) != 0;
                let color = if on { BinaryColor::On } else { BinaryColor::Off };

                Rectangle::new(Point { x, y: 0 }, Size::new(1, HEIGHT as u32))
                    .into_styled(PrimitiveStyle::with_fill(color))
                    .draw(&mut self.frame)
                    .unwrap();
            }
        }
    }

    /// Stream the framebuffer out to the glass.
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self, bus))]
    pub fn flush<H: I2cHardware>(
        &self,
        bus: &mut I2cController<H>,
    ) -> Result<(), ErrorKind> {
        for chunk in self.frame.as_bytes().chunks(packet::DATA_BYTES) {
            let mut pkt: heapless::Vec<u8, { packet::LEN }> = heapless::Vec::new();
            // Capacity is exact; neither push can fail.
            let _ = pkt.push(packet::DATA_CONTROL);
            let _ = pkt.extend_from_slice(chunk);

            bus.write(self.addr, &pkt)?;
        }
        tracing::debug!("framebuffer flushed");
        Ok(())
    }
}
