// Copyright (c) 2017-2026 quantenschaum <software@louisenhof2.de>
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

use crate::spi::{self, Mode, SlaveSelect, Spi};

use super::{Result, Strip};

/// SPI clock speed in Hz. Three SPI bits make up one 800 kHz WS281x bit.
pub const CLOCK_SPEED: u32 = 2_400_000;

// Low period that latches the data, at least 80 µs at 2.4 MHz
const RESET_BYTES: usize = 30;

const BIT_ONE: u32 = 0b110;
const BIT_ZERO: u32 = 0b100;

/// Order in which a strip expects the color components.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ColorOrder {
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl Default for ColorOrder {
    fn default() -> ColorOrder {
        ColorOrder::Grb
    }
}

impl ColorOrder {
    fn arrange(self, (r, g, b): (u8, u8, u8)) -> [u8; 3] {
        match self {
            ColorOrder::Rgb => [r, g, b],
            ColorOrder::Rbg => [r, b, g],
            ColorOrder::Grb => [g, r, b],
            ColorOrder::Gbr => [g, b, r],
            ColorOrder::Brg => [b, r, g],
            ColorOrder::Bgr => [b, g, r],
        }
    }
}

// Expands a byte to 24 SPI bits, MSB first
fn encode_byte(byte: u8) -> [u8; 3] {
    let bits = (0..8).rev().fold(0u32, |bits, i| {
        (bits << 3)
            | if byte & (1 << i) != 0 {
                BIT_ONE
            } else {
                BIT_ZERO
            }
    });

    [(bits >> 16) as u8, (bits >> 8) as u8, bits as u8]
}

fn scale(component: u8, brightness: u8) -> u8 {
    ((u16::from(component) * (u16::from(brightness) + 1)) >> 8) as u8
}

fn encode(pixels: &[(u8, u8, u8)], brightness: u8, order: ColorOrder, buffer: &mut Vec<u8>) {
    buffer.clear();

    for &pixel in pixels {
        for component in order.arrange(pixel).iter() {
            buffer.extend_from_slice(&encode_byte(scale(*component, brightness)));
        }
    }

    buffer.resize(buffer.len() + RESET_BYTES, 0);
}

/// A WS281x (NeoPixel) strip connected to the MOSI pin of an SPI bus.
///
/// Pixel data is kept in memory until [`show`] sends it to the strip.
///
/// [`show`]: trait.Strip.html#tymethod.show
#[derive(Debug)]
pub struct Ws281x {
    spi: Spi,
    order: ColorOrder,
    pixels: Vec<(u8, u8, u8)>,
    brightness: u8,
    buffer: Vec<u8>,
}

impl Ws281x {
    /// Opens a strip of `count` pixels on `/dev/spidev{bus}.{slave_select}`.
    pub fn new(
        bus: spi::Bus,
        slave_select: SlaveSelect,
        count: usize,
        order: ColorOrder,
    ) -> Result<Ws281x> {
        let spi = Spi::new(bus, slave_select, CLOCK_SPEED, Mode::Mode0)?;

        Ok(Ws281x::with_spi(spi, count, order))
    }

    /// Uses an already configured `Spi`.
    pub fn with_spi(spi: Spi, count: usize, order: ColorOrder) -> Ws281x {
        Ws281x {
            spi,
            order,
            pixels: vec![(0, 0, 0); count],
            brightness: 255,
            buffer: Vec::with_capacity(count * 9 + RESET_BYTES),
        }
    }

    pub fn order(&self) -> ColorOrder {
        self.order
    }

    /// Returns the color of pixel `index` as last set.
    pub fn pixel(&self, index: usize) -> Option<(u8, u8, u8)> {
        self.pixels.get(index).copied()
    }
}

impl Strip for Ws281x {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, rgb: (u8, u8, u8)) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = rgb;
        }
    }

    fn brightness(&self) -> u8 {
        self.brightness
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    fn show(&mut self) -> Result<()> {
        encode(&self.pixels, self.brightness, self.order, &mut self.buffer);
        self.spi.write(&self.buffer)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_expand_to_three_spi_bits_per_bit() {
        assert_eq!(encode_byte(0x00), [0x92, 0x49, 0x24]);
        assert_eq!(encode_byte(0xff), [0xdb, 0x6d, 0xb6]);
        assert_eq!(encode_byte(0x80), [0xd2, 0x49, 0x24]);
    }

    #[test]
    fn brightness_scales_components() {
        assert_eq!(scale(200, 255), 200);
        assert_eq!(scale(255, 127), 127);
        assert_eq!(scale(200, 0), 0);
    }

    #[test]
    fn pixels_are_sent_in_color_order() {
        let mut buffer = Vec::new();
        encode(&[(0xff, 0x00, 0x80)], 255, ColorOrder::Grb, &mut buffer);

        assert_eq!(buffer.len(), 9 + RESET_BYTES);
        assert_eq!(&buffer[0..3], &encode_byte(0x00));
        assert_eq!(&buffer[3..6], &encode_byte(0xff));
        assert_eq!(&buffer[6..9], &encode_byte(0x80));
        assert!(buffer[9..].iter().all(|&b| b == 0));

        assert_eq!(ColorOrder::Bgr.arrange((1, 2, 3)), [3, 2, 1]);
        assert_eq!(ColorOrder::Gbr.arrange((1, 2, 3)), [2, 3, 1]);
    }
}
