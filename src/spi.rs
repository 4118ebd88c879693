// Copyright (c) 2017-2019 Rene van der Meer
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

//! Write-only access to an SPI bus through `spidev`.
//!
//! `Spi` is the transport used by [`Ws281x`] to clock out LED data on the
//! MOSI pin. It's a thin wrapper around `/dev/spidevB.S`, and only exposes
//! what an output-only device needs.
//!
//! SPI0 is disabled by default. Enable it through `sudo raspi-config`, or by
//! adding `dtparam=spi=on` to `/boot/config.txt`, and reboot.
//!
//! [`Ws281x`]: ../led/struct.Ws281x.html

use std::error;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::result;

mod ioctl;

/// Errors that can occur when accessing an SPI bus.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(io::Error),
    /// The specified number of bits per word is not supported.
    ///
    /// The Raspberry Pi only supports 8 bit words.
    BitsPerWordNotSupported(u8),
    /// The specified mode is not supported.
    ModeNotSupported(Mode),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
            Error::BitsPerWordNotSupported(bits_per_word) => {
                write!(f, "Bits per word value not supported: {}", bits_per_word)
            }
            Error::ModeNotSupported(mode) => write!(f, "Mode value not supported: {:?}", mode),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Result type returned from methods that can have `spi::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// SPI buses.
///
/// The number of available buses depends on the model and on the overlays
/// enabled in `/boot/config.txt`.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Bus {
    Spi0 = 0,
    Spi1 = 1,
    Spi2 = 2,
    Spi3 = 3,
    Spi4 = 4,
    Spi5 = 5,
    Spi6 = 6,
}

/// Slave Select pins.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SlaveSelect {
    Ss0 = 0,
    Ss1 = 1,
    Ss2 = 2,
}

/// SPI modes.
///
/// * Mode0: CPOL 0, CPHA 0
/// * Mode1: CPOL 0, CPHA 1
/// * Mode2: CPOL 1, CPHA 0
/// * Mode3: CPOL 1, CPHA 1
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Mode {
    Mode0 = 0,
    Mode1 = 1,
    Mode2 = 2,
    Mode3 = 3,
}

/// Provides write access to an SPI slave.
#[derive(Debug)]
pub struct Spi {
    spidev: File,
}

impl Spi {
    /// Opens `/dev/spidev{bus}.{slave_select}`.
    ///
    /// `clock_speed` is the maximum clock speed in Hz. The driver picks the
    /// closest frequency it can generate.
    pub fn new(bus: Bus, slave_select: SlaveSelect, clock_speed: u32, mode: Mode) -> Result<Spi> {
        let spidev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/spidev{}.{}", bus as u8, slave_select as u8))?;

        let spi = Spi { spidev };

        spi.set_mode(mode)?;
        spi.set_clock_speed(clock_speed)?;
        spi.set_bits_per_word(8)?;

        log::debug!(
            "Opened /dev/spidev{}.{} at {} Hz",
            bus as u8,
            slave_select as u8,
            clock_speed
        );

        Ok(spi)
    }

    /// Gets the clock speed in Hz.
    pub fn clock_speed(&self) -> Result<u32> {
        Ok(ioctl::clock_speed(self.spidev.as_raw_fd())?)
    }

    /// Sets the maximum clock speed in Hz.
    pub fn set_clock_speed(&self, clock_speed: u32) -> Result<()> {
        ioctl::set_clock_speed(self.spidev.as_raw_fd(), clock_speed)?;

        Ok(())
    }

    /// Gets the bits per word.
    pub fn bits_per_word(&self) -> Result<u8> {
        Ok(ioctl::bits_per_word(self.spidev.as_raw_fd())?)
    }

    /// Sets the number of bits per word. Only 8 is supported.
    pub fn set_bits_per_word(&self, bits_per_word: u8) -> Result<()> {
        if bits_per_word != 8 {
            return Err(Error::BitsPerWordNotSupported(bits_per_word));
        }

        match ioctl::set_bits_per_word(self.spidev.as_raw_fd(), bits_per_word) {
            Ok(_) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::InvalidInput => {
                Err(Error::BitsPerWordNotSupported(bits_per_word))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Gets the mode.
    pub fn mode(&self) -> Result<Mode> {
        let mode = ioctl::mode(self.spidev.as_raw_fd())?;

        Ok(match mode & ioctl::MODE_CPOL_CPHA {
            0x01 => Mode::Mode1,
            0x02 => Mode::Mode2,
            0x03 => Mode::Mode3,
            _ => Mode::Mode0,
        })
    }

    /// Sets the clock polarity and phase.
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        let current = ioctl::mode(self.spidev.as_raw_fd())?;

        // Only replace the CPOL/CPHA bits
        let new_mode = (current & !ioctl::MODE_CPOL_CPHA) | (mode as u8);

        match ioctl::set_mode(self.spidev.as_raw_fd(), new_mode) {
            Ok(_) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::InvalidInput => {
                Err(Error::ModeNotSupported(mode))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Sends the outgoing data contained in `buffer` to the slave device.
    ///
    /// Slave Select is active for the duration of the write. Any data
    /// received on the MISO line is ignored.
    ///
    /// Returns how many bytes were written.
    pub fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        Ok(self.spidev.write(buffer)?)
    }
}
