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

//! Interrupt-capable GPIO inputs.
//!
//! `InputPin` requests a single line from the Raspberry Pi's pin controller
//! through the GPIO character device (`/dev/gpiochipN`, uAPI v2), with the
//! built-in pull-up or pull-down resistor and edge detection configured in a
//! single request. Pins are addressed by their BCM GPIO numbers.
//!
//! Components that react to interrupts, like [`IrqHandler`] and
//! [`BoundButton`], don't use `InputPin` directly. They accept anything that
//! implements [`InterruptInput`], which makes them testable without hardware.
//!
//! ## Permission denied
//!
//! Access to `/dev/gpiochipN` requires membership of the `gpio` group on
//! Raspberry Pi OS. If you get a [`PermissionDenied`] error, add your user
//! with `sudo adduser $USER gpio` and log in again.
//!
//! [`IrqHandler`]: ../util/struct.IrqHandler.html
//! [`BoundButton`]: ../button/struct.BoundButton.html
//! [`InterruptInput`]: trait.InterruptInput.html
//! [`PermissionDenied`]: enum.Error.html#variant.PermissionDenied

use std::error;
use std::fmt;
use std::io;
use std::ops::Not;
use std::os::unix::io::AsRawFd;
use std::result;
use std::time::Duration;

#[cfg(feature = "hal")]
mod hal;
mod ioctl;

pub use self::ioctl::Event;

// Lines beyond the 40-pin header aren't exposed
const MAX_PIN: u8 = 27;

/// Errors that can occur when accessing the GPIO peripheral.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(io::Error),
    /// Permission denied when opening `/dev/gpiochipN` for read/write access.
    ///
    /// More information on possible causes for this error can be found [here].
    ///
    /// [here]: index.html#permission-denied
    PermissionDenied(String),
    /// Pin is not available.
    ///
    /// Only the BCM GPIO numbers 0 to 27, which are broken out on the
    /// 40-pin header, can be requested.
    PinNotAvailable(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
            Error::PermissionDenied(ref path) => write!(f, "Permission denied: {}", path),
            Error::PinNotAvailable(pin) => write!(f, "Pin {} is not available", pin),
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

/// Result type returned from methods that can have `gpio::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Pin logic levels.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl From<bool> for Level {
    fn from(e: bool) -> Level {
        if e {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<u8> for Level {
    fn from(value: u8) -> Self {
        if value == 0 {
            Level::Low
        } else {
            Level::High
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Level::Low => write!(f, "Low"),
            Level::High => write!(f, "High"),
        }
    }
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Built-in pull-up/pull-down resistor states.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Bias {
    Off,
    PullDown,
    PullUp,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Bias::Off => write!(f, "Off"),
            Bias::PullDown => write!(f, "PullDown"),
            Bias::PullUp => write!(f, "PullUp"),
        }
    }
}

/// Interrupt trigger conditions.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Trigger {
    Disabled = 0,
    RisingEdge = 1,
    FallingEdge = 2,
    Both = 3,
}

impl Trigger {
    /// Returns the level a line rests at between edges of this kind.
    ///
    /// A falling edge leaves a line that idles high, a rising edge one that
    /// idles low.
    pub fn inactive_level(self) -> Level {
        match self {
            Trigger::RisingEdge => Level::Low,
            _ => Level::High,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Trigger::Disabled => write!(f, "Disabled"),
            Trigger::RisingEdge => write!(f, "RisingEdge"),
            Trigger::FallingEdge => write!(f, "FallingEdge"),
            Trigger::Both => write!(f, "Both"),
        }
    }
}

/// An input that can block until an edge is detected.
///
/// Implemented by [`InputPin`]. Test code can provide its own
/// implementation to drive interrupt handlers and buttons without hardware.
///
/// [`InputPin`]: struct.InputPin.html
pub trait InterruptInput: Send {
    /// Blocks until an edge is detected, or `timeout` expires.
    ///
    /// Returns `true` when an edge was detected. `None` waits indefinitely.
    fn wait_for_edge(&mut self, timeout: Option<Duration>) -> Result<bool>;

    /// Reads the current logic level.
    fn level(&mut self) -> Result<Level>;
}

/// GPIO pin configured as input, with optional edge detection.
///
/// The line is released when `InputPin` goes out of scope.
#[derive(Debug)]
pub struct InputPin {
    pin: u8,
    bias: Bias,
    trigger: Trigger,
    request: ioctl::LineRequest,
}

impl InputPin {
    /// Requests `pin` as an input.
    ///
    /// `trigger` selects the edges that are reported by [`poll_interrupt`].
    /// With `Trigger::Disabled`, no events are queued.
    ///
    /// [`poll_interrupt`]: #method.poll_interrupt
    pub fn new(pin: u8, bias: Bias, trigger: Trigger) -> Result<InputPin> {
        if pin > MAX_PIN {
            return Err(Error::PinNotAvailable(pin));
        }

        let cdev = ioctl::find_gpiochip()?;
        let request = ioctl::LineRequest::new(
            cdev.as_raw_fd(),
            u32::from(pin),
            ioctl::input_flags(bias, trigger),
        )?;

        log::debug!("Requested GPIO {} (bias {}, trigger {})", pin, bias, trigger);

        Ok(InputPin {
            pin,
            bias,
            trigger,
            request,
        })
    }

    /// Returns the BCM GPIO pin number.
    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn bias(&self) -> Bias {
        self.bias
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Reads the pin's logic level.
    pub fn read(&self) -> Result<Level> {
        self.request.level()
    }

    /// Returns `true` if the pin's logic level is high.
    pub fn is_high(&self) -> Result<bool> {
        Ok(self.read()? == Level::High)
    }

    /// Returns `true` if the pin's logic level is low.
    pub fn is_low(&self) -> Result<bool> {
        Ok(self.read()? == Level::Low)
    }

    /// Blocks until an edge is detected, or `timeout` expires.
    ///
    /// Returns `Ok(None)` on timeout. Setting `timeout` to `None` blocks
    /// until an edge arrives.
    pub fn poll_interrupt(&mut self, timeout: Option<Duration>) -> Result<Option<Event>> {
        if self.request.wait(timeout)? {
            Ok(Some(self.request.read_event()?))
        } else {
            Ok(None)
        }
    }

    /// Discards all queued edge events.
    pub fn clear_interrupts(&mut self) -> Result<()> {
        while self.request.wait(Some(Duration::from_millis(0)))? {
            self.request.read_event()?;
        }

        Ok(())
    }
}

impl InterruptInput for InputPin {
    fn wait_for_edge(&mut self, timeout: Option<Duration>) -> Result<bool> {
        Ok(self.poll_interrupt(timeout)?.is_some())
    }

    fn level(&mut self) -> Result<Level> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_conversions() {
        assert_eq!(Level::from(true), Level::High);
        assert_eq!(Level::from(0u8), Level::Low);
        assert_eq!(Level::from(4u8), Level::High);
        assert_eq!(!Level::Low, Level::High);
    }

    #[test]
    fn inactive_level() {
        assert_eq!(Trigger::FallingEdge.inactive_level(), Level::High);
        assert_eq!(Trigger::RisingEdge.inactive_level(), Level::Low);
    }

    #[test]
    fn unavailable_pin() {
        assert!(matches!(
            InputPin::new(40, Bias::PullUp, Trigger::Both),
            Err(Error::PinNotAvailable(40))
        ));
    }
}
