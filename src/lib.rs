//! piripherals provides drivers for peripherals commonly attached to a
//! Raspberry Pi: the MPR121 capacitive touch controller on I2C, WS281x
//! (NeoPixel) LED strips on SPI, and push buttons on GPIO. Small building
//! blocks for wiring them together are included too: events with an event
//! loop, pollers, interrupt handlers, file watchers and an MPD client.
//!
//! Hardware access goes through the Linux device files (`/dev/i2c-*`,
//! `/dev/gpiochip*` and `/dev/spidev*`), so piripherals requires Raspberry
//! Pi OS or any similar, recent, Linux distribution. The I2C bus can be
//! replaced by an in-memory register map, which is how the drivers are
//! tested without hardware.
//!
//! With the `hal` feature flag enabled, the I2C bus, GPIO inputs and a
//! delay implement the `embedded-hal` v1.0.0 traits.
//!
//! piripherals logs through the `log` facade. Install any logger to see
//! what the background threads are doing.

#![doc(html_root_url = "https://docs.rs/piripherals/0.2.0")]

#[macro_use]
mod macros;

pub mod bus;
pub mod button;
pub mod event;
pub mod gpio;
#[cfg(feature = "hal")]
pub mod hal;
pub mod led;
pub mod mpd;
pub mod mpr121;
pub mod spi;
pub mod util;
