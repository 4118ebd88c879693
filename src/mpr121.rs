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

//! Interface for the MPR121 capacitive touch sensor and GPIO controller.
//!
//! The MPR121 measures the capacitance of 12 electrodes, and reports
//! whether they're touched. Channel 12 is a virtual electrode, made up of
//! several physical ones, used for proximity detection. Electrodes 4 to 11
//! can be used as GPIO pins or LED drivers instead.
//!
//! Read the datasheet to make sense of the configuration options. Most of
//! the methods map directly to one or a few registers.
//!
//! ## Wiring
//!
//! | MPR121 | Raspberry Pi       |
//! |--------|--------------------|
//! | 3.3V   | 3.3V (physical 1)  |
//! | GND    | GND (physical 6)   |
//! | SDA    | BCM 2 (physical 3) |
//! | SCL    | BCM 3 (physical 5) |
//! | IRQ    | BCM 4 (physical 7) |
//!
//! Connecting the IRQ line is optional, but avoids constant bus traffic
//! from polling. Multiple sensors can share a bus when their address pins
//! are wired to select different addresses.
//!
//! I2C is disabled by default. Enable it through `sudo raspi-config`, or by
//! adding `dtparam=i2c_arm=on` to `/boot/config.txt`, and reboot.
//!
//! ## Examples
//!
//! ```no_run
//! use piripherals::bus::Bus;
//! use piripherals::mpr121::{Config, Handling, Mpr121};
//!
//! # fn main() -> piripherals::mpr121::Result<()> {
//! let bus = Bus::new(1)?;
//! let mpr = Mpr121::with_config(
//!     &bus,
//!     Config {
//!         handling: Handling::Irq(4),
//!         ..Default::default()
//!     },
//! )?;
//!
//! for channel in 0..12 {
//!     mpr.on_touch(channel, |touched, channel| println!("{} {}", channel, touched))?;
//! }
//! # Ok(())
//! # }
//! ```

use std::error;
use std::fmt;
use std::io;
use std::result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::bus::{self, Bus, Device};
use crate::gpio::{self, Bias, Trigger};
use crate::util::{self, guarded, IrqHandler, Poller, POLL_DELAY};

mod dump;

/// Default slave address, with the ADDR pin connected to ground.
pub const ADDRESS: u16 = 0x5a;

/// Number of channels, 12 electrodes and the proximity channel.
pub const CHANNELS: u8 = 13;

/// The proximity channel.
pub const PROX_CHANNEL: u8 = 12;

const REG_ETS: u8 = 0x00; // touch status
const REG_OOR: u8 = 0x02; // out of range status
const REG_EFD: u8 = 0x04; // electrode filtered data
const REG_EBL: u8 = 0x1e; // baseline value
const REG_MHD: u8 = 0x2b; // max half delta rising
const REG_MHDX: u8 = 0x36; // max half delta rising, proximity
const REG_TTH: u8 = 0x41; // touch threshold 0
const REG_RTH: u8 = 0x42; // release threshold 0
const REG_DEB: u8 = 0x5b; // debounce
const REG_AFE1: u8 = 0x5c; // filter and global charge current/time
const REG_ECR: u8 = 0x5e; // electrode configuration
const REG_CDC: u8 = 0x5f; // charge current 0
const REG_CDT: u8 = 0x6c; // charge time 0/1
const REG_GPIO_CTL0: u8 = 0x73;
const REG_GPIO_CTL1: u8 = 0x74;
const REG_GPIO_DAT: u8 = 0x75;
const REG_GPIO_DIR: u8 = 0x76;
const REG_GPIO_EN: u8 = 0x77;
const REG_GPIO_SET: u8 = 0x78;
const REG_GPIO_CLR: u8 = 0x79;
const REG_GPIO_TOG: u8 = 0x7a;
const REG_ACNF_C0: u8 = 0x7b; // auto config control 0/1
const REG_ACNF_USL: u8 = 0x7d; // upside limit
const REG_ACNF_LSL: u8 = 0x7e; // low side limit
const REG_ACNF_TL: u8 = 0x7f; // target level
const REG_SRESET: u8 = 0x80;

const SRESET_MAGIC: u8 = 0x63;

const STATUS_MASK: u16 = 0x1fff;
const OVERCURRENT: u16 = 1 << 15;
const AUTO_CONFIG_FAILED: u16 = 1 << 15;
const AUTO_RECONFIG_FAILED: u16 = 1 << 14;

/// Errors that can occur when accessing the MPR121.
#[derive(Debug)]
pub enum Error {
    /// I2C bus error.
    Bus(bus::Error),
    /// GPIO error, while setting up the IRQ line.
    Gpio(gpio::Error),
    /// I/O error.
    Io(io::Error),
    /// The sensor reports an overcurrent on the REXT pin.
    Overcurrent,
    /// Electrodes are out of range. Contains the status bits per channel.
    OutOfRange(u16),
    /// Auto configuration failed.
    AutoConfigFailed,
    /// Auto reconfiguration failed.
    AutoReconfigFailed,
    /// The channel doesn't exist, or doesn't support the operation.
    InvalidChannel(u8),
    /// A configuration value exceeds its maximum.
    InvalidValue {
        name: &'static str,
        value: u8,
        max: u8,
    },
    /// Thread panicked.
    ThreadPanic,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Bus(ref err) => write!(f, "Bus error: {}", err),
            Error::Gpio(ref err) => write!(f, "GPIO error: {}", err),
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
            Error::Overcurrent => write!(f, "Overcurrent detected"),
            Error::OutOfRange(bits) => write!(f, "Electrodes out of range: {:013b}", bits),
            Error::AutoConfigFailed => write!(f, "Auto configuration failed"),
            Error::AutoReconfigFailed => write!(f, "Auto reconfiguration failed"),
            Error::InvalidChannel(channel) => write!(f, "Invalid channel: {}", channel),
            Error::InvalidValue { name, value, max } => {
                write!(f, "Invalid {}: {} (max. {})", name, value, max)
            }
            Error::ThreadPanic => write!(f, "Thread panicked"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Bus(ref err) => Some(err),
            Error::Gpio(ref err) => Some(err),
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<bus::Error> for Error {
    fn from(err: bus::Error) -> Error {
        Error::Bus(err)
    }
}

impl From<gpio::Error> for Error {
    fn from(err: gpio::Error) -> Error {
        Error::Gpio(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<util::Error> for Error {
    fn from(err: util::Error) -> Error {
        match err {
            util::Error::Gpio(err) => Error::Gpio(err),
            util::Error::Io(err) => Error::Io(err),
            util::Error::ThreadPanic => Error::ThreadPanic,
        }
    }
}

/// Result type returned from methods that can have `mpr121::Error`s.
pub type Result<T> = result::Result<T, Error>;

fn check(name: &'static str, value: u8, max: u8) -> Result<u8> {
    if value > max {
        Err(Error::InvalidValue { name, value, max })
    } else {
        Ok(value)
    }
}

/// Baseline tracking and initialization when entering run mode.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum CalibrationLock {
    /// Baseline tracking enabled.
    Tracking = 0,
    /// Baseline tracking disabled.
    Disabled = 1,
    /// Tracking enabled, the 5 MSBs of the baseline are loaded from the first measurement.
    TrackingInit5Msb = 2,
    /// Tracking enabled, the baseline is loaded from the first measurement.
    TrackingInit = 3,
}

impl Default for CalibrationLock {
    fn default() -> CalibrationLock {
        CalibrationLock::TrackingInit
    }
}

/// Electrodes combined for proximity detection.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Proximity {
    Disabled = 0,
    /// Electrodes 0 and 1.
    Electrodes0To1 = 1,
    /// Electrodes 0 to 3.
    Electrodes0To3 = 2,
    /// Electrodes 0 to 11.
    Electrodes0To11 = 3,
}

impl Default for Proximity {
    fn default() -> Proximity {
        Proximity::Disabled
    }
}

/// Situation a [`BaselineFilter`] applies to.
///
/// [`BaselineFilter`]: struct.BaselineFilter.html
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Rft {
    /// Electrode data above the baseline.
    Rising = 0,
    /// Electrode data below the baseline.
    Falling = 1,
    /// Electrode is touched.
    Touched = 2,
}

/// Baseline filter settings.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct BaselineFilter {
    /// Max half delta, 0-63. Largest variation passing the filter. Unused for `Rft::Touched`.
    pub mhd: u8,
    /// Noise half delta, 0-63. Increment when non-noise drift is detected.
    pub nhd: u8,
    /// Noise count limit. Samples above `mhd` before drift is considered non-noise.
    pub ncl: u8,
    /// Filter delay count limit. Larger values slow the filter down.
    pub fdl: u8,
}

/// Global charge, sampling and filter settings.
///
/// The effective measurement period is `sfi * esi`.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Filter {
    /// Charge-discharge current, 0-63 µA.
    pub cdc: u8,
    /// Charge-discharge time, 0-7, `0.5 * 2^(cdt - 1)` µs.
    pub cdt: u8,
    /// First filter iterations, 0-3 for 6, 10, 18 or 34 samples.
    pub ffi: u8,
    /// Second filter iterations, 0-3 for 4, 6, 10 or 18 samples.
    pub sfi: u8,
    /// Electrode sample interval, 0-7, `2^esi` ms.
    pub esi: u8,
}

impl Default for Filter {
    fn default() -> Filter {
        Filter {
            cdc: 16,
            cdt: 1,
            ffi: 0,
            sfi: 0,
            esi: 4,
        }
    }
}

/// Automatic charge current and time configuration.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct AutoConfig {
    /// Enable auto configuration.
    pub ace: bool,
    /// Enable auto reconfiguration.
    pub are: bool,
    /// Baseline value adjustment, 0-3: keep, zero, 5 MSBs, measured value.
    pub bva: u8,
    /// Retries, 0-3 for 0, 2, 4 or 8.
    pub retry: u8,
    /// Samples during the search, 0-3, as `Filter::ffi`.
    pub afes: u8,
    /// Skip the charge time search.
    pub scts: bool,
    /// Interrupt on auto configuration failure.
    pub acfie: bool,
    /// Interrupt on auto reconfiguration failure.
    pub arfie: bool,
    /// Interrupt on out of range.
    pub oorie: bool,
    /// Upside limit.
    pub usl: u8,
    /// Low side limit.
    pub lsl: u8,
    /// Target level.
    pub tl: u8,
}

impl Default for AutoConfig {
    fn default() -> AutoConfig {
        AutoConfig {
            ace: true,
            are: true,
            bva: 3,
            retry: 2,
            afes: 1,
            scts: false,
            acfie: true,
            arfie: true,
            oorie: true,
            usl: 200,
            lsl: 130,
            tl: 180,
        }
    }
}

/// Mode of an electrode used as GPIO pin.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum GpioMode {
    /// Output, CMOS push-pull.
    Cmos,
    /// Output, open drain, low side only.
    LowSide,
    /// Output, open drain, high side only. Used to drive LEDs.
    HighSide,
    /// Input.
    Input,
    /// Input with pull-down.
    PullDown,
    /// Input with pull-up.
    PullUp,
}

impl GpioMode {
    // CTL0 and CTL1 bits
    fn bits(self) -> u8 {
        match self {
            GpioMode::Cmos | GpioMode::Input => 0b00,
            GpioMode::LowSide | GpioMode::PullDown => 0b10,
            GpioMode::HighSide | GpioMode::PullUp => 0b11,
        }
    }
}

/// Settings applied by [`setup`].
///
/// [`setup`]: struct.Mpr121.html#method.setup
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Setup {
    /// Soft reset first.
    pub reset: bool,
    /// Number of electrodes to enable, 0-12.
    pub channels: u8,
    pub prox: Proximity,
    /// Touch threshold of the electrodes. The proximity channel uses a quarter of it.
    pub threshold: u8,
    /// Debounce count, 0-7.
    pub debounce: u8,
    /// Enable charge auto configuration.
    pub auto_config: bool,
}

impl Default for Setup {
    fn default() -> Setup {
        Setup {
            reset: true,
            channels: 12,
            prox: Proximity::Disabled,
            threshold: 50,
            debounce: 2,
            auto_config: true,
        }
    }
}

/// How touch state changes are picked up.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Handling {
    /// [`update_touch_state`] has to be called explicitly.
    ///
    /// [`update_touch_state`]: struct.Mpr121.html#method.update_touch_state
    Manual,
    /// Poll the touch state at a fixed interval.
    Poll(Duration),
    /// Read the touch state while the IRQ line on this BCM GPIO pin is low.
    Irq(u8),
}

impl Default for Handling {
    fn default() -> Handling {
        Handling::Poll(POLL_DELAY)
    }
}

/// Configuration used by [`Mpr121::with_config`].
///
/// [`Mpr121::with_config`]: struct.Mpr121.html#method.with_config
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Config {
    pub address: u16,
    pub handling: Handling,
    /// Configure the sensor. `None` leaves it in its power-on state.
    pub setup: Option<Setup>,
    /// Soft reset, when `setup` is `None`.
    pub reset: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            address: ADDRESS,
            handling: Handling::default(),
            setup: Some(Setup::default()),
            reset: true,
        }
    }
}

type TouchHandler = Arc<dyn Fn(bool, u8) + Send + Sync>;

struct TouchState {
    touched: Mutex<u16>,
    handlers: Mutex<Vec<Option<TouchHandler>>>,
}

impl TouchState {
    fn touched(&self) -> MutexGuard<'_, u16> {
        self.touched.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> MutexGuard<'_, Vec<Option<TouchHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
enum Background {
    Poller(Poller),
    Irq(IrqHandler),
}

/// MPR121 capacitive touch sensor.
///
/// A background poller or IRQ handler, as set up by [`with_config`], stops
/// when `Mpr121` goes out of scope.
///
/// [`with_config`]: #method.with_config
pub struct Mpr121 {
    device: Device,
    state: Arc<TouchState>,
    background: Option<Background>,
}

impl fmt::Debug for Mpr121 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mpr121")
            .field("address", &self.device.address())
            .field("touched", &*self.state.touched())
            .field("background", &self.background)
            .finish()
    }
}

impl Mpr121 {
    /// Constructs a new `Mpr121` for `device`, without any bus traffic.
    ///
    /// Call [`update_touch_state`] to pick up touch changes.
    ///
    /// [`update_touch_state`]: #method.update_touch_state
    pub fn new(device: Device) -> Mpr121 {
        Mpr121 {
            device,
            state: Arc::new(TouchState {
                touched: Mutex::new(0),
                handlers: Mutex::new(vec![None; CHANNELS as usize]),
            }),
            background: None,
        }
    }

    /// Constructs a new `Mpr121` on `bus`, configures it, and starts
    /// handling touch changes as set in `config`.
    pub fn with_config(bus: &Bus, config: Config) -> Result<Mpr121> {
        let mut mpr = Mpr121::new(bus.device(config.address));

        if let Some(setup) = config.setup {
            mpr.setup(setup)?;
        } else if config.reset {
            mpr.reset()?;
        }

        let updater = mpr.detached();
        mpr.background = match config.handling {
            Handling::Manual => None,
            Handling::Poll(delay) => Some(Background::Poller(Poller::new(
                move || updater.update_touch_state(),
                delay,
            )?)),
            Handling::Irq(pin) => Some(Background::Irq(IrqHandler::new(
                pin,
                move || updater.update_touch_state(),
                Trigger::FallingEdge,
                Bias::PullUp,
            )?)),
        };

        Ok(mpr)
    }

    // Shares device and touch state, but not the background thread
    fn detached(&self) -> Mpr121 {
        Mpr121 {
            device: self.device.clone(),
            state: self.state.clone(),
            background: None,
        }
    }

    /// Returns the underlying device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Soft reset. All registers return to their power-on values.
    pub fn reset(&self) -> Result<()> {
        self.device.write_byte(REG_SRESET, SRESET_MAGIC)?;

        Ok(())
    }

    /// Starts or stops measurement.
    ///
    /// `touch` enables electrodes 0 to `touch - 1`. With `touch` 0 and
    /// proximity disabled, the sensor is in stop mode. Most settings can only
    /// be changed in stop mode.
    pub fn configure(&self, cl: CalibrationLock, prox: Proximity, touch: u8) -> Result<()> {
        let touch = check("touch", touch, 12)?;

        self.device
            .write_byte(REG_ECR, (cl as u8) << 6 | (prox as u8) << 4 | touch)?;

        Ok(())
    }

    /// Returns the touch status bits. Bit `n` is set if channel `n` is touched.
    ///
    /// With `check` set, the overcurrent flag and the out of range status
    /// are checked as well.
    pub fn touched(&self, check: bool) -> Result<u16> {
        let word = self.device.read_word(REG_ETS)?;

        if check {
            if word & OVERCURRENT != 0 {
                return Err(Error::Overcurrent);
            }

            let oor = self.out_of_range(true)?;
            if oor != 0 {
                return Err(Error::OutOfRange(oor));
            }
        }

        Ok(word & STATUS_MASK)
    }

    /// Returns the out of range status bits.
    ///
    /// With `check` set, failed auto (re)configuration returns an error.
    pub fn out_of_range(&self, check: bool) -> Result<u16> {
        let word = self.device.read_word(REG_OOR)?;

        if check {
            if word & AUTO_CONFIG_FAILED != 0 {
                return Err(Error::AutoConfigFailed);
            }

            if word & AUTO_RECONFIG_FAILED != 0 {
                return Err(Error::AutoReconfigFailed);
            }
        }

        Ok(word & STATUS_MASK)
    }

    /// Returns the filtered 10-bit measurement of every channel.
    pub fn electrode_data(&self) -> Result<[u16; CHANNELS as usize]> {
        let bytes = self.device.read_block(REG_EFD, 2 * CHANNELS as usize)?;

        let mut data = [0u16; CHANNELS as usize];
        for (value, pair) in data.iter_mut().zip(bytes.chunks(2)) {
            *value = u16::from_le_bytes([pair[0], pair[1]]);
        }

        Ok(data)
    }

    /// Returns the 10-bit baseline of every channel.
    ///
    /// The sensor stores the 8 MSBs, so the 2 LSBs are always 0.
    pub fn baseline(&self) -> Result<[u16; CHANNELS as usize]> {
        let bytes = self.device.read_block(REG_EBL, CHANNELS as usize)?;

        let mut data = [0u16; CHANNELS as usize];
        for (value, byte) in data.iter_mut().zip(bytes) {
            *value = u16::from(byte) << 2;
        }

        Ok(data)
    }

    /// Configures baseline tracking of the electrodes, or with `prox` set, of the proximity channel.
    pub fn set_baseline(&self, rft: Rft, filter: BaselineFilter, prox: bool) -> Result<()> {
        let mhd = check("mhd", filter.mhd, 63)?;
        let nhd = check("nhd", filter.nhd, 63)?;

        let reg = (if prox { REG_MHDX } else { REG_MHD }) + 4 * rft as u8;

        match rft {
            Rft::Touched => self.device.write_block(reg, &[nhd, filter.ncl, filter.fdl])?,
            _ => self
                .device
                .write_block(reg, &[mhd, nhd, filter.ncl, filter.fdl])?,
        }

        Ok(())
    }

    /// Sets touch and release thresholds.
    ///
    /// `release` defaults to 60% of `touch`. Without a `channel`, the
    /// thresholds are applied to all channels.
    pub fn threshold(&self, touch: u8, release: Option<u8>, channel: Option<u8>) -> Result<()> {
        let release = release.unwrap_or((u16::from(touch) * 6 / 10) as u8);

        let channels = match channel {
            Some(channel) if channel >= CHANNELS => return Err(Error::InvalidChannel(channel)),
            Some(channel) => channel..channel + 1,
            None => 0..CHANNELS,
        };

        for channel in channels {
            self.device.write_byte(REG_TTH + 2 * channel, touch)?;
            self.device.write_byte(REG_RTH + 2 * channel, release)?;
        }

        Ok(())
    }

    /// Sets the number of consecutive samples required to detect a touch and a release.
    ///
    /// `release` defaults to `touch`.
    pub fn debounce(&self, touch: u8, release: Option<u8>) -> Result<()> {
        let touch = check("touch debounce", touch, 7)?;
        let release = check("release debounce", release.unwrap_or(touch), 7)?;

        self.device.write_byte(REG_DEB, release << 4 | touch)?;

        Ok(())
    }

    /// Sets the global charge, sampling and filter settings.
    pub fn filter(&self, filter: Filter) -> Result<()> {
        let cdc = check("cdc", filter.cdc, 63)?;
        let cdt = check("cdt", filter.cdt, 7)?;
        let ffi = check("ffi", filter.ffi, 3)?;
        let sfi = check("sfi", filter.sfi, 3)?;
        let esi = check("esi", filter.esi, 7)?;

        let lb = ffi << 6 | cdc;
        let hb = cdt << 5 | sfi << 3 | esi;
        self.device
            .write_word(REG_AFE1, u16::from(hb) << 8 | u16::from(lb))?;

        Ok(())
    }

    /// Sets charge current and time of a single channel.
    ///
    /// Auto configuration overrides these values.
    pub fn charge(&self, channel: u8, cdc: u8, cdt: u8) -> Result<()> {
        if channel >= CHANNELS {
            return Err(Error::InvalidChannel(channel));
        }

        let cdc = check("cdc", cdc, 63)?;
        let cdt = check("cdt", cdt, 7)?;

        self.device.write_byte(REG_CDC + channel, cdc)?;

        // Two channels share a register, the odd one in the high nibble
        let shift = 4 * (channel % 2);
        self.device
            .update_byte(REG_CDT + channel / 2, 0x0f << shift, cdt << shift)?;

        Ok(())
    }

    /// Configures automatic charge current and time search.
    pub fn auto_config(&self, config: AutoConfig) -> Result<()> {
        let bva = check("bva", config.bva, 3)?;
        let retry = check("retry", config.retry, 3)?;
        let afes = check("afes", config.afes, 3)?;

        let lb = afes << 6 | retry << 4 | bva << 2 | (config.are as u8) << 1 | config.ace as u8;
        let hb = (config.scts as u8) << 7
            | (config.oorie as u8) << 2
            | (config.arfie as u8) << 1
            | config.acfie as u8;

        self.device
            .write_word(REG_ACNF_C0, u16::from(hb) << 8 | u16::from(lb))?;
        self.device.write_byte(REG_ACNF_USL, config.usl)?;
        self.device.write_byte(REG_ACNF_LSL, config.lsl)?;
        self.device.write_byte(REG_ACNF_TL, config.tl)?;

        Ok(())
    }

    fn gpio_bit(channel: u8) -> Result<u8> {
        match channel {
            4..=11 => Ok(channel - 4),
            _ => Err(Error::InvalidChannel(channel)),
        }
    }

    /// Configures electrode `channel` (4-11) as GPIO pin.
    ///
    /// Electrodes enabled by [`configure`] take precedence over GPIO.
    ///
    /// [`configure`]: #method.configure
    pub fn gpio_setup(&self, channel: u8, output: bool, mode: GpioMode, enable: bool) -> Result<()> {
        let bit = Mpr121::gpio_bit(channel)?;
        let mode = mode.bits();

        self.device.set_bit(REG_GPIO_CTL0, bit, mode & 0b10 != 0)?;
        self.device.set_bit(REG_GPIO_CTL1, bit, mode & 0b01 != 0)?;
        self.device.set_bit(REG_GPIO_DIR, bit, output)?;
        self.device.set_bit(REG_GPIO_EN, bit, enable)?;

        Ok(())
    }

    /// Returns the GPIO data bits, bit 0 is channel 4.
    pub fn gpio_status(&self) -> Result<u8> {
        Ok(self.device.read_byte(REG_GPIO_DAT)?)
    }

    /// Sets or clears GPIO `channel` (4-11).
    pub fn gpio_set(&self, channel: u8, value: bool) -> Result<()> {
        let bit = Mpr121::gpio_bit(channel)?;
        let reg = if value { REG_GPIO_SET } else { REG_GPIO_CLR };

        self.device.write_byte(reg, 1 << bit)?;

        Ok(())
    }

    /// Toggles GPIO `channel` (4-11).
    pub fn gpio_toggle(&self, channel: u8) -> Result<()> {
        let bit = Mpr121::gpio_bit(channel)?;

        self.device.write_byte(REG_GPIO_TOG, 1 << bit)?;

        Ok(())
    }

    /// Reads the touch status and calls the handlers of all channels that changed.
    pub fn update_touch_state(&self) -> Result<()> {
        let touched = self.touched(true)?;
        let changed = {
            let mut state = self.state.touched();
            let changed = *state ^ touched;
            *state = touched;
            changed
        };

        if changed == 0 {
            return Ok(());
        }

        // Call handlers without holding the lock, they may replace themselves
        let handlers = self.state.handlers().clone();
        for (channel, handler) in handlers.iter().enumerate() {
            let mask = 1 << channel;
            if changed & mask == 0 {
                continue;
            }

            if let Some(handler) = handler {
                guarded("touch handler", || handler(touched & mask != 0, channel as u8));
            }
        }

        Ok(())
    }

    /// Returns the touch status of `channel` as of the last update.
    pub fn is_touched(&self, channel: u8) -> bool {
        channel < CHANNELS && *self.state.touched() & (1 << channel) != 0
    }

    /// Sets the handler called when the touch status of `channel` changes.
    ///
    /// The handler gets the new status and the channel. A panicking handler
    /// is logged, and doesn't affect other handlers.
    pub fn on_touch<F>(&self, channel: u8, handler: F) -> Result<()>
    where
        F: Fn(bool, u8) + Send + Sync + 'static,
    {
        self.set_handler(channel, Some(Arc::new(handler)))
    }

    /// Removes the touch handler of `channel`.
    pub fn remove_touch(&self, channel: u8) -> Result<()> {
        self.set_handler(channel, None)
    }

    fn set_handler(&self, channel: u8, handler: Option<TouchHandler>) -> Result<()> {
        let mut handlers = self.state.handlers();

        match handlers.get_mut(channel as usize) {
            Some(slot) => {
                *slot = handler;
                Ok(())
            }
            None => Err(Error::InvalidChannel(channel)),
        }
    }

    /// Configures the sensor with sensible defaults.
    ///
    /// The sensor is put in stop mode, configured, and started with
    /// `setup.channels` electrodes enabled.
    pub fn setup(&self, setup: Setup) -> Result<()> {
        log::debug!("Setting up MPR121 at 0x{:02x}: {:?}", self.device.address(), setup);

        if setup.reset {
            self.reset()?;
        }

        self.configure(CalibrationLock::TrackingInit, Proximity::Disabled, 0)?;
        self.filter(Filter {
            cdc: 30,
            cdt: 1,
            ffi: 1,
            sfi: 1,
            esi: 0,
        })?;

        if setup.auto_config {
            self.auto_config(AutoConfig::default())?;
        }

        self.threshold(setup.threshold, None, None)?;
        self.threshold(setup.threshold >> 2, None, Some(PROX_CHANNEL))?;
        self.debounce(setup.debounce, None)?;

        for &rft in &[Rft::Rising, Rft::Falling] {
            let electrodes = BaselineFilter {
                mhd: 5,
                nhd: 1,
                ncl: 3,
                fdl: 20,
            };
            self.set_baseline(rft, electrodes, false)?;
            self.set_baseline(rft, BaselineFilter { mhd: 1, ..electrodes }, true)?;
        }

        self.configure(CalibrationLock::TrackingInit, setup.prox, setup.channels)
    }

    /// Stops the background poller or IRQ handler, if any.
    pub fn stop(&mut self) -> Result<()> {
        match self.background.take() {
            Some(Background::Poller(mut poller)) => poller.stop()?,
            Some(Background::Irq(mut irq)) => irq.stop()?,
            None => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RegisterMap;

    fn mpr() -> (Mpr121, RegisterMap) {
        let map = RegisterMap::new();
        map.add_device(ADDRESS);

        let bus = Bus::with_smbus(map.clone());
        (Mpr121::new(bus.device(ADDRESS)), map)
    }

    #[test]
    fn new_has_no_bus_traffic() {
        let (_mpr, map) = mpr();

        assert!(map.registers(ADDRESS).unwrap().iter().all(|&r| r == 0));
    }

    #[test]
    fn configure_defaults() {
        let (mpr, map) = mpr();

        mpr.configure(CalibrationLock::default(), Proximity::default(), 12)
            .unwrap();
        assert_eq!(map.get(ADDRESS, REG_ECR), 0xcc);

        assert!(matches!(
            mpr.configure(CalibrationLock::default(), Proximity::default(), 13),
            Err(Error::InvalidValue { max: 12, .. })
        ));
    }

    #[test]
    fn touched_checks_failure_bits() {
        let (mpr, map) = mpr();

        map.set(ADDRESS, REG_ETS, 0x03);
        map.set(ADDRESS, REG_ETS + 1, 0x90);
        assert!(matches!(mpr.touched(true), Err(Error::Overcurrent)));
        assert_eq!(mpr.touched(false).unwrap(), 0x1003);

        map.set(ADDRESS, REG_ETS + 1, 0x00);
        map.set(ADDRESS, REG_OOR, 0x04);
        assert!(matches!(mpr.touched(true), Err(Error::OutOfRange(0x04))));

        map.set(ADDRESS, REG_OOR + 1, 0x40);
        assert!(matches!(
            mpr.out_of_range(true),
            Err(Error::AutoReconfigFailed)
        ));
        map.set(ADDRESS, REG_OOR + 1, 0xc0);
        assert!(matches!(mpr.out_of_range(true), Err(Error::AutoConfigFailed)));
        assert_eq!(mpr.out_of_range(false).unwrap(), 0x04);
    }

    #[test]
    fn gpio_channels_are_checked() {
        let (mpr, map) = mpr();

        assert!(matches!(mpr.gpio_set(3, true), Err(Error::InvalidChannel(3))));
        assert!(matches!(mpr.gpio_toggle(12), Err(Error::InvalidChannel(12))));

        mpr.gpio_set(4, true).unwrap();
        assert_eq!(map.get(ADDRESS, REG_GPIO_SET), 0x01);
        mpr.gpio_set(11, false).unwrap();
        assert_eq!(map.get(ADDRESS, REG_GPIO_CLR), 0x80);
        mpr.gpio_toggle(6).unwrap();
        assert_eq!(map.get(ADDRESS, REG_GPIO_TOG), 0x04);
    }

    #[test]
    fn gpio_setup_sets_bits() {
        let (mpr, map) = mpr();
        map.set(ADDRESS, REG_GPIO_EN, 0xff);

        mpr.gpio_setup(5, true, GpioMode::HighSide, true).unwrap();
        mpr.gpio_setup(7, false, GpioMode::PullDown, false).unwrap();

        assert_eq!(map.get(ADDRESS, REG_GPIO_CTL0), 0b0000_1010);
        assert_eq!(map.get(ADDRESS, REG_GPIO_CTL1), 0b0000_0010);
        assert_eq!(map.get(ADDRESS, REG_GPIO_DIR), 0b0000_0010);
        assert_eq!(map.get(ADDRESS, REG_GPIO_EN), 0b1111_0111);
    }

    #[test]
    fn handlers_are_called_on_change() {
        let (mpr, map) = mpr();

        let events = Arc::new(Mutex::new(Vec::new()));
        for channel in 0..CHANNELS {
            let events = events.clone();
            mpr.on_touch(channel, move |touched, channel| {
                events.lock().unwrap().push((channel, touched))
            })
            .unwrap();
        }
        mpr.on_touch(3, |_, _| panic!("broken handler")).unwrap();
        assert!(matches!(
            mpr.on_touch(13, |_, _| {}),
            Err(Error::InvalidChannel(13))
        ));

        map.set(ADDRESS, REG_ETS, 0b0000_1001);
        map.set(ADDRESS, REG_ETS + 1, 0b0001_0000);
        mpr.update_touch_state().unwrap();
        assert!(mpr.is_touched(0));
        assert!(mpr.is_touched(12));
        assert!(!mpr.is_touched(1));

        map.set(ADDRESS, REG_ETS, 0b0000_0001);
        mpr.update_touch_state().unwrap();
        mpr.update_touch_state().unwrap();

        mpr.remove_touch(0).unwrap();
        map.set(ADDRESS, REG_ETS, 0);
        map.set(ADDRESS, REG_ETS + 1, 0);
        mpr.update_touch_state().unwrap();

        assert_eq!(*events.lock().unwrap(), vec![(0, true), (12, true), (12, false)]);
    }
}
