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

//! Register access to devices on an I2C bus.
//!
//! Most I2C peripherals expose their functionality through a set of 8-bit
//! registers. [`Bus`] offers byte, word and block reads and writes of those
//! registers, and [`Device`] binds a `Bus` to a single slave address, so
//! drivers don't have to pass the address around.
//!
//! The actual transfers are performed by an [`Smbus`] implementation. On the
//! Raspberry Pi this is [`I2c`], which talks to `/dev/i2c-N` through the
//! `i2cdev` interface. Any other transport can be plugged in with
//! [`Bus::with_smbus`]. An implementation only has to provide single byte
//! reads and writes. Word and block transfers fall back to a sequence of byte
//! transfers unless the implementation overrides them.
//!
//! [`RegisterMap`] is an in-memory transport, handy for exercising drivers
//! without any hardware attached.
//!
//! ## Enabling the bus
//!
//! The I2C bus connected to physical pins 3 (SDA) and 5 (SCL) is disabled by
//! default. You can enable it through `sudo raspi-config`, or by manually
//! adding `dtparam=i2c_arm=on` to `/boot/config.txt`, and `i2c-dev` to
//! `/etc/modules`. Remember to reboot the Raspberry Pi afterwards.
//!
//! ## Example
//!
//! ```no_run
//! use piripherals::bus::Bus;
//!
//! # fn main() -> piripherals::bus::Result<()> {
//! let bus = Bus::new(1)?;
//! let rtc = bus.device(0x68);
//!
//! rtc.write_block(0x00, &[0x50, 0x59, 0x11])?;
//! let time = rtc.read_block(0x00, 3)?;
//! # Ok(())
//! # }
//! ```
//!
//! [`I2c`]: struct.I2c.html
//! [`Bus`]: struct.Bus.html
//! [`Bus::with_smbus`]: struct.Bus.html#method.with_smbus
//! [`Device`]: struct.Device.html
//! [`Smbus`]: trait.Smbus.html
//! [`RegisterMap`]: struct.RegisterMap.html

use std::error;
use std::fmt;
use std::io;
use std::result;
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(feature = "hal")]
mod hal;
mod i2c;
mod ioctl;
mod memory;

pub use self::i2c::I2c;
pub use self::ioctl::Capabilities;
pub use self::memory::RegisterMap;

/// Maximum number of bytes in a single block transfer.
pub const BLOCK_MAX: usize = ioctl::BLOCK_MAX;

/// Errors that can occur when accessing a bus.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(io::Error),
    /// Invalid slave address.
    ///
    /// Only 7-bit addresses are supported. Several 7-bit addresses
    /// are reserved, and can't be used as slave addresses.
    InvalidSlaveAddress(u16),
    /// I2C/SMBus feature not supported by the underlying drivers.
    FeatureNotSupported,
    /// A block transfer exceeds [`BLOCK_MAX`] bytes.
    ///
    /// [`BLOCK_MAX`]: constant.BLOCK_MAX.html
    BlockTooLong(usize),
    /// No device responds at the given address.
    NoDevice(u16),
    /// A thread panicked while holding the bus.
    PoisonedLock,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
            Error::InvalidSlaveAddress(address) => {
                write!(f, "Invalid slave address: 0x{:02x}", address)
            }
            Error::FeatureNotSupported => write!(f, "I2C/SMBus feature not supported"),
            Error::BlockTooLong(len) => write!(
                f,
                "Block of {} bytes exceeds the maximum of {} bytes",
                len, BLOCK_MAX
            ),
            Error::NoDevice(address) => write!(f, "No device at address 0x{:02x}", address),
            Error::PoisonedLock => write!(f, "Bus lock poisoned"),
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

/// Result type returned from methods that can have `bus::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Register level transfers on a bus.
///
/// `addr` is the 7-bit slave address, `reg` the register (or SMBus command)
/// that's accessed. Only the single byte transfers are required. The word and
/// block transfers are emulated with consecutive byte transfers, which works
/// for any device that auto-increments its register pointer or maps each
/// register individually. Implementations with native support should
/// override them.
pub trait Smbus: Send {
    /// Reads the byte stored in `reg`.
    fn read_byte_data(&mut self, addr: u16, reg: u8) -> Result<u8>;

    /// Writes `value` to `reg`.
    fn write_byte_data(&mut self, addr: u16, reg: u8, value: u8) -> Result<()>;

    /// Reads a 16-bit word. The low byte is stored in `reg`, the high byte in `reg + 1`.
    fn read_word_data(&mut self, addr: u16, reg: u8) -> Result<u16> {
        let low = self.read_byte_data(addr, reg)?;
        let high = self.read_byte_data(addr, reg.wrapping_add(1))?;

        Ok(u16::from(low) | (u16::from(high) << 8))
    }

    /// Writes a 16-bit word. The low byte goes to `reg`, the high byte to `reg + 1`.
    fn write_word_data(&mut self, addr: u16, reg: u8, value: u16) -> Result<()> {
        self.write_byte_data(addr, reg, (value & 0xFF) as u8)?;
        self.write_byte_data(addr, reg.wrapping_add(1), (value >> 8) as u8)
    }

    /// Fills `buffer` with the contents of the registers starting at `reg`.
    fn read_i2c_block_data(&mut self, addr: u16, reg: u8, buffer: &mut [u8]) -> Result<()> {
        for (offset, byte) in buffer.iter_mut().enumerate() {
            *byte = self.read_byte_data(addr, reg.wrapping_add(offset as u8))?;
        }

        Ok(())
    }

    /// Writes `block` to the registers starting at `reg`.
    fn write_i2c_block_data(&mut self, addr: u16, reg: u8, block: &[u8]) -> Result<()> {
        for (offset, byte) in block.iter().enumerate() {
            self.write_byte_data(addr, reg.wrapping_add(offset as u8), *byte)?;
        }

        Ok(())
    }
}

/// A shared handle to a bus.
///
/// `Bus` can be cloned and sent to other threads. Every transfer locks the
/// underlying [`Smbus`] for its duration, so transfers from different threads
/// never interleave.
///
/// [`Smbus`]: trait.Smbus.html
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Mutex<Box<dyn Smbus>>>,
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("inner", &format_args!("{{ .. }}"))
            .finish()
    }
}

impl Bus {
    /// Constructs a new `Bus` backed by `/dev/i2c-{bus}`.
    ///
    /// On every Raspberry Pi model except the very first model B, the bus
    /// connected to physical pins 3 and 5 is bus 1.
    pub fn new(bus: u8) -> Result<Bus> {
        Ok(Bus::with_smbus(I2c::with_bus(bus)?))
    }

    /// Constructs a new `Bus` using the specified transport.
    pub fn with_smbus<S: Smbus + 'static>(smbus: S) -> Bus {
        Bus {
            inner: Arc::new(Mutex::new(Box::new(smbus))),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Smbus>>> {
        self.inner.lock().map_err(|_| Error::PoisonedLock)
    }

    /// Reads a byte from register `reg` of the device at `addr`.
    pub fn read_byte(&self, addr: u16, reg: u8) -> Result<u8> {
        self.lock()?.read_byte_data(addr, reg)
    }

    /// Reads a 16-bit word. The low byte is at `reg`, the high byte at `reg + 1`.
    pub fn read_word(&self, addr: u16, reg: u8) -> Result<u16> {
        self.lock()?.read_word_data(addr, reg)
    }

    /// Reads `len` bytes starting at `reg`.
    ///
    /// `len` can't exceed [`BLOCK_MAX`].
    ///
    /// [`BLOCK_MAX`]: constant.BLOCK_MAX.html
    pub fn read_block(&self, addr: u16, reg: u8, len: usize) -> Result<Vec<u8>> {
        if len > BLOCK_MAX {
            return Err(Error::BlockTooLong(len));
        }

        let mut buffer = vec![0u8; len];
        self.lock()?.read_i2c_block_data(addr, reg, &mut buffer)?;

        Ok(buffer)
    }

    /// Writes a byte to register `reg` of the device at `addr`.
    pub fn write_byte(&self, addr: u16, reg: u8, value: u8) -> Result<()> {
        self.lock()?.write_byte_data(addr, reg, value)
    }

    /// Writes a 16-bit word. The low byte goes to `reg`, the high byte to `reg + 1`.
    pub fn write_word(&self, addr: u16, reg: u8, value: u16) -> Result<()> {
        self.lock()?.write_word_data(addr, reg, value)
    }

    /// Writes `block` starting at `reg`.
    ///
    /// `block` can't be longer than [`BLOCK_MAX`] bytes.
    ///
    /// [`BLOCK_MAX`]: constant.BLOCK_MAX.html
    pub fn write_block(&self, addr: u16, reg: u8, block: &[u8]) -> Result<()> {
        if block.len() > BLOCK_MAX {
            return Err(Error::BlockTooLong(block.len()));
        }

        self.lock()?.write_i2c_block_data(addr, reg, block)
    }

    /// Returns a [`Device`] for the slave at `addr`.
    ///
    /// [`Device`]: struct.Device.html
    pub fn device(&self, addr: u16) -> Device {
        Device {
            bus: self.clone(),
            addr,
        }
    }

    /// Probes all regular 7-bit addresses, and returns those that answer a
    /// read of register 0.
    pub fn scan(&self) -> Vec<u16> {
        (0x08..=0x77)
            .filter(|&addr| self.read_byte(addr, 0).is_ok())
            .collect()
    }
}

/// A device on a [`Bus`].
///
/// `Device` offers the same transfers as `Bus`, with the slave address
/// already set.
///
/// [`Bus`]: struct.Bus.html
#[derive(Debug, Clone)]
pub struct Device {
    bus: Bus,
    addr: u16,
}

impl Device {
    /// Returns the slave address.
    pub fn address(&self) -> u16 {
        self.addr
    }

    /// Returns the bus the device is attached to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn read_byte(&self, reg: u8) -> Result<u8> {
        self.bus.read_byte(self.addr, reg)
    }

    pub fn read_word(&self, reg: u8) -> Result<u16> {
        self.bus.read_word(self.addr, reg)
    }

    pub fn read_block(&self, reg: u8, len: usize) -> Result<Vec<u8>> {
        self.bus.read_block(self.addr, reg, len)
    }

    pub fn write_byte(&self, reg: u8, value: u8) -> Result<()> {
        self.bus.write_byte(self.addr, reg, value)
    }

    pub fn write_word(&self, reg: u8, value: u16) -> Result<()> {
        self.bus.write_word(self.addr, reg, value)
    }

    pub fn write_block(&self, reg: u8, block: &[u8]) -> Result<()> {
        self.bus.write_block(self.addr, reg, block)
    }

    /// Replaces the bits selected by `mask` in register `reg` with those of `value`.
    ///
    /// The read and the write are two separate transfers.
    pub fn update_byte(&self, reg: u8, mask: u8, value: u8) -> Result<u8> {
        let current = self.read_byte(reg)?;
        let updated = (current & !mask) | (value & mask);
        log::trace!(
            "0x{:02x}:0x{:02x} = {:08b} -> {:08b}",
            self.addr,
            reg,
            current,
            updated
        );
        self.write_byte(reg, updated)?;

        Ok(updated)
    }

    /// Sets or clears a single bit of register `reg`.
    pub fn set_bit(&self, reg: u8, bit: u8, on: bool) -> Result<u8> {
        let mask = 1 << bit;
        self.update_byte(reg, mask, if on { mask } else { 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Transport that answers every read with the next queued byte and
    // records all calls.
    #[derive(Default)]
    struct Recorder {
        reads: Vec<u8>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Smbus for Recorder {
        fn read_byte_data(&mut self, addr: u16, reg: u8) -> Result<u8> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("read_byte({}, {})", addr, reg));
            Ok(self.reads.remove(0))
        }

        fn write_byte_data(&mut self, addr: u16, reg: u8, value: u8) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("write_byte({}, {}, {:#x})", addr, reg, value));
            Ok(())
        }
    }

    fn recorder(reads: &[u8]) -> (Bus, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let bus = Bus::with_smbus(Recorder {
            reads: reads.to_vec(),
            calls: calls.clone(),
        });

        (bus, calls)
    }

    #[test]
    fn word_read_falls_back_to_bytes() {
        let (bus, calls) = recorder(&[0xab, 0xcd]);

        assert_eq!(bus.read_word(0, 0).unwrap(), 0xcdab);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["read_byte(0, 0)", "read_byte(0, 1)"]
        );
    }

    #[test]
    fn word_write_falls_back_to_bytes() {
        let (bus, calls) = recorder(&[]);

        bus.write_word(0, 0, 0xaffe).unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["write_byte(0, 0, 0xfe)", "write_byte(0, 1, 0xaf)"]
        );
    }

    #[test]
    fn block_transfers_fall_back_to_bytes() {
        let (bus, calls) = recorder(&[0xab, 0xcd, 0x00]);

        assert_eq!(bus.read_block(4, 6, 3).unwrap(), vec![0xab, 0xcd, 0x00]);
        bus.write_block(8, 7, &[0xde, 0xad, 0xbe, 0xef]).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "read_byte(4, 6)",
                "read_byte(4, 7)",
                "read_byte(4, 8)",
                "write_byte(8, 7, 0xde)",
                "write_byte(8, 8, 0xad)",
                "write_byte(8, 9, 0xbe)",
                "write_byte(8, 10, 0xef)",
            ]
        );
    }

    #[test]
    fn oversized_blocks_are_rejected() {
        let (bus, calls) = recorder(&[]);

        assert!(matches!(
            bus.read_block(0x10, 0, 33),
            Err(Error::BlockTooLong(33))
        ));
        assert!(matches!(
            bus.write_block(0x10, 0, &[0u8; 40]),
            Err(Error::BlockTooLong(40))
        ));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn device_binds_address() {
        let (bus, calls) = recorder(&[24]);
        let dev = bus.device(88);

        assert_eq!(dev.address(), 88);
        assert_eq!(dev.read_byte(23).unwrap(), 24);
        dev.write_byte(4, 66).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["read_byte(88, 23)", "write_byte(88, 4, 0x42)"]
        );
    }

    #[test]
    fn update_byte_only_touches_masked_bits() {
        let (bus, calls) = recorder(&[0b1010_1010]);
        let dev = bus.device(0x5a);

        assert_eq!(dev.update_byte(0x6c, 0xf0, 0x50).unwrap(), 0b0101_1010);
        assert_eq!(
            calls.lock().unwrap().last().unwrap(),
            "write_byte(90, 108, 0x5a)"
        );
    }
}
