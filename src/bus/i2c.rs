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

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use libc::c_ulong;

use super::ioctl::{self, Capabilities};
use super::{Error, Result, Smbus, BLOCK_MAX};

/// Provides access to an I2C bus through the Linux `i2cdev` interface.
///
/// `I2c` selects the slave address before each transfer, but only issues the
/// corresponding ioctl when the address differs from the previous transfer.
/// Word and block transfers use the native SMBus requests when the driver
/// supports them, and fall back to byte transfers otherwise.
#[derive(Debug)]
pub struct I2c {
    bus: u8,
    funcs: Capabilities,
    i2cdev: File,
    address: Option<u16>,
}

impl I2c {
    /// Constructs a new `I2c` using `/dev/i2c-{bus}`.
    pub fn with_bus(bus: u8) -> Result<I2c> {
        // bus is a u8, because any 8-bit bus ID could potentially
        // be configured for bit banging I2C using i2c-gpio.
        let i2cdev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/i2c-{}", bus))?;

        let capabilities = ioctl::funcs(i2cdev.as_raw_fd())?;

        // Disable 10-bit addressing if it's supported
        if capabilities.addr_10bit() {
            ioctl::set_addr_10bit(i2cdev.as_raw_fd(), 0)?;
        }

        // Disable PEC if it's supported
        if capabilities.smbus_pec() {
            ioctl::set_pec(i2cdev.as_raw_fd(), 0)?;
        }

        log::debug!("Opened /dev/i2c-{} ({:?})", bus, capabilities);

        Ok(I2c {
            bus,
            funcs: capabilities,
            i2cdev,
            address: None,
        })
    }

    /// Returns the I2C bus ID.
    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// Returns information on the functionality supported by the underlying drivers.
    pub fn capabilities(&self) -> Capabilities {
        self.funcs
    }

    /// Sets the maximum duration of a transaction in milliseconds (ms).
    ///
    /// `timeout` has a resolution of 10ms.
    pub fn set_timeout(&self, timeout: u32) -> Result<()> {
        // i2cdev expects the timeout in units of 10ms
        ioctl::set_timeout(self.i2cdev.as_raw_fd(), c_ulong::from(timeout / 10))?;

        Ok(())
    }

    /// Receives incoming data from the slave at `address` and stores it in `buffer`.
    ///
    /// This is a plain I2C read without a register address, so it bypasses
    /// the SMBus protocol.
    pub fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<usize> {
        self.select(address)?;

        Ok(self.i2cdev.read(buffer)?)
    }

    /// Sends the outgoing data contained in `buffer` to the slave at `address`.
    pub fn write(&mut self, address: u16, buffer: &[u8]) -> Result<usize> {
        self.select(address)?;

        Ok(self.i2cdev.write(buffer)?)
    }

    fn select(&mut self, slave_address: u16) -> Result<i32> {
        if self.address == Some(slave_address) {
            return Ok(self.i2cdev.as_raw_fd());
        }

        // Filter out reserved and invalid 7-bit addresses
        if slave_address < 8 || (slave_address >> 3) == 0b1111 || slave_address > 0x7F {
            return Err(Error::InvalidSlaveAddress(slave_address));
        }

        ioctl::set_slave_address(self.i2cdev.as_raw_fd(), c_ulong::from(slave_address))?;
        self.address = Some(slave_address);

        Ok(self.i2cdev.as_raw_fd())
    }
}

impl Smbus for I2c {
    fn read_byte_data(&mut self, addr: u16, reg: u8) -> Result<u8> {
        let fd = self.select(addr)?;

        Ok(ioctl::smbus_read_byte(fd, reg)?)
    }

    fn write_byte_data(&mut self, addr: u16, reg: u8, value: u8) -> Result<()> {
        let fd = self.select(addr)?;
        ioctl::smbus_write_byte(fd, reg, value)?;

        Ok(())
    }

    fn read_word_data(&mut self, addr: u16, reg: u8) -> Result<u16> {
        if !self.funcs.read_word_data() {
            let low = self.read_byte_data(addr, reg)?;
            let high = self.read_byte_data(addr, reg.wrapping_add(1))?;

            return Ok(u16::from(low) | (u16::from(high) << 8));
        }

        let fd = self.select(addr)?;

        Ok(ioctl::smbus_read_word(fd, reg)?)
    }

    fn write_word_data(&mut self, addr: u16, reg: u8, value: u16) -> Result<()> {
        if !self.funcs.write_word_data() {
            self.write_byte_data(addr, reg, (value & 0xFF) as u8)?;
            return self.write_byte_data(addr, reg.wrapping_add(1), (value >> 8) as u8);
        }

        let fd = self.select(addr)?;
        ioctl::smbus_write_word(fd, reg, value)?;

        Ok(())
    }

    fn read_i2c_block_data(&mut self, addr: u16, reg: u8, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() > BLOCK_MAX {
            return Err(Error::BlockTooLong(buffer.len()));
        }

        if !self.funcs.i2c_block_read() {
            return Err(Error::FeatureNotSupported);
        }

        let fd = self.select(addr)?;
        ioctl::i2c_block_read(fd, reg, buffer)?;

        Ok(())
    }

    fn write_i2c_block_data(&mut self, addr: u16, reg: u8, block: &[u8]) -> Result<()> {
        if block.len() > BLOCK_MAX {
            return Err(Error::BlockTooLong(block.len()));
        }

        if !self.funcs.i2c_block_write() {
            return Err(Error::FeatureNotSupported);
        }

        let fd = self.select(addr)?;
        ioctl::i2c_block_write(fd, reg, block)?;

        Ok(())
    }
}
