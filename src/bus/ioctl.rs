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

use libc::{c_int, c_ulong, ioctl};
use std::io;
use std::result;

pub type Result<T> = result::Result<T, io::Error>;

// Based on i2c.h, i2c-dev.h and the documentation at https://www.kernel.org/doc/Documentation/i2c
// and http://smbus.org/specs/SMBus_3_1_20180319.pdf

// Capabilities returned by REQ_FUNCS
const FUNC_I2C: c_ulong = 0x01;
const FUNC_10BIT_ADDR: c_ulong = 0x02;
const FUNC_SMBUS_PEC: c_ulong = 0x08;
const FUNC_SMBUS_READ_BYTE_DATA: c_ulong = 0x08_0000;
const FUNC_SMBUS_WRITE_BYTE_DATA: c_ulong = 0x10_0000;
const FUNC_SMBUS_READ_WORD_DATA: c_ulong = 0x20_0000;
const FUNC_SMBUS_WRITE_WORD_DATA: c_ulong = 0x40_0000;
const FUNC_SMBUS_READ_I2C_BLOCK: c_ulong = 0x0400_0000;
const FUNC_SMBUS_WRITE_I2C_BLOCK: c_ulong = 0x0800_0000;

/// Functionality reported by the i2cdev driver.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Capabilities {
    funcs: c_ulong,
}

impl Capabilities {
    pub(crate) fn new(funcs: c_ulong) -> Capabilities {
        Capabilities { funcs }
    }

    pub fn i2c(&self) -> bool {
        (self.funcs & FUNC_I2C) > 0
    }

    pub fn addr_10bit(&self) -> bool {
        (self.funcs & FUNC_10BIT_ADDR) > 0
    }

    pub fn smbus_pec(&self) -> bool {
        (self.funcs & FUNC_SMBUS_PEC) > 0
    }

    pub fn read_byte_data(&self) -> bool {
        (self.funcs & FUNC_SMBUS_READ_BYTE_DATA) > 0
    }

    pub fn write_byte_data(&self) -> bool {
        (self.funcs & FUNC_SMBUS_WRITE_BYTE_DATA) > 0
    }

    pub fn read_word_data(&self) -> bool {
        (self.funcs & FUNC_SMBUS_READ_WORD_DATA) > 0
    }

    pub fn write_word_data(&self) -> bool {
        (self.funcs & FUNC_SMBUS_WRITE_WORD_DATA) > 0
    }

    pub fn i2c_block_read(&self) -> bool {
        (self.funcs & FUNC_SMBUS_READ_I2C_BLOCK) > 0
    }

    pub fn i2c_block_write(&self) -> bool {
        (self.funcs & FUNC_SMBUS_WRITE_I2C_BLOCK) > 0
    }
}

// ioctl() requests supported by i2cdev
const REQ_TIMEOUT: c_ulong = 0x0702; // Timeout in 10ms units
const REQ_SLAVE: c_ulong = 0x0706; // Set slave address
const REQ_TENBIT: c_ulong = 0x0704; // Use 10-bit slave addresses
const REQ_FUNCS: c_ulong = 0x0705; // Read I2C bus capabilities
const REQ_PEC: c_ulong = 0x0708; // SMBus: Use Packet Error Checking
const REQ_SMBUS: c_ulong = 0x0720; // SMBus: Transfer

pub const BLOCK_MAX: usize = 32; // Maximum bytes per block transfer

#[derive(Debug, PartialEq, Copy, Clone)]
enum SmbusReadWrite {
    Read = 1,
    Write = 0,
}

// Size/Type identifiers for the data contained in SmbusBuffer
#[derive(Debug, PartialEq, Copy, Clone)]
enum SmbusSize {
    ByteData = 2,
    WordData = 3,
    I2cBlockData = 8,
}

// Mirrors union i2c_smbus_data. A block starts with its length, followed by
// up to 32 bytes of data and one byte of padding.
#[derive(Copy, Clone)]
#[repr(C)]
struct SmbusBuffer {
    data: [u8; BLOCK_MAX + 2],
}

impl SmbusBuffer {
    fn new() -> SmbusBuffer {
        SmbusBuffer {
            data: [0u8; BLOCK_MAX + 2],
        }
    }

    fn with_byte(value: u8) -> SmbusBuffer {
        let mut buffer = SmbusBuffer::new();
        buffer.data[0] = value;

        buffer
    }

    fn with_word(value: u16) -> SmbusBuffer {
        let mut buffer = SmbusBuffer::new();

        // Low byte is sent first (SMBus 3.1 spec @ 6.5.4)
        buffer.data[0] = (value & 0xFF) as u8;
        buffer.data[1] = (value >> 8) as u8;

        buffer
    }

    fn with_block(block: &[u8]) -> SmbusBuffer {
        let len = block.len().min(BLOCK_MAX);
        let mut buffer = SmbusBuffer::new();
        buffer.data[0] = len as u8;
        buffer.data[1..=len].copy_from_slice(&block[..len]);

        buffer
    }
}

#[repr(C)]
struct SmbusRequest<'a> {
    read_write: u8,
    command: u8,
    size: u32,
    data: &'a mut SmbusBuffer,
}

fn smbus_request(
    fd: c_int,
    read_write: SmbusReadWrite,
    command: u8,
    size: SmbusSize,
    data: &mut SmbusBuffer,
) -> Result<i32> {
    let mut request = SmbusRequest {
        read_write: read_write as u8,
        command,
        size: size as u32,
        data,
    };

    parse_retval!(unsafe { ioctl(fd, REQ_SMBUS, &mut request) })
}

pub fn smbus_read_byte(fd: c_int, command: u8) -> Result<u8> {
    let mut buffer = SmbusBuffer::new();
    smbus_request(
        fd,
        SmbusReadWrite::Read,
        command,
        SmbusSize::ByteData,
        &mut buffer,
    )?;

    Ok(buffer.data[0])
}

pub fn smbus_read_word(fd: c_int, command: u8) -> Result<u16> {
    let mut buffer = SmbusBuffer::new();
    smbus_request(
        fd,
        SmbusReadWrite::Read,
        command,
        SmbusSize::WordData,
        &mut buffer,
    )?;

    // Low byte is received first (SMBus 3.1 spec @ 6.5.5)
    Ok(u16::from(buffer.data[0]) | (u16::from(buffer.data[1]) << 8))
}

pub fn smbus_write_byte(fd: c_int, command: u8, value: u8) -> Result<()> {
    let mut buffer = SmbusBuffer::with_byte(value);
    smbus_request(
        fd,
        SmbusReadWrite::Write,
        command,
        SmbusSize::ByteData,
        &mut buffer,
    )?;

    Ok(())
}

pub fn smbus_write_word(fd: c_int, command: u8, value: u16) -> Result<()> {
    let mut buffer = SmbusBuffer::with_word(value);
    smbus_request(
        fd,
        SmbusReadWrite::Write,
        command,
        SmbusSize::WordData,
        &mut buffer,
    )?;

    Ok(())
}

pub fn i2c_block_read(fd: c_int, command: u8, buffer: &mut [u8]) -> Result<()> {
    let len = buffer.len().min(BLOCK_MAX);

    // The requested length goes into the first byte
    let mut smbus_buffer = SmbusBuffer::with_byte(len as u8);
    smbus_request(
        fd,
        SmbusReadWrite::Read,
        command,
        SmbusSize::I2cBlockData,
        &mut smbus_buffer,
    )?;

    let received = (smbus_buffer.data[0] as usize).min(len);
    buffer[..received].copy_from_slice(&smbus_buffer.data[1..=received]);

    Ok(())
}

pub fn i2c_block_write(fd: c_int, command: u8, buffer: &[u8]) -> Result<()> {
    let mut smbus_buffer = SmbusBuffer::with_block(buffer);
    smbus_request(
        fd,
        SmbusReadWrite::Write,
        command,
        SmbusSize::I2cBlockData,
        &mut smbus_buffer,
    )?;

    Ok(())
}

// All ioctl commands take an unsigned long parameter, except for
// REQ_FUNCS and REQ_SMBUS

pub fn set_slave_address(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(unsafe { ioctl(fd, REQ_SLAVE, value) })
}

pub fn set_addr_10bit(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(unsafe { ioctl(fd, REQ_TENBIT, value) })
}

pub fn set_pec(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(unsafe { ioctl(fd, REQ_PEC, value) })
}

pub fn set_timeout(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(unsafe { ioctl(fd, REQ_TIMEOUT, value) })
}

pub fn funcs(fd: c_int) -> Result<Capabilities> {
    let mut funcs: c_ulong = 0;

    parse_retval!(unsafe { ioctl(fd, REQ_FUNCS, &mut funcs) })?;

    Ok(Capabilities::new(funcs))
}
