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

use embedded_hal::i2c::{self, ErrorType, I2c as I2cHal, Operation as I2cOperation};

use super::{Error, I2c};

impl ErrorType for I2c {
    type Error = Error;
}

impl i2c::Error for Error {
    fn kind(&self) -> i2c::ErrorKind {
        match self {
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::InvalidData => i2c::ErrorKind::Bus,
                std::io::ErrorKind::WouldBlock => i2c::ErrorKind::ArbitrationLoss,
                _ => i2c::ErrorKind::Other,
            },
            Error::NoDevice(_) => {
                i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Address)
            }
            _ => i2c::ErrorKind::Other,
        }
    }
}

/// `I2c` trait implementation for `embedded-hal` v1.0.0.
///
/// Every operation of a transaction is a separate transfer, with a STOP
/// condition in between.
impl I2cHal for I2c {
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        I2c::read(self, u16::from(address), buffer)?;

        Ok(())
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        I2c::write(self, u16::from(address), bytes)?;

        Ok(())
    }

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        I2c::write(self, u16::from(address), bytes)?;
        I2c::read(self, u16::from(address), buffer)?;

        Ok(())
    }

    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [I2cOperation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                I2cOperation::Read(buffer) => {
                    I2c::read(self, u16::from(address), buffer)?;
                }
                I2cOperation::Write(bytes) => {
                    I2c::write(self, u16::from(address), bytes)?;
                }
            }
        }

        Ok(())
    }
}
