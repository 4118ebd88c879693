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

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Error, Result, Smbus};

/// An in-memory bus.
///
/// Every device added with [`add_device`] gets a file of 256 zeroed
/// registers. Reads and writes to other addresses fail with
/// [`Error::NoDevice`], just like a slave that doesn't acknowledge.
///
/// `RegisterMap` only implements byte transfers, so word and block transfers
/// take the byte-wise fallback path of [`Smbus`]. Clones share the same
/// registers, which lets a test keep a handle while a driver owns the bus.
///
/// ```
/// use piripherals::bus::{Bus, RegisterMap};
///
/// let map = RegisterMap::new();
/// map.add_device(0x5a);
///
/// let bus = Bus::with_smbus(map.clone());
/// bus.write_word(0x5a, 0x10, 0xaffe).unwrap();
///
/// assert_eq!(map.get(0x5a, 0x10), 0xfe);
/// assert_eq!(map.get(0x5a, 0x11), 0xaf);
/// ```
///
/// [`add_device`]: #method.add_device
/// [`Error::NoDevice`]: enum.Error.html#variant.NoDevice
/// [`Smbus`]: trait.Smbus.html
#[derive(Debug, Clone, Default)]
pub struct RegisterMap {
    devices: Arc<Mutex<BTreeMap<u16, [u8; 256]>>>,
}

impl RegisterMap {
    fn devices(&self) -> MutexGuard<'_, BTreeMap<u16, [u8; 256]>> {
        // A panicking test thread shouldn't hide the registers from the others
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Constructs an empty `RegisterMap`.
    pub fn new() -> RegisterMap {
        RegisterMap::default()
    }

    /// Adds a device with all registers set to 0. An existing device is reset.
    pub fn add_device(&self, addr: u16) {
        self.devices().insert(addr, [0u8; 256]);
    }

    /// Returns the value of a register, or 0 for unknown devices.
    pub fn get(&self, addr: u16, reg: u8) -> u8 {
        self.devices()
            .get(&addr)
            .map_or(0, |regs| regs[reg as usize])
    }

    /// Sets a register, adding the device if needed.
    pub fn set(&self, addr: u16, reg: u8, value: u8) {
        self.devices()
            .entry(addr)
            .or_insert([0u8; 256])[reg as usize] = value;
    }

    /// Returns a copy of all registers of a device.
    pub fn registers(&self, addr: u16) -> Option<[u8; 256]> {
        self.devices().get(&addr).copied()
    }

    /// Returns the addresses of all devices.
    pub fn addresses(&self) -> Vec<u16> {
        self.devices().keys().copied().collect()
    }
}

impl Smbus for RegisterMap {
    fn read_byte_data(&mut self, addr: u16, reg: u8) -> Result<u8> {
        let devices = self.devices.lock().map_err(|_| Error::PoisonedLock)?;

        devices
            .get(&addr)
            .map(|regs| regs[reg as usize])
            .ok_or(Error::NoDevice(addr))
    }

    fn write_byte_data(&mut self, addr: u16, reg: u8, value: u8) -> Result<()> {
        let mut devices = self.devices.lock().map_err(|_| Error::PoisonedLock)?;

        let regs = devices.get_mut(&addr).ok_or(Error::NoDevice(addr))?;
        regs[reg as usize] = value;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;

    #[test]
    fn unknown_device_fails() {
        let bus = Bus::with_smbus(RegisterMap::new());

        assert!(matches!(bus.read_byte(0x20, 0), Err(Error::NoDevice(0x20))));
        assert!(matches!(
            bus.write_byte(0x20, 0, 1),
            Err(Error::NoDevice(0x20))
        ));
    }

    #[test]
    fn scan_finds_added_devices() {
        let map = RegisterMap::new();
        map.add_device(0x5a);
        map.add_device(0x68);
        map.add_device(0x03);

        let bus = Bus::with_smbus(map);

        // 0x03 is reserved and never probed
        assert_eq!(bus.scan(), vec![0x5a, 0x68]);
    }

    #[test]
    fn block_read_returns_consecutive_registers() {
        let map = RegisterMap::new();
        for reg in 0..5 {
            map.set(0x10, 7 + reg, reg + 1);
        }

        let dev = Bus::with_smbus(map).device(0x10);
        assert_eq!(dev.read_block(7, 5).unwrap(), vec![1, 2, 3, 4, 5]);
    }
}
