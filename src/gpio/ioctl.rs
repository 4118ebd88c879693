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

#![allow(clippy::unnecessary_cast)]

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::mem;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use libc::{self, c_int, c_void, ENOENT};

use super::{Bias, Error, Level, Result, Trigger};

#[cfg(target_env = "musl")]
type IoctlLong = c_int;
#[cfg(not(target_env = "musl"))]
type IoctlLong = libc::c_ulong;

const PATH_GPIOCHIP: &str = "/dev/gpiochip";
const CONSUMER_LABEL: &str = "piripherals";

// gpiochip labels of the BCM2835/6/7, BCM2711 and RP1 (Pi 5) pin controllers
const DRIVER_NAMES: [&[u8]; 3] = [b"pinctrl-bcm2835\0", b"pinctrl-bcm2711\0", b"pinctrl-rp1\0"];

const BITS_NR: u8 = 8;
const BITS_TYPE: u8 = 8;
const BITS_SIZE: u8 = 14;

const SHIFT_NR: u8 = 0;
const SHIFT_TYPE: u8 = SHIFT_NR + BITS_NR;
const SHIFT_SIZE: u8 = SHIFT_TYPE + BITS_TYPE;
const SHIFT_DIR: u8 = SHIFT_SIZE + BITS_SIZE;

const DIR_WRITE: IoctlLong = 1 << SHIFT_DIR;
const DIR_READ: IoctlLong = 2 << SHIFT_DIR;
const DIR_READ_WRITE: IoctlLong = DIR_READ | DIR_WRITE;

const TYPE_GPIO: IoctlLong = (0xB4 as IoctlLong) << SHIFT_TYPE;

const NR_GET_CHIP_INFO: IoctlLong = 0x01 << SHIFT_NR;
const NR_GET_LINE: IoctlLong = 0x07 << SHIFT_NR;
const NR_LINE_GET_VALUES: IoctlLong = 0x0E << SHIFT_NR;

const SIZE_CHIP_INFO: IoctlLong = (mem::size_of::<ChipInfo>() as IoctlLong) << SHIFT_SIZE;
const SIZE_LINE_REQUEST: IoctlLong = (mem::size_of::<LineRequest>() as IoctlLong) << SHIFT_SIZE;
const SIZE_LINE_VALUES: IoctlLong = (mem::size_of::<LineValues>() as IoctlLong) << SHIFT_SIZE;

const GPIO_GET_CHIPINFO_IOCTL: IoctlLong = DIR_READ | TYPE_GPIO | NR_GET_CHIP_INFO | SIZE_CHIP_INFO;
const GPIO_V2_GET_LINE_IOCTL: IoctlLong =
    DIR_READ_WRITE | TYPE_GPIO | NR_GET_LINE | SIZE_LINE_REQUEST;
const GPIO_V2_LINE_GET_VALUES_IOCTL: IoctlLong =
    DIR_READ_WRITE | TYPE_GPIO | NR_LINE_GET_VALUES | SIZE_LINE_VALUES;

const NAME_BUFSIZE: usize = 32;
const LABEL_BUFSIZE: usize = 32;
const LINES_MAX: usize = 64;
const LINE_NUM_ATTRS_MAX: usize = 10;

const LINE_FLAG_INPUT: u64 = 0x04;
const LINE_FLAG_EDGE_RISING: u64 = 0x10;
const LINE_FLAG_EDGE_FALLING: u64 = 0x20;
const LINE_FLAG_BIAS_PULL_UP: u64 = 0x1000;
const LINE_FLAG_BIAS_PULL_DOWN: u64 = 0x2000;
const LINE_FLAG_BIAS_DISABLED: u64 = 0x4000;

const LINE_EVENT_RISING_EDGE: u32 = 1;
const LINE_EVENT_FALLING_EDGE: u32 = 2;

// Kernel-side event queue length for a single line
const EVENT_BUFFER_SIZE: u32 = 16;

#[derive(Copy, Clone)]
#[repr(C)]
struct ChipInfo {
    name: [u8; NAME_BUFSIZE],
    label: [u8; LABEL_BUFSIZE],
    lines: u32,
}

impl ChipInfo {
    fn new(cdev_fd: c_int) -> Result<ChipInfo> {
        let mut chip_info = ChipInfo {
            name: [0u8; NAME_BUFSIZE],
            label: [0u8; LABEL_BUFSIZE],
            lines: 0,
        };

        parse_retval!(unsafe { libc::ioctl(cdev_fd, GPIO_GET_CHIPINFO_IOCTL, &mut chip_info) })?;

        Ok(chip_info)
    }

    fn is_pinctrl(&self) -> bool {
        DRIVER_NAMES
            .iter()
            .any(|name| self.label[..name.len()] == name[..])
    }
}

// Line flags for an input with the requested bias and edge detection
pub(crate) fn input_flags(bias: Bias, trigger: Trigger) -> u64 {
    let bias = match bias {
        Bias::Off => LINE_FLAG_BIAS_DISABLED,
        Bias::PullDown => LINE_FLAG_BIAS_PULL_DOWN,
        Bias::PullUp => LINE_FLAG_BIAS_PULL_UP,
    };

    let edge = match trigger {
        Trigger::Disabled => 0,
        Trigger::RisingEdge => LINE_FLAG_EDGE_RISING,
        Trigger::FallingEdge => LINE_FLAG_EDGE_FALLING,
        Trigger::Both => LINE_FLAG_EDGE_RISING | LINE_FLAG_EDGE_FALLING,
    };

    LINE_FLAG_INPUT | bias | edge
}

#[derive(Copy, Clone, Default)]
#[repr(C)]
struct LineAttribute {
    id: u32,
    padding: u32,
    values: u64,
}

#[derive(Copy, Clone, Default)]
#[repr(C)]
struct LineConfigAttribute {
    attr: LineAttribute,
    mask: u64,
}

#[derive(Copy, Clone, Default)]
#[repr(C)]
struct LineConfig {
    flags: u64,
    num_attrs: u32,
    padding: [u32; 5],
    attrs: [LineConfigAttribute; LINE_NUM_ATTRS_MAX],
}

#[derive(Copy, Clone, Default)]
#[repr(C)]
struct LineValues {
    bits: u64,
    mask: u64,
}

/// A single requested line. The line is released when the request is dropped.
#[repr(C)]
pub(crate) struct LineRequest {
    offsets: [u32; LINES_MAX],
    consumer: [u8; LABEL_BUFSIZE],
    config: LineConfig,
    num_lines: u32,
    event_buffer_size: u32,
    padding: [u32; 5],
    fd: c_int,
}

impl LineRequest {
    pub(crate) fn new(cdev_fd: c_int, offset: u32, flags: u64) -> Result<LineRequest> {
        let mut line_request = LineRequest {
            offsets: [0u32; LINES_MAX],
            consumer: [0u8; LABEL_BUFSIZE],
            config: LineConfig::default(),
            num_lines: 1,
            event_buffer_size: EVENT_BUFFER_SIZE,
            padding: [0u32; 5],
            fd: 0,
        };

        line_request.offsets[0] = offset;
        line_request.config.flags = flags;

        // Set consumer label, so other processes know who requested this line
        line_request.consumer[..CONSUMER_LABEL.len()].copy_from_slice(CONSUMER_LABEL.as_bytes());

        parse_retval!(unsafe { libc::ioctl(cdev_fd, GPIO_V2_GET_LINE_IOCTL, &mut line_request) })?;

        // If the fd is zero or negative, an error occurred
        if line_request.fd <= 0 {
            Err(Error::Io(io::Error::last_os_error()))
        } else {
            Ok(line_request)
        }
    }

    pub(crate) fn level(&self) -> Result<Level> {
        let mut line_values = LineValues {
            bits: 0,
            mask: 0x01,
        };

        parse_retval!(unsafe {
            libc::ioctl(self.fd, GPIO_V2_LINE_GET_VALUES_IOCTL, &mut line_values)
        })?;

        Ok(Level::from((line_values.bits & 0x01) as u8))
    }

    // Wait until an edge event is queued. None blocks indefinitely.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN | libc::POLLPRI,
            revents: 0,
        };

        let timeout_ms = match timeout {
            Some(timeout) => timeout.as_millis().min(c_int::MAX as u128) as c_int,
            None => -1,
        };

        loop {
            match parse_retval!(unsafe { libc::poll(&mut pollfd, 1, timeout_ms) }) {
                Ok(ready) => return Ok(ready > 0),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    pub(crate) fn read_event(&self) -> Result<Event> {
        let mut line_event = LineEvent::default();

        let bytes_read = parse_retval!(unsafe {
            libc::read(
                self.fd,
                &mut line_event as *mut LineEvent as *mut c_void,
                mem::size_of::<LineEvent>(),
            )
        })?;

        if bytes_read < mem::size_of::<LineEvent>() as isize {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "failed to read a complete line event",
            )
            .into());
        }

        Event::from_line_event(&line_event)
    }

    fn close(&mut self) {
        if self.fd > 0 {
            unsafe {
                libc::close(self.fd);
            }

            self.fd = 0;
        }
    }
}

impl Drop for LineRequest {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for LineRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineRequest")
            .field("offset", &self.offsets[0])
            .field("flags", &format_args!("{:#x}", self.config.flags))
            .field("fd", &self.fd)
            .finish()
    }
}

#[derive(Copy, Clone, Default)]
#[repr(C)]
struct LineEvent {
    timestamp_ns: u64,
    id: u32,
    offset: u32,
    seqno: u32,
    line_seqno: u32,
    padding: [u32; 6],
}

/// An edge detected on an input line.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Event {
    trigger: Trigger,
    timestamp: Duration,
    seqno: u32,
}

impl Event {
    fn from_line_event(line_event: &LineEvent) -> Result<Event> {
        let trigger = match line_event.id {
            LINE_EVENT_RISING_EDGE => Trigger::RisingEdge,
            LINE_EVENT_FALLING_EDGE => Trigger::FallingEdge,
            id => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown line event id {}", id),
                )))
            }
        };

        Ok(Event {
            trigger,
            timestamp: Duration::from_nanos(line_event.timestamp_ns),
            seqno: line_event.line_seqno,
        })
    }

    /// Returns the edge that caused the event, either `RisingEdge` or `FallingEdge`.
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Returns the level of the line right after the edge.
    pub fn level(&self) -> Level {
        match self.trigger {
            Trigger::FallingEdge => Level::Low,
            _ => Level::High,
        }
    }

    /// Returns the time the edge was detected, relative to system boot
    /// (`CLOCK_MONOTONIC`).
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Returns the sequence number of this event on its line.
    pub fn seqno(&self) -> u32 {
        self.seqno
    }
}

// Find the gpiochip device that controls the header pins based on its label
pub(crate) fn find_gpiochip() -> Result<File> {
    for id in 0..=255 {
        let path = format!("{}{}", PATH_GPIOCHIP, id);
        let gpiochip = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(Error::PermissionDenied(path));
            }
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(Error::from(e)),
        };

        let chip_info = ChipInfo::new(gpiochip.as_raw_fd())?;
        if chip_info.is_pinctrl() {
            log::debug!("Using {} ({} lines)", path, chip_info.lines);
            return Ok(gpiochip);
        }
    }

    // File Not Found I/O error
    Err(Error::Io(io::Error::from_raw_os_error(ENOENT)))
}
