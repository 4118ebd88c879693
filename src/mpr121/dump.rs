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

use std::io::Write;
use std::thread;
use std::time::Duration;

use super::{Mpr121, Result, CHANNELS, REG_CDC, REG_CDT, REG_RTH, REG_TTH};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const LINE_UP: &str = "\x1b[F";

const REG_COLUMNS: usize = 4;
const REG_ROWS: usize = 32;

const BAR_WIDTH: i32 = 80;
const DATA_MAX: i32 = 0x3ff;

fn frame_lines(regs: bool) -> usize {
    (if regs { REG_ROWS } else { 0 }) + CHANNELS as usize + 1
}

// Position of a 10-bit value on the bar
fn bar_position(value: i32) -> usize {
    (BAR_WIDTH * value / DATA_MAX).max(0).min(BAR_WIDTH - 1) as usize
}

// Electrode data as '=' over '-', with markers for the baseline (|) and
// where the touch (yellow) and release (green) thresholds are crossed
fn bar(data: u16, baseline: u16, touch: u8, release: u8) -> String {
    let filled = (BAR_WIDTH * i32::from(data) / DATA_MAX).min(BAR_WIDTH) as usize;

    let mut cells: Vec<String> = (0..BAR_WIDTH as usize)
        .map(|i| if i < filled { "=" } else { "-" }.to_owned())
        .collect();

    let baseline = i32::from(baseline);
    cells[bar_position(baseline)] = format!("{}|{}", RESET, BLUE);

    let nt = bar_position(baseline - i32::from(touch));
    cells[nt].insert_str(0, YELLOW);
    let nr = bar_position(baseline - i32::from(release));
    cells[nr].insert_str(0, GREEN);

    cells.concat()
}

fn flag(bits: u16, channel: u8) -> char {
    if bits & (1 << channel) != 0 {
        '1'
    } else {
        '0'
    }
}

impl Mpr121 {
    fn thresholds(&self) -> Result<Vec<(u8, u8)>> {
        (0..CHANNELS)
            .map(|ch| {
                Ok((
                    self.device.read_byte(REG_TTH + 2 * ch)?,
                    self.device.read_byte(REG_RTH + 2 * ch)?,
                ))
            })
            .collect()
    }

    fn dump_registers<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut data = Vec::with_capacity(REG_COLUMNS * REG_ROWS);
        for column in 0..REG_COLUMNS {
            data.extend(self.device.read_block((column * REG_ROWS) as u8, REG_ROWS)?);
        }

        for row in 0..REG_ROWS {
            for column in 0..REG_COLUMNS {
                let reg = row + REG_ROWS * column;
                let value = data[reg];
                let color = if value != 0 { YELLOW } else { "" };

                write!(
                    out,
                    "{}0x{:02x} = 0x{:02x} b{:08b} {:3}{}    ",
                    color, reg, value, value, value, RESET
                )?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    fn dump_frame<W: Write>(&self, out: &mut W, regs: bool, thresholds: &[(u8, u8)]) -> Result<()> {
        if regs {
            self.dump_registers(out)?;
        }

        writeln!(
            out,
            " E:  raw base diff (touched) [GPIO]{:73}  cdc     cdt oor",
            ""
        )?;

        let touched = self.touched(false)?;
        let oor = self.out_of_range(false)?;
        let gpio = self.gpio_status()?;
        let data = self.electrode_data()?;
        let baseline = self.baseline()?;

        for ch in 0..CHANNELS {
            let i = ch as usize;
            let (touch, release) = thresholds[i];

            let gpio = match ch {
                4..=11 if gpio & (1 << (ch - 4)) != 0 => '1',
                4..=11 => '0',
                _ => '-',
            };

            let cdc = self.device.read_byte(REG_CDC + ch)?;
            let cdt = (self.device.read_byte(REG_CDT + ch / 2)? >> (4 * (ch % 2))) & 0x0f;
            let charge_time = 0.5 * 2f64.powi(i32::from(cdt) - 1);

            writeln!(
                out,
                "{:2}: {:4} {:4} {:4} ({}) [{}] {}{}{} {:3}uA {:5.1}us  {}   ",
                ch,
                data[i],
                baseline[i],
                i32::from(data[i]) - i32::from(baseline[i]),
                flag(touched, ch),
                gpio,
                RED,
                bar(data[i], baseline[i], touch, release),
                RESET,
                cdc,
                charge_time,
                flag(oor, ch),
            )?;
        }

        Ok(())
    }

    /// Writes the electrode status, and optionally all registers, to `out`.
    ///
    /// For each channel, this shows the electrode data, baseline, their
    /// difference, touch status, GPIO status, a bar graph, charge current,
    /// charge time and out of range status. Output uses ANSI colors.
    pub fn dump<W: Write>(&self, out: &mut W, regs: bool) -> Result<()> {
        let thresholds = self.thresholds()?;

        self.dump_frame(out, regs, &thresholds)
    }

    /// Repeats [`dump`] `rounds` times, every `delay`, overwriting the
    /// previous output in place.
    ///
    /// [`dump`]: #method.dump
    pub fn dump_loop<W: Write>(
        &self,
        out: &mut W,
        regs: bool,
        rounds: usize,
        delay: Duration,
    ) -> Result<()> {
        let thresholds = self.thresholds()?;

        for round in 0..rounds {
            if round > 0 {
                write!(out, "{}", LINE_UP.repeat(frame_lines(regs)))?;
            }

            self.dump_frame(out, regs, &thresholds)?;
            out.flush()?;

            thread::sleep(delay);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Bus, RegisterMap};
    use crate::mpr121::ADDRESS;

    fn strip_ansi(s: &str) -> String {
        let mut plain = String::new();
        let mut escape = false;

        for c in s.chars() {
            match c {
                '\x1b' => escape = true,
                'm' | 'F' if escape => escape = false,
                _ if escape => {}
                _ => plain.push(c),
            }
        }

        plain
    }

    #[test]
    fn bar_is_fixed_width() {
        let plain = strip_ansi(&bar(0x3ff, 0x3fc, 50, 30));
        assert_eq!(plain.chars().count(), 80);

        let plain = strip_ansi(&bar(512, 400, 50, 30));
        assert_eq!(plain.chars().count(), 80);
        assert_eq!(plain.find('|'), Some(31));
        assert!(plain.starts_with("===="));
        assert!(plain.ends_with("----"));
    }

    #[test]
    fn dump_lists_every_channel() {
        let map = RegisterMap::new();
        map.add_device(ADDRESS);
        map.set(ADDRESS, 0x00, 0b0000_0100);
        let mpr = Mpr121::new(Bus::with_smbus(map).device(ADDRESS));

        let mut out = Vec::new();
        mpr.dump(&mut out, true).unwrap();
        let text = strip_ansi(&String::from_utf8(out).unwrap());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), frame_lines(true));
        assert!(lines[0].starts_with("0x00 = 0x04 b00000100   4"));
        assert!(lines[35].starts_with(" 2:    0    0    0 (1) [-]"));
        assert!(lines[39].starts_with(" 6:    0    0    0 (0) [0]"));
    }

    #[test]
    fn dump_loop_moves_cursor_up() {
        let map = RegisterMap::new();
        map.add_device(ADDRESS);
        let mpr = Mpr121::new(Bus::with_smbus(map).device(ADDRESS));

        let mut out = Vec::new();
        mpr.dump_loop(&mut out, false, 2, Duration::from_millis(1))
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.matches(LINE_UP).count(), CHANNELS as usize + 1);
    }
}
