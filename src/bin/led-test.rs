// led-test - Runs a short demo sequence on a WS281x (NeoPixel) strip
// connected to the MOSI pin of an SPI bus.
//
// usage: led-test [--bus N] [--ss N] [--count N]
//
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

use std::env;
use std::error::Error;
use std::process;
use std::thread;
use std::time::Duration;

use piripherals::led::{Animation, Color, ColorOrder, NeoPixels, Pixel, Ws281x};
use piripherals::spi::{Bus, SlaveSelect};

const USAGE: &str = "usage: led-test [--bus 0-6] [--ss 0-2] [--count N]";

#[derive(Debug)]
struct Args {
    bus: Bus,
    slave_select: SlaveSelect,
    count: usize,
}

fn value(flag: &str, value: Option<String>) -> Result<usize, String> {
    value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| format!("{} needs a number", flag))
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Args, String> {
    let mut parsed = Args {
        bus: Bus::Spi0,
        slave_select: SlaveSelect::Ss0,
        count: 1,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bus" => {
                parsed.bus = match value(&arg, args.next())? {
                    0 => Bus::Spi0,
                    1 => Bus::Spi1,
                    2 => Bus::Spi2,
                    3 => Bus::Spi3,
                    4 => Bus::Spi4,
                    5 => Bus::Spi5,
                    6 => Bus::Spi6,
                    n => return Err(format!("invalid bus: {}", n)),
                }
            }
            "--ss" => {
                parsed.slave_select = match value(&arg, args.next())? {
                    0 => SlaveSelect::Ss0,
                    1 => SlaveSelect::Ss1,
                    2 => SlaveSelect::Ss2,
                    n => return Err(format!("invalid slave select: {}", n)),
                }
            }
            "--count" => parsed.count = value(&arg, args.next())?,
            _ => return Err(format!("unknown option: {}", arg)),
        }
    }

    Ok(parsed)
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let strip = Ws281x::new(args.bus, args.slave_select, args.count, ColorOrder::Grb)?;
    let mut leds = NeoPixels::new(strip)?;

    leds.color(Pixel::All, Color::GREEN, None)?;
    thread::sleep(Duration::from_secs(1));

    leds.blink(
        "100",
        Some(Color::RED),
        Animation {
            period: 1.0,
            cycles: 3.0,
            wait: true,
            ..Animation::default()
        },
    )?;
    thread::sleep(Duration::from_secs(1));

    leds.sequence(
        &[
            Color::WHITE,
            Color::RED,
            Color::YELLOW,
            Color::GREEN,
            Color::CYAN,
            Color::BLUE,
            Color::MAGENTA,
        ],
        Animation {
            period: 2.0,
            cycles: 1.0,
            wait: true,
            ..Animation::default()
        },
    )?;
    thread::sleep(Duration::from_secs(1));

    leds.breathe(
        3.0,
        30.0,
        Some(Color::WHITE),
        Animation {
            period: 5.0,
            wait: true,
            ..Animation::default()
        },
    )?;

    Ok(())
}

fn main() {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
