// mpr121-dump - Shows the status of an MPR121 touch sensor, logs touch
// events, or scans an I2C bus for devices.
//
// Run with --help for a list of options.
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
use std::io;
use std::process;
use std::thread;
use std::time::Duration;

use piripherals::bus::Bus;
use piripherals::mpr121::{Config, Handling, Mpr121, Proximity, Setup, ADDRESS, CHANNELS};

const USAGE: &str = "\
usage: mpr121-dump [options]

MPR121 register and status dump

options:
  -a, --address ADDR    device address (default 0x5a)
  -p, --prox N          enable proximity, 0-3 (default 0)
  -T, --threshold N     touch threshold (default 50)
  -c, --channels N      number of channels (default 12)
  -q, --irq PIN         GPIO pin of the IRQ line, 0 polls (default 0)
  -b, --bus N           I2C bus (default 1)
  -r, --regs            dump registers
  -t, --touch           log touch events instead of dumping
  -A, --no-auto         no charge auto configuration
  -R, --no-reset        no initial reset
  -S, --no-setup        no initial setup
  -B, --scan-bus        scan bus for devices
  -h, --help            show this help";

const DUMP_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Args {
    address: u16,
    prox: u8,
    threshold: u8,
    channels: u8,
    irq: u8,
    bus: u8,
    regs: bool,
    touch: bool,
    auto_config: bool,
    reset: bool,
    setup: bool,
    scan_bus: bool,
}

impl Default for Args {
    fn default() -> Args {
        Args {
            address: ADDRESS,
            prox: 0,
            threshold: 50,
            channels: 12,
            irq: 0,
            bus: 1,
            regs: false,
            touch: false,
            auto_config: true,
            reset: true,
            setup: true,
            scan_bus: false,
        }
    }
}

// Accepts decimal and 0x prefixed hexadecimal numbers
fn number<T: TryFrom<u32>>(flag: &str, value: Option<String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} needs a value", flag))?;

    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };

    parsed
        .ok()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| format!("invalid value for {}: {}", flag, value))
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Option<Args>, String> {
    let mut parsed = Args::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-a" | "--address" => parsed.address = number(&arg, args.next())?,
            "-p" | "--prox" => parsed.prox = number(&arg, args.next())?,
            "-T" | "--threshold" => parsed.threshold = number(&arg, args.next())?,
            "-c" | "--channels" => parsed.channels = number(&arg, args.next())?,
            "-q" | "--irq" => parsed.irq = number(&arg, args.next())?,
            "-b" | "--bus" => parsed.bus = number(&arg, args.next())?,
            "-r" | "--regs" => parsed.regs = true,
            "-t" | "--touch" => parsed.touch = true,
            "-A" | "--no-auto" => parsed.auto_config = false,
            "-R" | "--no-reset" => parsed.reset = false,
            "-S" | "--no-setup" => parsed.setup = false,
            "-B" | "--scan-bus" => parsed.scan_bus = true,
            "-h" | "--help" => return Ok(None),
            _ => return Err(format!("unknown option: {}", arg)),
        }
    }

    Ok(Some(parsed))
}

fn proximity(prox: u8) -> Result<Proximity, String> {
    match prox {
        0 => Ok(Proximity::Disabled),
        1 => Ok(Proximity::Electrodes0To1),
        2 => Ok(Proximity::Electrodes0To3),
        3 => Ok(Proximity::Electrodes0To11),
        _ => Err(format!("invalid proximity mode: {}", prox)),
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let bus = Bus::new(args.bus)?;

    if args.scan_bus {
        println!("used addresses");
        for address in bus.scan() {
            println!("0x{:02x}", address);
        }

        return Ok(());
    }

    let setup = if args.setup {
        Some(Setup {
            reset: args.reset,
            channels: args.channels,
            prox: proximity(args.prox)?,
            threshold: args.threshold,
            auto_config: args.auto_config,
            ..Setup::default()
        })
    } else {
        None
    };

    let handling = match (args.touch, args.irq) {
        (false, _) => Handling::Manual,
        (true, 0) => Handling::default(),
        (true, pin) => Handling::Irq(pin),
    };

    let mpr = Mpr121::with_config(
        &bus,
        Config {
            address: args.address,
            handling,
            setup,
            reset: args.reset,
        },
    )?;

    if args.touch {
        println!("touch events");
        for channel in 0..CHANNELS {
            mpr.on_touch(channel, |touched, channel| println!("{} {}", channel, touched))?;
        }

        loop {
            thread::park();
        }
    }

    let stdout = io::stdout();
    mpr.dump_loop(&mut stdout.lock(), args.regs, usize::MAX, DUMP_DELAY)?;

    Ok(())
}

fn main() {
    let args = match parse_args(env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{}", USAGE);
            return;
        }
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
