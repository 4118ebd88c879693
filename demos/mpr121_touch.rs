// mpr121_touch.rs - Prints touch and release events of an MPR121 capacitive
// touch sensor on I2C bus 1, until a SIGINT (Ctrl-C) or SIGTERM signal is
// caught.
//
// The sensor's IRQ output is connected to BCM GPIO 4. The line is active low
// and open drain, and the internal pull-up is enabled.
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

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use simple_signal::{self, Signal};

use piripherals::bus::Bus;
use piripherals::mpr121::{Config, Handling, Mpr121};

const GPIO_IRQ: u8 = 4;

fn main() -> Result<(), Box<dyn Error>> {
    let bus = Bus::new(1)?;

    // Reset and configure the sensor with 12 electrodes, and read the touch
    // status whenever the IRQ line goes low.
    let mut mpr = Mpr121::with_config(
        &bus,
        Config {
            handling: Handling::Irq(GPIO_IRQ),
            ..Config::default()
        },
    )?;

    for channel in 0..12 {
        mpr.on_touch(channel, |touched, channel| {
            if touched {
                println!("{} touched", channel);
            } else {
                println!("{} released", channel);
            }
        })?;
    }

    let running = Arc::new(AtomicBool::new(true));

    simple_signal::set_handler(&[Signal::Int, Signal::Term], {
        let running = running.clone();
        move |_| {
            running.store(false, Ordering::SeqCst);
        }
    });

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    // Stop the interrupt thread before exiting.
    mpr.stop()?;

    Ok(())
}
