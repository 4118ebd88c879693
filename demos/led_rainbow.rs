// led_rainbow.rs - Cycles a strip of 30 WS281x (NeoPixel) LEDs through the
// colors of the rainbow, until a SIGINT (Ctrl-C) or SIGTERM signal is caught.
//
// The strip's data input is connected to the MOSI pin of SPI0 (BCM GPIO 10,
// physical pin 19). Most strips need a level shifter to reliably accept
// 3.3 V data.
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

use piripherals::led::{Animation, ColorOrder, NeoPixels, Ws281x};
use piripherals::spi::{Bus, SlaveSelect};

const PIXELS: usize = 30;

fn main() -> Result<(), Box<dyn Error>> {
    let strip = Ws281x::new(Bus::Spi0, SlaveSelect::Ss0, PIXELS, ColorOrder::Grb)?;
    let mut leds = NeoPixels::new(strip)?;

    leds.brightness(0.3)?;

    // One trip around the color wheel every 5 seconds, running in the
    // background until it's stopped.
    leds.rainbow(Animation {
        period: 5.0,
        ..Animation::default()
    })?;

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

    // Stopping the animation blanks the strip.
    leds.stop()?;

    Ok(())
}
