// button_clicks.rs - Detects clicks, double clicks and long presses on a
// push button connected to BCM GPIO 17, until a SIGINT (Ctrl-C) or SIGTERM
// signal is caught.
//
// The button connects the pin to ground when pressed. The internal pull-up
// keeps the pin high otherwise.
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

use piripherals::button::{Binding, ClickButton, Timing};

const GPIO_BUTTON: u8 = 17;

fn main() -> Result<(), Box<dyn Error>> {
    // Repeat the hold handler every 500 ms while the button is held down.
    let mut button = ClickButton::with_timing(Timing {
        hold_repeat: Duration::from_millis(500),
        ..Timing::default()
    });
    button.set_name("demo");

    button.on_click(1, || println!("click"));
    button.on_click(2, || println!("double click"));
    button.on_click(3, || println!("triple click"));
    button.on_hold(0, || println!("held"));
    button.on_hold(1, || println!("click and hold"));

    // Sample the button in the background. Sampling pauses while the
    // button is idle, and resumes on the next falling edge.
    let mut bound = button.bind(GPIO_BUTTON, Binding::default())?;

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

    bound.stop()?;

    Ok(())
}
