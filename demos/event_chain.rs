// event_chain.rs - Chains events together, and dispatches them on the event
// loop thread. A click counter on a button triggers a volume event, which
// fans out to a logger and an MPD client.
//
// Connect a push button between BCM GPIO 17 and ground. MPD is expected on
// localhost. Runs until a SIGINT (Ctrl-C) or SIGTERM signal is caught.
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
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use simple_signal::{self, Signal};

use piripherals::button::{Binding, ClickButton};
use piripherals::event::Event;
use piripherals::mpd::{Mpd, Volume, PORT};

const GPIO_BUTTON: u8 = 17;

fn main() -> Result<(), Box<dyn Error>> {
    let mut mpd = Mpd::new(80);
    mpd.connect("localhost", PORT)?;
    let mpd = Arc::new(Mutex::new(mpd));

    let volume: Event<i32> = Event::new("volume");
    volume.add(|change| println!("volume {:+}", change));
    volume.add({
        let mpd = mpd.clone();
        move |change| {
            let mut mpd = mpd.lock().unwrap_or_else(|e| e.into_inner());
            match mpd.set_volume(Volume::Relative(change)) {
                Ok(v) => println!("volume is now {}", v),
                Err(e) => eprintln!("volume change failed: {}", e),
            }
        }
    });

    // One click turns the volume up, two clicks turn it down.
    let clicks = volume.partial(|n: u32| if n == 1 { 5 } else { -5 });

    let toggle: Event<()> = Event::new("toggle");
    toggle.add({
        let mpd = mpd.clone();
        move |_| {
            let mut mpd = mpd.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = mpd.toggle_play() {
                eprintln!("toggle failed: {}", e);
            }
        }
    });

    // Handlers may talk to MPD, so queue them instead of blocking the
    // button sampling thread.
    let mut button = ClickButton::new();
    button.when_clicked(move |n| {
        if n > 0 {
            let _ = clicks.queue(n);
        }
    });
    button.when_held(move |_| {
        let _ = toggle.queue(());
    });

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
