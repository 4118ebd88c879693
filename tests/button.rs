// Samples click buttons from a fake interrupt input in place of a GPIO pin.
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

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use piripherals::button::{Binding, BoundButton, ClickButton};
use piripherals::gpio::{self, InterruptInput, Level};

struct FakeInput {
    level: Arc<Mutex<Level>>,
    edges: Receiver<()>,
    samples: Arc<Mutex<u32>>,
}

impl InterruptInput for FakeInput {
    fn wait_for_edge(&mut self, timeout: Option<Duration>) -> gpio::Result<bool> {
        let timeout = timeout.unwrap_or(Duration::from_secs(3600));

        match self.edges.recv_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                Ok(false)
            }
        }
    }

    fn level(&mut self) -> gpio::Result<Level> {
        *self.samples.lock().unwrap() += 1;
        Ok(*self.level.lock().unwrap())
    }
}

struct Wire {
    level: Arc<Mutex<Level>>,
    edges: Sender<()>,
    samples: Arc<Mutex<u32>>,
}

impl Wire {
    fn set(&self, level: Level) {
        *self.level.lock().unwrap() = level;
        self.edges.send(()).unwrap();
    }

    fn samples(&self) -> u32 {
        *self.samples.lock().unwrap()
    }
}

fn wire(idle: Level) -> (Wire, FakeInput) {
    let level = Arc::new(Mutex::new(idle));
    let samples = Arc::new(Mutex::new(0));
    let (edges, receiver) = mpsc::channel();

    (
        Wire {
            level: level.clone(),
            edges,
            samples: samples.clone(),
        },
        FakeInput {
            level,
            edges: receiver,
            samples,
        },
    )
}

fn binding(active_low: bool) -> Binding {
    Binding {
        active_low,
        delay: Duration::from_millis(2),
        count: 200,
        ..Binding::default()
    }
}

fn recording_button() -> (ClickButton, Arc<Mutex<Vec<String>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut button = ClickButton::new();

    let clicks = events.clone();
    button.when_clicked(move |n| clicks.lock().unwrap().push(format!("click {}", n)));
    let holds = events.clone();
    button.when_held(move |n| holds.lock().unwrap().push(format!("hold {}", n)));

    (button, events)
}

fn wait_for(events: &Arc<Mutex<Vec<String>>>, count: usize) {
    let start = Instant::now();
    while events.lock().unwrap().len() < count && start.elapsed() < Duration::from_secs(3) {
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn click_on_active_low_input() {
    let (wire, input) = wire(Level::High);
    let (button, events) = recording_button();
    let mut bound = BoundButton::bind_input(button, input, binding(true)).unwrap();

    wire.set(Level::Low);
    thread::sleep(Duration::from_millis(80));
    wire.set(Level::High);

    wait_for(&events, 1);
    bound.stop().unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["click 1".to_owned()]);
}

#[test]
fn double_click_on_active_high_input() {
    let (wire, input) = wire(Level::Low);
    let (button, events) = recording_button();
    let mut bound = BoundButton::bind_input(button, input, binding(false)).unwrap();

    for _ in 0..2 {
        wire.set(Level::High);
        thread::sleep(Duration::from_millis(60));
        wire.set(Level::Low);
        thread::sleep(Duration::from_millis(60));
    }

    wait_for(&events, 1);
    bound.stop().unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["click 2".to_owned()]);
}

#[test]
fn hold_is_reported_while_pressed() {
    let (wire, input) = wire(Level::High);
    let (button, events) = recording_button();
    let mut bound = BoundButton::bind_input(button, input, binding(true)).unwrap();

    wire.set(Level::Low);
    wait_for(&events, 1);
    assert!(bound.lock().is_held());

    wire.set(Level::High);
    thread::sleep(Duration::from_millis(400));
    bound.stop().unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["hold 0".to_owned()]);
}

#[test]
fn sampling_pauses_when_idle() {
    let (wire, input) = wire(Level::High);
    let (button, _events) = recording_button();
    let mut bound = BoundButton::bind_input(
        button,
        input,
        Binding {
            count: 5,
            ..binding(true)
        },
    )
    .unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(wire.samples(), 0);

    wire.set(Level::High);
    thread::sleep(Duration::from_millis(100));
    let samples = wire.samples();
    assert!(samples > 0 && samples <= 6, "{} samples", samples);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(wire.samples(), samples);

    bound.stop().unwrap();
}

#[test]
fn bouncing_edges_start_a_single_sampling_run() {
    let (wire, input) = wire(Level::High);
    let (button, events) = recording_button();
    let mut bound = BoundButton::bind_input(
        button,
        input,
        Binding {
            count: 5,
            ..binding(true)
        },
    )
    .unwrap();

    for _ in 0..10 {
        wire.set(Level::High);
    }

    thread::sleep(Duration::from_millis(100));
    let samples = wire.samples();
    assert!(samples > 0 && samples <= 6, "{} samples", samples);

    thread::sleep(Duration::from_millis(100));
    assert_eq!(wire.samples(), samples);

    bound.stop().unwrap();
    assert!(events.lock().unwrap().is_empty());
}
