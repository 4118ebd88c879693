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

//! Debounced buttons with multi-click and hold detection.
//!
//! [`ClickButton`] turns a stream of raw pressed/released samples into
//! clicks, double clicks (or any number of clicks), holds and click-holds.
//! It doesn't care where the samples come from. Feed it with [`update`],
//! or [`bind`] it to a GPIO pin to have it sampled on a background thread.
//!
//! ## Terminology
//!
//! A sample that differs from the previous one *changes* the state. When the
//! state hasn't changed for longer than the click time, the button is *down*
//! (pressed) or *up* (released). Shorter glitches are filtered out, which
//! debounces the input.
//!
//! A click is *counted* when the button was pressed for longer than the click
//! time, and *fired* once it has been released for longer than the double
//! click time. Pressing again within the double click time counts another
//! click, so a double click fires a single event with a count of 2.
//!
//! The button is *held* after it was pressed for longer than the hold time.
//! The hold event carries the number of clicks counted right before, so a
//! click followed by a hold is reported as a hold with a count of 1. With a
//! non-zero hold repeat, hold events keep firing while the button stays down.
//!
//! ```
//! use std::time::{Duration, Instant};
//!
//! use piripherals::button::ClickButton;
//!
//! let mut button = ClickButton::new();
//! button.on_click(2, || println!("double click"));
//!
//! let t0 = Instant::now();
//! let ms = |ms| t0 + Duration::from_millis(ms);
//!
//! button.update_at(true, ms(0));
//! button.update_at(false, ms(50));
//! button.update_at(true, ms(100));
//! button.update_at(false, ms(150));
//!
//! // Fires the double click handler
//! button.update_at(false, ms(400));
//! ```
//!
//! [`ClickButton`]: struct.ClickButton.html
//! [`update`]: struct.ClickButton.html#method.update
//! [`bind`]: struct.ClickButton.html#method.bind

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::io;
use std::result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::gpio::{self, Bias, InputPin, InterruptInput, Level, Trigger};
use crate::util::{self, guarded, stop_requested, Worker};

// Upper bound for a blocking wait, so a stop request is noticed in time
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that can occur when binding a button to an input.
#[derive(Debug)]
pub enum Error {
    /// GPIO error.
    Gpio(gpio::Error),
    /// I/O error.
    Io(io::Error),
    /// Thread panicked.
    ThreadPanic,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Gpio(ref err) => write!(f, "GPIO error: {}", err),
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
            Error::ThreadPanic => write!(f, "Thread panicked"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Gpio(ref err) => Some(err),
            Error::Io(ref err) => Some(err),
            Error::ThreadPanic => None,
        }
    }
}

impl From<gpio::Error> for Error {
    fn from(err: gpio::Error) -> Error {
        Error::Gpio(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<util::Error> for Error {
    fn from(err: util::Error) -> Error {
        match err {
            util::Error::Gpio(err) => Error::Gpio(err),
            util::Error::Io(err) => Error::Io(err),
            util::Error::ThreadPanic => Error::ThreadPanic,
        }
    }
}

/// Result type returned from methods that can have `button::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Timing parameters of a [`ClickButton`].
///
/// [`ClickButton`]: struct.ClickButton.html
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Timing {
    /// Time a state has to be stable to count. Debounces the input.
    pub click: Duration,
    /// Maximum time between two clicks of a multi-click.
    pub double_click: Duration,
    /// Time the button has to be down to be held.
    pub hold: Duration,
    /// Interval between repeated hold events. Zero disables repeating.
    pub hold_repeat: Duration,
}

impl Default for Timing {
    fn default() -> Timing {
        Timing {
            click: Duration::from_millis(25),
            double_click: Duration::from_millis(200),
            hold: Duration::from_secs(1),
            hold_repeat: Duration::ZERO,
        }
    }
}

/// How a bound button samples its input.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Binding {
    /// A low level means pressed.
    pub active_low: bool,
    /// Built-in resistor of the input pin.
    pub bias: Bias,
    /// Interval between two samples.
    pub delay: Duration,
    /// Number of samples taken after the button was released, before
    /// sampling pauses until the next edge.
    pub count: u32,
}

impl Default for Binding {
    fn default() -> Binding {
        Binding {
            active_low: true,
            bias: Bias::PullUp,
            delay: Duration::from_millis(10),
            count: 100,
        }
    }
}

type CountHandler = Box<dyn FnMut(u32) + Send>;
type Handler = Box<dyn FnMut() + Send>;

/// A button with debouncing, multi-click and hold detection.
///
/// Setting a catch-all handler with [`when_clicked`] or [`when_held`]
/// replaces any per-count handlers registered with [`on_click`] or
/// [`on_hold`] respectively. There's either a single click (hold) handler,
/// or one for each number of clicks.
///
/// [`when_clicked`]: #method.when_clicked
/// [`when_held`]: #method.when_held
/// [`on_click`]: #method.on_click
/// [`on_hold`]: #method.on_hold
pub struct ClickButton {
    name: Option<String>,
    timing: Timing,
    pressed: bool,
    held: bool,
    down: bool,
    time: Option<Instant>,
    clicks: u32,
    when_clicked: Option<CountHandler>,
    when_held: Option<CountHandler>,
    click_handlers: HashMap<u32, Handler>,
    hold_handlers: HashMap<u32, Handler>,
}

impl fmt::Debug for ClickButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickButton")
            .field("name", &self.name)
            .field("timing", &self.timing)
            .field("pressed", &self.pressed)
            .field("held", &self.held)
            .field("down", &self.down)
            .field("clicks", &self.clicks)
            .finish()
    }
}

impl fmt::Display for ClickButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or("ClickButton"))
    }
}

impl Default for ClickButton {
    fn default() -> ClickButton {
        ClickButton::with_timing(Timing::default())
    }
}

impl ClickButton {
    /// Constructs a new `ClickButton` with the default timing.
    pub fn new() -> ClickButton {
        ClickButton::default()
    }

    pub fn with_timing(timing: Timing) -> ClickButton {
        ClickButton {
            name: None,
            timing,
            pressed: false,
            held: false,
            down: false,
            time: None,
            clicks: 0,
            when_clicked: None,
            when_held: None,
            click_handlers: HashMap::new(),
            hold_handlers: HashMap::new(),
        }
    }

    /// Sets the name used by `Display`.
    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_owned());
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Sets the handler for all clicks. It receives the number of clicks.
    pub fn when_clicked<F>(&mut self, handler: F)
    where
        F: FnMut(u32) + Send + 'static,
    {
        self.when_clicked = Some(Box::new(handler));
    }

    /// Sets the handler for all holds. It receives the number of clicks
    /// preceding the hold.
    pub fn when_held<F>(&mut self, handler: F)
    where
        F: FnMut(u32) + Send + 'static,
    {
        self.when_held = Some(Box::new(handler));
    }

    /// Registers the handler for `n` clicks. 1 is a single click, 2 a double click.
    pub fn on_click<F>(&mut self, n: u32, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.click_handlers.insert(n, Box::new(handler));
    }

    /// Registers the handler for a hold after `n` clicks. 0 is a plain hold,
    /// 1 a click followed by a hold.
    pub fn on_hold<F>(&mut self, n: u32, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.hold_handlers.insert(n, Box::new(handler));
    }

    fn clicked(&mut self, n: u32) {
        log::trace!("{} clicked {}x", self, n);

        if let Some(handler) = self.when_clicked.as_mut() {
            guarded("click handler", || handler(n));
        } else if let Some(handler) = self.click_handlers.get_mut(&n) {
            guarded("click handler", handler);
        }
    }

    fn held(&mut self, n: u32) {
        log::trace!("{} held after {} clicks", self, n);

        if let Some(handler) = self.when_held.as_mut() {
            guarded("hold handler", || handler(n));
        } else if let Some(handler) = self.hold_handlers.get_mut(&n) {
            guarded("hold handler", handler);
        }
    }

    /// Updates the state with a sample taken at `now`.
    ///
    /// Click and hold detection depends on being updated regularly, also
    /// when the sample is the same as before.
    pub fn update_at(&mut self, pressed: bool, now: Instant) {
        let was_pressed = self.pressed;
        let dt = self
            .time
            .map_or(Duration::MAX, |time| now.saturating_duration_since(time));

        if dt > self.timing.click {
            self.down = pressed;
        }

        if !was_pressed {
            if pressed {
                self.pressed = true;
                self.time = Some(now);
            } else if self.clicks > 0 && dt > self.timing.double_click {
                let clicks = self.clicks;
                self.clicks = 0;
                self.clicked(clicks);
            }
        } else if pressed {
            if self.held {
                if !self.timing.hold_repeat.is_zero() && dt > self.timing.hold_repeat {
                    self.time = Some(now);
                    self.held(self.clicks);
                }
            } else if dt > self.timing.hold {
                self.held = true;
                self.time = Some(now);
                self.held(self.clicks);
            }
        } else {
            if self.held {
                self.clicks = 0;
            } else if dt > self.timing.click {
                self.clicks += 1;
            }

            self.pressed = false;
            self.held = false;
            self.time = Some(now);
        }
    }

    /// Updates the state with a sample taken right now.
    pub fn update(&mut self, pressed: bool) {
        self.update_at(pressed, Instant::now());
    }

    pub fn press(&mut self) {
        self.update(true);
    }

    pub fn release(&mut self) {
        self.update(false);
    }

    /// Returns `true` if the button has been pressed for longer than the click time.
    pub fn is_down(&self) -> bool {
        self.down
    }

    /// Returns `true` if the button has been released for longer than the click time.
    pub fn is_up(&self) -> bool {
        !self.down
    }

    /// Returns `true` if the button has been pressed for longer than the hold time.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Returns `true` if the last sample was pressed.
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Binds the button to a GPIO pin.
    ///
    /// Sampling only runs on demand. It starts on an edge, and pauses again
    /// after `binding.count` samples without the button being pressed.
    pub fn bind(self, pin: u8, binding: Binding) -> Result<BoundButton> {
        let trigger = if binding.active_low {
            Trigger::FallingEdge
        } else {
            Trigger::RisingEdge
        };

        let input = InputPin::new(pin, binding.bias, trigger)?;

        BoundButton::bind_input(self, input, binding)
    }
}

fn drain_edges<I: InterruptInput>(input: &mut I) {
    let mut drained = 0;
    while let Ok(true) = input.wait_for_edge(Some(Duration::ZERO)) {
        drained += 1;
    }

    if drained > 0 {
        log::trace!("Dropped {} stale button edges", drained);
    }
}

/// A [`ClickButton`] sampled by a background thread.
///
/// The thread is stopped when `BoundButton` goes out of scope.
///
/// [`ClickButton`]: struct.ClickButton.html
#[derive(Debug)]
pub struct BoundButton {
    button: Arc<Mutex<ClickButton>>,
    worker: Worker,
}

impl BoundButton {
    /// Samples `button` from `input` on a background thread.
    ///
    /// `binding.bias` is ignored, `input` is expected to be configured.
    pub fn bind_input<I>(button: ClickButton, mut input: I, binding: Binding) -> Result<BoundButton>
    where
        I: InterruptInput + 'static,
    {
        let pressed_level = if binding.active_low {
            Level::Low
        } else {
            Level::High
        };

        let button = Arc::new(Mutex::new(button));
        let sampled = button.clone();

        let worker = Worker::spawn("button", move |stop| {
            // Remaining samples before sampling pauses, None while paused
            let mut remaining: Option<u32> = None;

            loop {
                if remaining.is_none() {
                    match input.wait_for_edge(Some(STOP_CHECK_INTERVAL)) {
                        Ok(true) => remaining = Some(binding.count),
                        Ok(false) => {
                            if stop_requested(&stop, Duration::ZERO) {
                                break;
                            }
                            continue;
                        }
                        Err(e) => {
                            log::warn!("waiting for button edge failed: {}", e);
                            if stop_requested(&stop, STOP_CHECK_INTERVAL) {
                                break;
                            }
                            continue;
                        }
                    }
                }

                match input.level() {
                    Ok(level) => {
                        let mut button = sampled.lock().unwrap_or_else(PoisonError::into_inner);
                        button.update(level == pressed_level);

                        remaining = if button.is_pressed() {
                            Some(binding.count)
                        } else {
                            remaining.and_then(|n| n.checked_sub(1))
                        };
                    }
                    Err(e) => {
                        log::warn!("reading button level failed: {}", e);
                        remaining = None;
                    }
                }

                // Edges queued while sampling are stale once sampling pauses
                if remaining.is_none() {
                    drain_edges(&mut input);
                }

                if stop_requested(&stop, binding.delay) {
                    break;
                }
            }
        })?;

        Ok(BoundButton { button, worker })
    }

    /// Returns locked access to the button, e.g. to change its handlers.
    pub fn lock(&self) -> MutexGuard<'_, ClickButton> {
        self.button.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops sampling and waits for the thread to exit.
    pub fn stop(&mut self) -> Result<()> {
        Ok(self.worker.stop()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = 10;
    const D: u64 = 3 * T;
    const H: u64 = 10 * T;
    const R: u64 = 5 * T;

    struct Fixture {
        button: ClickButton,
        clicked: Arc<Mutex<Vec<u32>>>,
        held: Arc<Mutex<Vec<u32>>>,
        t0: Instant,
    }

    impl Fixture {
        fn new() -> Fixture {
            let mut button = ClickButton::with_timing(Timing {
                click: Duration::from_millis(T),
                double_click: Duration::from_millis(D),
                hold: Duration::from_millis(H),
                hold_repeat: Duration::from_millis(R),
            });

            let clicked = Arc::new(Mutex::new(Vec::new()));
            let c = clicked.clone();
            button.when_clicked(move |n| c.lock().unwrap().push(n));

            let held = Arc::new(Mutex::new(Vec::new()));
            let h = held.clone();
            button.when_held(move |n| h.lock().unwrap().push(n));

            Fixture {
                button,
                clicked,
                held,
                t0: Instant::now(),
            }
        }

        // Sample at ms, slightly after the nominal time like a real sleep
        fn at(&mut self, ms: u64, pressed: bool) -> &ClickButton {
            let now = self.t0 + Duration::from_millis(ms) + Duration::from_micros(100);
            self.button.update_at(pressed, now);
            &self.button
        }

        fn clicked(&self) -> Vec<u32> {
            self.clicked.lock().unwrap().clone()
        }

        fn held(&self) -> Vec<u32> {
            self.held.lock().unwrap().clone()
        }
    }

    #[test]
    fn debounce() {
        let mut f = Fixture::new();

        // Spurious press
        assert!(f.at(0, true).is_down());
        assert!(f.at(T / 2, false).is_down());
        assert!(f.at(T / 2 + T + 1, false).is_up());

        // Bouncing contacts keep the first stable state
        let mut t = 5 * T;
        for _ in 0..10 {
            assert!(f.at(t, true).is_down());
            assert!(f.at(t + T / 2, false).is_down());
            t += T;
        }
        assert!(f.at(t + T, false).is_up());

        assert!(f.clicked().is_empty());
        assert!(f.held().is_empty());
    }

    #[test]
    fn single_click() {
        let mut f = Fixture::new();

        assert!(f.at(0, true).is_down());
        assert!(f.at(T + 1, false).is_up());
        f.at(2 * T, false);
        f.at(4 * T + 1, false);
        assert!(f.clicked().is_empty());

        f.at(4 * T + 2, false);
        assert_eq!(f.clicked(), vec![1]);
        assert!(f.held().is_empty());
    }

    #[test]
    fn double_click() {
        let mut f = Fixture::new();

        f.at(0, true);
        f.at(T + 1, false);
        assert!(f.at(2 * T + 2, true).is_down());
        assert!(f.at(3 * T + 3, false).is_up());
        assert!(f.clicked().is_empty());

        f.at(3 * T + 3 + D + 1, false);
        assert_eq!(f.clicked(), vec![2]);
        assert!(f.held().is_empty());
    }

    #[test]
    fn hold() {
        let mut f = Fixture::new();

        f.at(0, true);
        assert!(!f.at(H, true).is_held());
        assert!(f.at(H + 1, true).is_held());
        f.at(H + T + 2, false);
        f.at(H + T + D + 3, false);

        assert_eq!(f.held(), vec![0]);
        assert!(f.clicked().is_empty());
    }

    #[test]
    fn hold_repeat() {
        let mut f = Fixture::new();

        f.at(0, true);
        f.at(H + 1, true);
        assert_eq!(f.held(), vec![0]);
        f.at(H + 1 + T, true);
        assert_eq!(f.held(), vec![0]);
        f.at(H + 2 + R, true);
        assert_eq!(f.held(), vec![0, 0]);
        f.at(H + 3 + 2 * R, true);
        assert_eq!(f.held(), vec![0, 0, 0]);
        assert!(f.clicked().is_empty());
    }

    #[test]
    fn click_hold() {
        let mut f = Fixture::new();

        f.at(0, true);
        f.at(T + 1, false);
        f.at(2 * T + 1, true);
        f.at(2 * T + H + 2, true);

        assert_eq!(f.held(), vec![1]);
        assert!(f.clicked().is_empty());
    }

    #[test]
    fn catch_all_handler_overrides_per_count_handlers() {
        let mut button = ClickButton::with_timing(Timing {
            click: Duration::from_millis(T),
            double_click: Duration::from_millis(D),
            ..Timing::default()
        });

        let single = Arc::new(Mutex::new(0));
        let s = single.clone();
        button.on_click(1, move || *s.lock().unwrap() += 1);
        button.on_click(2, || panic!("not a double click"));

        let t0 = Instant::now();
        let ms = |ms| t0 + Duration::from_millis(ms);
        button.update_at(true, ms(0));
        button.update_at(false, ms(2 * T));
        button.update_at(false, ms(2 * T + D + 1));
        assert_eq!(*single.lock().unwrap(), 1);

        let all = Arc::new(Mutex::new(Vec::new()));
        let a = all.clone();
        button.when_clicked(move |n| a.lock().unwrap().push(n));
        button.update_at(true, ms(100));
        button.update_at(false, ms(100 + 2 * T));
        button.update_at(false, ms(100 + 2 * T + D + 1));

        assert_eq!(*single.lock().unwrap(), 1);
        assert_eq!(*all.lock().unwrap(), vec![1]);
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let mut button = ClickButton::new();
        button.when_clicked(|_| panic!("handler failed"));

        let t0 = Instant::now();
        let ms = |ms| t0 + Duration::from_millis(ms);
        button.update_at(true, ms(0));
        button.update_at(false, ms(100));
        button.update_at(false, ms(400));

        assert!(button.is_up());
        button.update_at(true, ms(500));
        assert!(button.is_pressed());
    }
}
