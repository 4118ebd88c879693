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

//! Addressable RGB LED strips with animations.
//!
//! [`NeoPixels`] controls a [`Strip`] and runs animations on a background
//! thread. Only one animation runs at a time. Starting a new animation, or
//! setting a color, stops the one that's running.
//!
//! An animation is a function called every frame with the strip, the time
//! `t` in seconds since it started, and the phase `s` within the current
//! cycle (`0.0..1.0`). The strip is shown after each frame. The built-in
//! animations ([`rainbow`], [`breathe`], [`blink`] and [`sequence`]) turn
//! all pixels off and restore full brightness when they end.
//!
//! [`Ws281x`] drives WS2811/WS2812 strips through the MOSI pin of an SPI
//! bus. Any other hardware can be used by implementing [`Strip`].
//!
//! ## Examples
//!
//! ```no_run
//! use piripherals::led::{Animation, ColorOrder, NeoPixels, Pixel, Ws281x, Color};
//! use piripherals::spi::{Bus, SlaveSelect};
//!
//! # fn main() -> piripherals::led::Result<()> {
//! let strip = Ws281x::new(Bus::Spi0, SlaveSelect::Ss0, 8, ColorOrder::Grb)?;
//! let mut pixels = NeoPixels::new(strip)?;
//!
//! pixels.color(Pixel::All, Color::GREEN, Some(0.5))?;
//!
//! // Blink red 3 times and wait until it's done
//! pixels.blink(
//!     "100",
//!     Some(Color::RED),
//!     Animation {
//!         period: 1.0,
//!         cycles: 3.0,
//!         wait: true,
//!         ..Default::default()
//!     },
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! [`NeoPixels`]: struct.NeoPixels.html
//! [`Strip`]: trait.Strip.html
//! [`Ws281x`]: struct.Ws281x.html
//! [`rainbow`]: struct.NeoPixels.html#method.rainbow
//! [`breathe`]: struct.NeoPixels.html#method.breathe
//! [`blink`]: struct.NeoPixels.html#method.blink
//! [`sequence`]: struct.NeoPixels.html#method.sequence

use std::error;
use std::f64::consts::PI;
use std::fmt;
use std::io;
use std::result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::spi;
use crate::util::guarded;

mod ws281x;

pub use self::ws281x::{ColorOrder, Ws281x, CLOCK_SPEED};

// How often a waiting caller checks whether the animation thread is alive
const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that can occur when controlling an LED strip.
#[derive(Debug)]
pub enum Error {
    /// SPI error.
    Spi(spi::Error),
    /// I/O error.
    Io(io::Error),
    /// The pixel index is outside the strip.
    PixelOutOfRange(isize),
    /// Waiting for an animation that never ends.
    ///
    /// Returned by `animate` when `wait` is set without a timeout or cycles.
    InfiniteWait,
    /// The blink pattern contains a value that isn't a number.
    InvalidPattern(String),
    /// Thread panicked.
    ThreadPanic,
    /// The animation thread isn't running.
    Disconnected,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Spi(ref err) => write!(f, "SPI error: {}", err),
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
            Error::PixelOutOfRange(index) => write!(f, "Pixel index out of range: {}", index),
            Error::InfiniteWait => write!(f, "Waiting for an endless animation"),
            Error::InvalidPattern(ref pattern) => write!(f, "Invalid blink pattern: {}", pattern),
            Error::ThreadPanic => write!(f, "Thread panicked"),
            Error::Disconnected => write!(f, "Animation thread not running"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Spi(ref err) => Some(err),
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<spi::Error> for Error {
    fn from(err: spi::Error) -> Error {
        Error::Spi(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Result type returned from methods that can have `led::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// An RGB color with components in `0.0..=1.0`.
///
/// Components outside that range are clamped when the color is converted.
#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const YELLOW: Color = Color::rgb(1.0, 1.0, 0.0);
    pub const CYAN: Color = Color::rgb(0.0, 1.0, 1.0);
    pub const MAGENTA: Color = Color::rgb(1.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Color {
        Color { r, g, b }
    }

    /// A gray level, all components set to `v`.
    pub const fn gray(v: f32) -> Color {
        Color { r: v, g: v, b: v }
    }

    /// Converts to 8-bit components.
    pub fn to_rgb8(self) -> (u8, u8, u8) {
        (level(self.r), level(self.g), level(self.b))
    }
}

fn level(x: f32) -> u8 {
    (255.0 * x.max(0.0).min(1.0)) as u8
}

/// A strip of RGB pixels.
///
/// Changes to pixels and brightness only become visible after `show`.
pub trait Strip: Send {
    /// Number of pixels.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sets the color of pixel `index`. Out of range indices are ignored.
    fn set_pixel(&mut self, index: usize, rgb: (u8, u8, u8));

    fn brightness(&self) -> u8;

    /// Sets the global brightness applied to all pixels.
    fn set_brightness(&mut self, brightness: u8);

    /// Sends the pixel data to the strip.
    fn show(&mut self) -> Result<()>;
}

/// Selects pixels of a strip.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Pixel {
    /// All pixels.
    All,
    /// A single pixel. Negative indices count from the end, `-1` is the last pixel.
    Index(isize),
}

impl Pixel {
    fn resolve(self, len: usize) -> Result<std::ops::Range<usize>> {
        match self {
            Pixel::All => Ok(0..len),
            Pixel::Index(index) => {
                let resolved = if index < 0 {
                    len as isize + index
                } else {
                    index
                };

                if resolved < 0 || resolved >= len as isize {
                    return Err(Error::PixelOutOfRange(index));
                }

                Ok(resolved as usize..resolved as usize + 1)
            }
        }
    }
}

/// Timing options of an animation.
///
/// `period` takes precedence over `freq`, and `cycles` over `timeout`. A
/// zero value means unset. Without a timeout or cycles, the animation runs
/// until it's stopped.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct Animation {
    /// Cycles per second.
    pub freq: f64,
    /// Seconds per cycle.
    pub period: f64,
    /// Duration in seconds.
    pub timeout: f64,
    /// Number of cycles to run.
    pub cycles: f64,
    /// Delay between two frames.
    pub delay: Duration,
    /// Block until the animation has finished.
    pub wait: bool,
}

impl Default for Animation {
    fn default() -> Animation {
        Animation {
            freq: 1.0,
            period: 0.0,
            timeout: 0.0,
            cycles: 0.0,
            delay: Duration::from_millis(10),
            wait: false,
        }
    }
}

impl Animation {
    /// Effective frequency in Hz.
    pub fn frequency(&self) -> f64 {
        if self.period > 0.0 {
            1.0 / self.period
        } else {
            self.freq
        }
    }

    /// Effective duration in seconds, 0 for an endless animation.
    pub fn duration(&self) -> f64 {
        if self.cycles > 0.0 {
            self.cycles / self.frequency()
        } else {
            self.timeout
        }
    }
}

/// Maps a position `p` in `0.0..1.0` to a color of the rainbow.
///
/// Red at 0, green at 1/3, blue at 2/3 and back to red.
pub fn wheel(p: f64) -> (u8, u8, u8) {
    let a = 3.0 * p.rem_euclid(1.0 / 3.0);
    let (c1, c2, c3) = ((255.0 * (1.0 - a)) as u8, (255.0 * a) as u8, 0);

    match (3.0 * p) as i64 {
        0 => (c1, c2, c3),
        1 => (c3, c1, c2),
        _ => (c2, c3, c1),
    }
}

/// Brightness of the breathe animation at time `t` and phase `s`.
///
/// `n` shapes the curve, larger values give shorter flashes. With a `fade`
/// time in seconds, the level decreases linearly to 0 over that time.
pub fn breathe_level(n: f64, fade: f64, t: f64, s: f64) -> f64 {
    let a = (-n).exp();
    let b = 1.0 / (n.exp() - (-n).exp());
    let h = if fade > 0.0 { 1.0 - t / fade } else { 1.0 };

    b * ((-n * (2.0 * PI * s).cos()).exp() - a) * h
}

/// Parses a blink pattern.
///
/// Levels are space separated numbers (`"1 0.3 1 0"`), or single digits
/// without spaces (`"100"`). They're clamped to `0.0..=1.0`.
pub fn blink_pattern(pattern: &str) -> Result<Vec<f32>> {
    let parse = |s: &str| {
        s.parse::<f32>()
            .map(|v| v.max(0.0).min(1.0))
            .map_err(|_| Error::InvalidPattern(pattern.to_owned()))
    };

    let levels = if pattern.contains(' ') {
        pattern
            .split_whitespace()
            .map(parse)
            .collect::<Result<Vec<f32>>>()?
    } else {
        pattern
            .chars()
            .map(|c| parse(c.encode_utf8(&mut [0; 4])))
            .collect::<Result<Vec<f32>>>()?
    };

    if levels.is_empty() {
        return Err(Error::InvalidPattern(pattern.to_owned()));
    }

    Ok(levels)
}

// Index of the entry for phase s in a non-empty slice
fn step<T>(steps: &[T], s: f64) -> usize {
    ((s * steps.len() as f64) as usize).min(steps.len() - 1)
}

/// Color of the sequence animation at phase `s`.
///
/// Each color is shown for an equal share of the cycle, without fading.
pub fn sequence_color(colors: &[Color], s: f64) -> Color {
    if colors.is_empty() {
        return Color::BLACK;
    }

    colors[step(colors, s)]
}

/// Called every frame with the strip, the time since start and the cycle phase.
pub type Frame<S> = Box<dyn FnMut(&mut S, f64, f64) -> Result<()> + Send>;

/// Called when an animation ends.
pub type AtExit<S> = Box<dyn FnOnce(&mut S) -> Result<()> + Send>;

struct Job<S> {
    frame: Frame<S>,
    atexit: Option<AtExit<S>>,
    freq: f64,
    timeout: f64,
    delay: Duration,
}

enum Msg<S> {
    Run(Job<S>),
    Exit,
}

struct Shared<S> {
    strip: Mutex<S>,
    running: AtomicBool,
    busy: Mutex<bool>,
    idle: Condvar,
}

impl<S> Shared<S> {
    fn strip(&self) -> MutexGuard<'_, S> {
        self.strip.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn busy(&self) -> MutexGuard<'_, bool> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_busy(&self, busy: bool) {
        *self.busy() = busy;
        self.idle.notify_all();
    }
}

fn run_animation<S: Strip>(shared: &Shared<S>, job: Job<S>) {
    let Job {
        mut frame,
        atexit,
        freq,
        timeout,
        delay,
    } = job;

    log::debug!("Animation started at {} Hz, timeout {} s", freq, timeout);

    let start = Instant::now();
    while shared.running.load(Ordering::SeqCst) {
        let t = start.elapsed().as_secs_f64();
        if timeout > 0.0 && t > timeout {
            break;
        }

        let s = (t * freq).rem_euclid(1.0);

        let result = guarded("animation", || {
            let mut strip = shared.strip();
            frame(&mut *strip, t, s)?;
            strip.show()
        });

        match result {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                log::warn!("Animation failed: {}", e);
                break;
            }
            None => break,
        }

        thread::sleep(delay);
    }

    shared.running.store(false, Ordering::SeqCst);

    if let Some(atexit) = atexit {
        if let Some(Err(e)) = guarded("animation exit", || atexit(&mut *shared.strip())) {
            log::warn!("Animation exit failed: {}", e);
        }
    }

    log::debug!("Animation stopped");
}

fn animation_loop<S: Strip>(shared: Arc<Shared<S>>, receiver: Receiver<Msg<S>>) {
    while let Ok(Msg::Run(job)) = receiver.recv() {
        run_animation(&shared, job);
        shared.set_busy(false);
    }
}

// Turns all pixels off at full brightness
fn blank<S: Strip>(strip: &mut S) -> Result<()> {
    for i in 0..strip.len() {
        strip.set_pixel(i, (0, 0, 0));
    }
    strip.set_brightness(255);

    strip.show()
}

fn blank_at_exit<S: Strip + 'static>() -> Option<AtExit<S>> {
    let atexit: AtExit<S> = Box::new(blank::<S>);

    Some(atexit)
}

/// Controls a [`Strip`] and runs animations on it.
///
/// The animation thread is stopped when `NeoPixels` goes out of scope.
///
/// [`Strip`]: trait.Strip.html
pub struct NeoPixels<S: Strip + 'static> {
    shared: Arc<Shared<S>>,
    sender: Sender<Msg<S>>,
    thread: Option<thread::JoinHandle<()>>,
    auto_show: bool,
}

impl<S: Strip + 'static> fmt::Debug for NeoPixels<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeoPixels")
            .field("len", &self.len())
            .field("auto_show", &self.auto_show)
            .field("animating", &self.is_animating())
            .finish()
    }
}

impl<S: Strip + 'static> NeoPixels<S> {
    /// Shows the strip as it is, usually blank, and starts the animation thread.
    pub fn new(mut strip: S) -> Result<NeoPixels<S>> {
        strip.show()?;

        let shared = Arc::new(Shared {
            strip: Mutex::new(strip),
            running: AtomicBool::new(false),
            busy: Mutex::new(false),
            idle: Condvar::new(),
        });

        let (sender, receiver) = mpsc::channel();
        let animated = shared.clone();
        let thread = thread::Builder::new()
            .name("animation".to_owned())
            .spawn(move || animation_loop(animated, receiver))?;

        Ok(NeoPixels {
            shared,
            sender,
            thread: Some(thread),
            auto_show: true,
        })
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.shared.strip().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if [`color`] and [`brightness`] show the strip.
    ///
    /// [`color`]: #method.color
    /// [`brightness`]: #method.brightness
    pub fn auto_show(&self) -> bool {
        self.auto_show
    }

    pub fn set_auto_show(&mut self, auto_show: bool) {
        self.auto_show = auto_show;
    }

    /// Returns locked access to the strip.
    ///
    /// Holding the lock pauses a running animation.
    pub fn strip(&self) -> MutexGuard<'_, S> {
        self.shared.strip()
    }

    /// Shows the strip.
    pub fn show(&self) -> Result<()> {
        self.shared.strip().show()
    }

    /// Sets the global brightness, `0.0..=1.0`.
    pub fn brightness(&mut self, brightness: f32) -> Result<()> {
        let mut strip = self.shared.strip();
        strip.set_brightness(level(brightness));

        if self.auto_show {
            strip.show()?;
        }

        Ok(())
    }

    /// Stops any running animation and sets the color of `pixel`.
    ///
    /// A `brightness` is applied to the whole strip.
    pub fn color(&mut self, pixel: Pixel, color: Color, brightness: Option<f32>) -> Result<()> {
        self.stop()?;

        let mut strip = self.shared.strip();
        let pixels = pixel.resolve(strip.len())?;

        if let Some(brightness) = brightness {
            strip.set_brightness(level(brightness));
        }

        let rgb = color.to_rgb8();
        for i in pixels {
            strip.set_pixel(i, rgb);
        }

        if self.auto_show {
            strip.show()?;
        }

        Ok(())
    }

    /// Returns `true` while an animation is running.
    pub fn is_animating(&self) -> bool {
        *self.shared.busy()
    }

    fn wait_idle(&self) -> Result<()> {
        let mut busy = self.shared.busy();

        while *busy {
            if self.thread.as_ref().map_or(true, |t| t.is_finished()) {
                return Err(Error::Disconnected);
            }

            busy = self
                .shared
                .idle
                .wait_timeout(busy, IDLE_CHECK_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        Ok(())
    }

    /// Stops the running animation and waits until it has ended.
    pub fn stop(&mut self) -> Result<()> {
        self.shared.running.store(false, Ordering::SeqCst);

        self.wait_idle()
    }

    /// Stops the running animation, and starts `frame` as a new one.
    ///
    /// `frame` is called every `animation.delay` with the strip, the time
    /// in seconds since the start and the phase within the current cycle.
    /// The strip is shown after every frame. An error or panic in `frame`
    /// ends the animation. `atexit` is called when the animation ends, for
    /// whatever reason.
    pub fn animate<F>(
        &mut self,
        frame: F,
        atexit: Option<AtExit<S>>,
        animation: Animation,
    ) -> Result<()>
    where
        F: FnMut(&mut S, f64, f64) -> Result<()> + Send + 'static,
    {
        let timeout = animation.duration();
        if animation.wait && timeout <= 0.0 {
            return Err(Error::InfiniteWait);
        }

        self.stop()?;

        self.shared.set_busy(true);
        self.shared.running.store(true, Ordering::SeqCst);

        let job = Job {
            frame: Box::new(frame),
            atexit,
            freq: animation.frequency(),
            timeout,
            delay: animation.delay,
        };

        if self.sender.send(Msg::Run(job)).is_err() {
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.set_busy(false);

            return Err(Error::Disconnected);
        }

        if animation.wait {
            self.wait_idle()?;
        }

        Ok(())
    }

    /// Cycles all pixels through the colors of the rainbow.
    pub fn rainbow(&mut self, animation: Animation) -> Result<()> {
        let frame = |strip: &mut S, _t: f64, s: f64| {
            let n = strip.len();
            for i in 0..n {
                strip.set_pixel(i, wheel((i as f64 / n as f64 - s).rem_euclid(1.0)));
            }

            Ok(())
        };

        self.animate(frame, blank_at_exit(), animation)
    }

    /// Pulses the brightness like a breathing sleep indicator.
    ///
    /// `n` shapes the curve. With a non-zero `fade` time in seconds, the
    /// brightness fades out over that time, which also becomes the timeout.
    /// A `color` is set on all pixels first.
    pub fn breathe(
        &mut self,
        n: f64,
        fade: f64,
        color: Option<Color>,
        mut animation: Animation,
    ) -> Result<()> {
        if fade > 0.0 {
            animation.timeout = fade;
        }

        if let Some(color) = color {
            self.color(Pixel::All, color, Some(0.0))?;
        }

        let frame = move |strip: &mut S, t: f64, s: f64| {
            strip.set_brightness(level(breathe_level(n, fade, t, s) as f32));
            Ok(())
        };

        self.animate(frame, blank_at_exit(), animation)
    }

    /// Switches the brightness according to `pattern` once per cycle.
    ///
    /// See [`blink_pattern`] for the format. A `color` is set on all pixels
    /// first.
    ///
    /// [`blink_pattern`]: fn.blink_pattern.html
    pub fn blink(&mut self, pattern: &str, color: Option<Color>, animation: Animation) -> Result<()> {
        let levels = blink_pattern(pattern)?;

        match color {
            Some(color) => self.color(Pixel::All, color, Some(0.0))?,
            None => {
                self.stop()?;
                self.shared.strip().set_brightness(0);
            }
        }

        let frame = move |strip: &mut S, _t: f64, s: f64| {
            strip.set_brightness(level(levels[step(&levels, s)]));
            Ok(())
        };

        self.animate(frame, blank_at_exit(), animation)
    }

    /// Switches all pixels through `colors`, once per cycle.
    ///
    /// An empty slice cycles through red, green and blue.
    pub fn sequence(&mut self, colors: &[Color], animation: Animation) -> Result<()> {
        let colors = if colors.is_empty() {
            vec![Color::RED, Color::GREEN, Color::BLUE]
        } else {
            colors.to_vec()
        };

        let frame = move |strip: &mut S, _t: f64, s: f64| {
            let rgb = sequence_color(&colors, s).to_rgb8();
            for i in 0..strip.len() {
                strip.set_pixel(i, rgb);
            }

            Ok(())
        };

        self.animate(frame, blank_at_exit(), animation)
    }
}

impl<S: Strip + 'static> Drop for NeoPixels<S> {
    fn drop(&mut self) {
        // Don't wait for the animation thread if we're unwinding
        if thread::panicking() {
            return;
        }

        let _ = self.stop();
        let _ = self.sender.send(Msg::Exit);

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Clone)]
    enum Call {
        Pixel(usize, (u8, u8, u8)),
        Brightness(u8),
        Show,
    }

    struct Recorder {
        len: usize,
        brightness: u8,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Strip for Recorder {
        fn len(&self) -> usize {
            self.len
        }

        fn set_pixel(&mut self, index: usize, rgb: (u8, u8, u8)) {
            self.calls.lock().unwrap().push(Call::Pixel(index, rgb));
        }

        fn brightness(&self) -> u8 {
            self.brightness
        }

        fn set_brightness(&mut self, brightness: u8) {
            self.brightness = brightness;
            self.calls.lock().unwrap().push(Call::Brightness(brightness));
        }

        fn show(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Show);
            Ok(())
        }
    }

    fn pixels(len: usize) -> (NeoPixels<Recorder>, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let strip = Recorder {
            len,
            brightness: 128,
            calls: calls.clone(),
        };

        (NeoPixels::new(strip).unwrap(), calls)
    }

    fn shows(calls: &Arc<Mutex<Vec<Call>>>) -> usize {
        calls.lock().unwrap().iter().filter(|c| **c == Call::Show).count()
    }

    fn short() -> Animation {
        Animation {
            timeout: 0.1,
            wait: true,
            ..Default::default()
        }
    }

    #[test]
    fn color_and_brightness() {
        let (mut np, calls) = pixels(3);

        np.brightness(1.0).unwrap();
        np.color(Pixel::All, Color::rgb(0.1, 0.2, 0.3), None).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Show,
                Call::Brightness(255),
                Call::Show,
                Call::Pixel(0, (25, 51, 76)),
                Call::Pixel(1, (25, 51, 76)),
                Call::Pixel(2, (25, 51, 76)),
                Call::Show,
            ]
        );
    }

    #[test]
    fn color_without_auto_show() {
        let (mut np, calls) = pixels(3);
        np.set_auto_show(false);

        np.color(Pixel::Index(1), Color::gray(0.2), Some(0.5)).unwrap();
        np.color(Pixel::Index(-1), Color::WHITE, None).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Show,
                Call::Brightness(127),
                Call::Pixel(1, (51, 51, 51)),
                Call::Pixel(2, (255, 255, 255)),
            ]
        );
    }

    #[test]
    fn pixel_out_of_range() {
        let (mut np, _) = pixels(3);

        assert!(matches!(
            np.color(Pixel::Index(3), Color::RED, None),
            Err(Error::PixelOutOfRange(3))
        ));
        assert!(matches!(
            np.color(Pixel::Index(-4), Color::RED, None),
            Err(Error::PixelOutOfRange(-4))
        ));
    }

    #[test]
    fn waiting_for_endless_animation_fails() {
        let (mut np, _) = pixels(1);
        let animation = Animation {
            wait: true,
            ..Default::default()
        };

        assert!(matches!(
            np.animate(|_: &mut Recorder, _, _| Ok(()), None, animation),
            Err(Error::InfiniteWait)
        ));
        assert!(!np.is_animating());
    }

    #[test]
    fn failing_animation_ends_and_thread_survives() {
        let (mut np, calls) = pixels(1);

        let frames = Arc::new(Mutex::new(0));
        let f = frames.clone();
        np.animate(
            move |_: &mut Recorder, _, _| {
                *f.lock().unwrap() += 1;
                Err(Error::Disconnected)
            },
            None,
            short(),
        )
        .unwrap();

        assert_eq!(*frames.lock().unwrap(), 1);
        assert_eq!(shows(&calls), 1);

        np.animate(|_: &mut Recorder, _, _| panic!("broken frame"), None, short())
            .unwrap();
        assert_eq!(shows(&calls), 1);

        let f = frames.clone();
        np.animate(
            move |_: &mut Recorder, _, _| {
                *f.lock().unwrap() += 1;
                Ok(())
            },
            None,
            short(),
        )
        .unwrap();

        assert!(*frames.lock().unwrap() > 3);
        assert!(shows(&calls) > 3);
    }

    #[test]
    fn stop_ends_endless_animation_and_runs_atexit() {
        let (mut np, calls) = pixels(2);

        np.rainbow(Animation::default()).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(np.is_animating());

        np.stop().unwrap();
        assert!(!np.is_animating());

        let calls = calls.lock().unwrap();
        let n = calls.len();
        assert_eq!(
            &calls[n - 4..],
            &[
                Call::Pixel(0, (0, 0, 0)),
                Call::Pixel(1, (0, 0, 0)),
                Call::Brightness(255),
                Call::Show,
            ]
        );
    }

    #[test]
    fn blink_starts_dark() {
        let (mut np, calls) = pixels(1);

        np.blink(
            "1 0.3",
            None,
            Animation {
                timeout: 0.05,
                wait: true,
                ..Default::default()
            },
        )
        .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[1], Call::Brightness(0));
        assert_eq!(calls[2], Call::Brightness(255));
        assert_eq!(calls[calls.len() - 2], Call::Brightness(255));
    }

    #[test]
    fn animation_options() {
        let a = Animation {
            freq: 2.0,
            timeout: 5.0,
            ..Default::default()
        };
        assert_eq!(a.frequency(), 2.0);
        assert_eq!(a.duration(), 5.0);

        let a = Animation {
            freq: 2.0,
            period: 0.25,
            timeout: 5.0,
            cycles: 2.0,
            ..Default::default()
        };
        assert_eq!(a.frequency(), 4.0);
        assert_eq!(a.duration(), 0.5);
    }

    fn close(a: (u8, u8, u8), b: (u8, u8, u8)) -> bool {
        let d = |x: u8, y: u8| (i16::from(x) - i16::from(y)).abs() <= 1;
        d(a.0, b.0) && d(a.1, b.1) && d(a.2, b.2)
    }

    #[test]
    fn wheel_colors() {
        assert!(close(wheel(0.0), (255, 0, 0)));
        assert!(close(wheel(1.0 / 6.0), (127, 127, 0)));
        assert!(close(wheel(0.5), (0, 127, 127)));
        assert!(close(wheel(5.0 / 6.0), (127, 0, 127)));
    }

    #[test]
    fn breathe_curve() {
        assert!(breathe_level(3.0, 0.0, 0.0, 0.0).abs() < 1e-9);
        assert!((breathe_level(3.0, 0.0, 0.0, 0.5) - 1.0).abs() < 1e-9);
        assert!((breathe_level(3.0, 10.0, 5.0, 0.5) - 0.5).abs() < 1e-9);
        assert!(breathe_level(3.0, 10.0, 10.0, 0.5).abs() < 1e-9);
    }

    #[test]
    fn blink_patterns() {
        assert_eq!(blink_pattern("10").unwrap(), vec![1.0, 0.0]);
        assert_eq!(blink_pattern("1 0.3 1 0").unwrap(), vec![1.0, 0.3, 1.0, 0.0]);
        assert_eq!(blink_pattern("2 -1").unwrap(), vec![1.0, 0.0]);
        assert!(matches!(blink_pattern("1x"), Err(Error::InvalidPattern(_))));
        assert!(matches!(blink_pattern(""), Err(Error::InvalidPattern(_))));
    }

    #[test]
    fn sequence_switches_between_colors() {
        let colors = [Color::RED, Color::GREEN, Color::BLUE];

        assert_eq!(sequence_color(&colors, 0.0).to_rgb8(), (255, 0, 0));
        assert_eq!(sequence_color(&colors, 0.33).to_rgb8(), (255, 0, 0));
        assert_eq!(sequence_color(&colors, 0.34).to_rgb8(), (0, 255, 0));
        assert_eq!(sequence_color(&colors, 0.5).to_rgb8(), (0, 255, 0));
        assert_eq!(sequence_color(&colors, 0.99).to_rgb8(), (0, 0, 255));
        assert_eq!(sequence_color(&colors, 1.0).to_rgb8(), (0, 0, 255));
        assert_eq!(sequence_color(&[], 0.3), Color::BLACK);
    }

    #[test]
    fn sequence_clamps_components() {
        let colors = [Color::rgb(2.0, -1.0, 0.5)];

        assert_eq!(sequence_color(&colors, 0.7).to_rgb8(), (255, 0, 127));
    }
}
