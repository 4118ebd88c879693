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

//! Background loops and helpers shared by the drivers.
//!
//! [`Poller`] calls a function at a fixed interval, [`IrqHandler`] calls it
//! whenever an interrupt line is asserted, and [`on_change`] calls it when a
//! file is modified. Each of them runs on its own thread, which is stopped
//! and joined when the returned handle goes out of scope.
//!
//! Callbacks that return an error, or panic, don't bring down the loop. The
//! failure is logged through the `log` crate, and the loop carries on.
//!
//! [`Poller`]: struct.Poller.html
//! [`IrqHandler`]: struct.IrqHandler.html
//! [`on_change`]: fn.on_change.html

use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::result;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, SystemTime};

use crate::gpio::{self, Bias, InputPin, InterruptInput, Trigger};

/// Default interval between two invocations of a [`Poller`] callback.
///
/// [`Poller`]: struct.Poller.html
pub const POLL_DELAY: Duration = Duration::from_millis(10);

// Upper bound for a blocking wait, so a stop request is noticed in time
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that can occur when starting or stopping a background loop.
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

/// Result type returned from methods that can have `util::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Runs `f` on a new thread named `fork`, without waiting for it to finish.
///
/// The thread is detached when the returned handle is dropped.
pub fn fork<F, T>(f: F) -> Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(thread::Builder::new().name("fork".to_owned()).spawn(f)?)
}

/// Does nothing. Useful as a placeholder callback.
pub fn noop<T>(_: T) {}

/// Wraps `f`, so errors and panics are logged instead of propagated.
///
/// ```
/// use piripherals::util::not_raising;
///
/// let mut f = not_raising(|| "42x".parse::<u8>().map(|_| ()));
///
/// // Logs the parse error, and returns normally
/// f();
/// ```
pub fn not_raising<F, E>(mut f: F) -> impl FnMut()
where
    F: FnMut() -> result::Result<(), E>,
    E: fmt::Display,
{
    move || {
        if let Some(Err(e)) = guarded("callback", &mut f) {
            log::error!("callback failed: {}", e);
        }
    }
}

// Calls f, and turns a panic into None after logging it
pub(crate) fn guarded<F, R>(what: &str, f: F) -> Option<R>
where
    F: FnOnce() -> R,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => Some(r),
        Err(payload) => {
            log::error!("{} panicked: {}", what, panic_message!(payload));
            None
        }
    }
}

// Returns true if the owner asked the loop to stop, waiting at most timeout
pub(crate) fn stop_requested(receiver: &Receiver<()>, timeout: Duration) -> bool {
    match receiver.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

// A named thread that's asked to stop and joined on drop.
#[derive(Debug)]
pub(crate) struct Worker {
    name: String,
    thread: Option<thread::JoinHandle<()>>,
    sender: Sender<()>,
}

impl Worker {
    pub(crate) fn spawn<F>(name: &str, f: F) -> io::Result<Worker>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || f(receiver))?;

        log::debug!("Started {}", name);

        Ok(Worker {
            name: name.to_owned(),
            thread: Some(thread),
            sender,
        })
    }

    pub(crate) fn stop(&mut self) -> Result<()> {
        let _ = self.sender.send(());

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(Error::ThreadPanic);
            }

            log::debug!("Stopped {}", self.name);
        }

        Ok(())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Don't wait for the thread if we're unwinding, it might not respond
        if !thread::panicking() {
            let _ = self.stop();
        }
    }
}

/// Calls a function at a fixed interval on a separate thread.
///
/// Use it when the interrupt line of a device isn't connected, or reacting
/// to interrupts isn't desired. The loop stops when `Poller` goes out of
/// scope.
#[derive(Debug)]
pub struct Poller {
    worker: Worker,
    delay: Duration,
}

impl Poller {
    /// Starts calling `callback` every `delay`.
    ///
    /// [`POLL_DELAY`] is a sensible default for most devices.
    ///
    /// [`POLL_DELAY`]: constant.POLL_DELAY.html
    pub fn new<F, E>(callback: F, delay: Duration) -> Result<Poller>
    where
        F: FnMut() -> result::Result<(), E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let mut callback = not_raising(callback);

        let worker = Worker::spawn("poller", move |stop| loop {
            callback();

            if stop_requested(&stop, delay) {
                break;
            }
        })?;

        Ok(Poller { worker, delay })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Stops the loop and waits for the thread to exit.
    pub fn stop(&mut self) -> Result<()> {
        self.worker.stop()
    }
}

/// Calls a function on a separate thread while an interrupt line is asserted.
///
/// An edge on the line sets a flag. While the flag is set, the callback is
/// invoked repeatedly. The flag is cleared after an invocation when the line
/// is back at its inactive level, which is high for a falling edge trigger
/// and low for a rising edge trigger. This matches devices that keep their
/// IRQ output asserted until the cause of the interrupt has been read.
#[derive(Debug)]
pub struct IrqHandler {
    worker: Worker,
    trigger: Trigger,
}

impl IrqHandler {
    /// Requests `pin` as an input, and starts handling interrupts on it.
    ///
    /// `trigger` is either `Trigger::FallingEdge` or `Trigger::RisingEdge`.
    pub fn new<F, E>(pin: u8, callback: F, trigger: Trigger, bias: Bias) -> Result<IrqHandler>
    where
        F: FnMut() -> result::Result<(), E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let input = InputPin::new(pin, bias, trigger)?;

        IrqHandler::with_input(input, callback, trigger)
    }

    /// Starts handling interrupts signalled by `input`.
    pub fn with_input<I, F, E>(mut input: I, callback: F, trigger: Trigger) -> Result<IrqHandler>
    where
        I: InterruptInput + 'static,
        F: FnMut() -> result::Result<(), E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let mut callback = not_raising(callback);
        let inactive = trigger.inactive_level();

        let worker = Worker::spawn("irq handler", move |stop| {
            let mut asserted = false;

            loop {
                if let Ok(()) | Err(mpsc::TryRecvError::Disconnected) = stop.try_recv() {
                    break;
                }

                if !asserted {
                    match input.wait_for_edge(Some(STOP_CHECK_INTERVAL)) {
                        Ok(edge) => asserted = edge,
                        Err(e) => {
                            log::warn!("waiting for interrupt failed: {}", e);
                            if stop_requested(&stop, STOP_CHECK_INTERVAL) {
                                break;
                            }
                        }
                    }

                    continue;
                }

                callback();

                match input.level() {
                    Ok(level) if level == inactive => asserted = false,
                    Ok(_) => (),
                    Err(e) => {
                        log::warn!("reading interrupt line failed: {}", e);
                        asserted = false;
                    }
                }
            }
        })?;

        Ok(IrqHandler { worker, trigger })
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Stops handling interrupts and waits for the thread to exit.
    pub fn stop(&mut self) -> Result<()> {
        self.worker.stop()
    }
}

/// Watches a file for modifications. Stops watching when dropped.
#[derive(Debug)]
pub struct Watcher {
    worker: Worker,
    path: PathBuf,
}

impl Watcher {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stops watching and waits for the thread to exit.
    pub fn stop(&mut self) -> Result<()> {
        self.worker.stop()
    }
}

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Calls `callback` once every time the modification time of `path` changes.
///
/// The modification time is checked every `delay`. The file has to exist
/// when `on_change` is called. If it disappears later on, the failed checks
/// are logged and watching continues.
pub fn on_change<P, F>(path: P, delay: Duration, callback: F) -> Result<Watcher>
where
    P: AsRef<Path>,
    F: FnMut() + Send + 'static,
{
    let path = path.as_ref().to_path_buf();
    let mut last = modified(&path)?;
    let mut callback = callback;

    let watched = path.clone();
    let worker = Worker::spawn("file watcher", move |stop| {
        while !stop_requested(&stop, delay) {
            match modified(&watched) {
                Ok(time) if time != last => {
                    last = time;
                    guarded("file change callback", &mut callback);
                }
                Ok(_) => (),
                Err(e) => log::warn!("checking {} failed: {}", watched.display(), e),
            }
        }
    })?;

    Ok(Watcher { worker, path })
}
