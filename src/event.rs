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

//! Events with attached handlers, and a loop thread to dispatch them on.
//!
//! An [`Event`] holds a list of handlers, which are called in order when the
//! event is fired. Events can be combined into new events, either by
//! attaching one event as a handler of another, or by deriving a new event
//! with [`join`], [`conditional`] or [`partial`].
//!
//! Firing calls the handlers on the current thread. [`queue`] instead hands
//! the call to a process-wide [`EventLoop`], which runs it on a dedicated
//! thread. This keeps slow handlers out of time-critical code, like a button
//! polling loop.
//!
//! ```
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! use piripherals::event::Event;
//!
//! let total = Arc::new(AtomicU32::new(0));
//!
//! let clicked = Event::new("clicked");
//! let sum = total.clone();
//! clicked.add(move |n: u32| {
//!     sum.fetch_add(n, Ordering::SeqCst);
//! });
//!
//! let double = clicked.conditional(|| true).partial(|n: u32| n * 2);
//! double.fire(21);
//!
//! assert_eq!(total.load(Ordering::SeqCst), 42);
//! ```
//!
//! [`Event`]: struct.Event.html
//! [`EventLoop`]: struct.EventLoop.html
//! [`join`]: struct.Event.html#method.join
//! [`conditional`]: struct.Event.html#method.conditional
//! [`partial`]: struct.Event.html#method.partial
//! [`queue`]: struct.Event.html#method.queue

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, ThreadId};

use crate::util::guarded;

type Job = Box<dyn FnOnce() + Send>;

/// A queue of functions that are called one by one on a separate thread.
///
/// The thread is started when the first function is added, and keeps running
/// until the `EventLoop` is dropped. A panicking function is logged, and
/// doesn't stop the loop.
pub struct EventLoop {
    sender: Mutex<Option<Sender<Job>>>,
    thread_id: Mutex<Option<ThreadId>>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

impl Default for EventLoop {
    fn default() -> EventLoop {
        EventLoop::new()
    }
}

impl EventLoop {
    /// Constructs a new `EventLoop`. No thread is started yet.
    pub fn new() -> EventLoop {
        EventLoop {
            sender: Mutex::new(None),
            thread_id: Mutex::new(None),
        }
    }

    /// Returns the process-wide `EventLoop` used by [`Event::queue`].
    ///
    /// [`Event::queue`]: struct.Event.html#method.queue
    pub fn global() -> &'static EventLoop {
        static GLOBAL: OnceLock<EventLoop> = OnceLock::new();

        GLOBAL.get_or_init(EventLoop::new)
    }

    /// Appends `f` to the queue.
    ///
    /// Fails only if the loop thread can't be started.
    pub fn add<F>(&self, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut sender = self
            .sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if sender.is_none() {
            let (tx, rx) = mpsc::channel::<Job>();
            let thread = thread::Builder::new()
                .name("event loop".to_owned())
                .spawn(move || {
                    for job in rx {
                        guarded("event loop entry", job);
                    }
                })?;

            *self
                .thread_id
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(thread.thread().id());
            *sender = Some(tx);

            log::debug!("Started event loop");
        }

        if let Some(tx) = sender.as_ref() {
            // The loop thread only exits once the sender is dropped
            let _ = tx.send(Box::new(f));
        }

        Ok(())
    }

    /// Returns `true` if called from the loop thread.
    pub fn in_loop(&self) -> bool {
        *self
            .thread_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            == Some(thread::current().id())
    }
}

/// Identifies a handler attached to an [`Event`], so it can be removed later.
///
/// [`Event`]: struct.Event.html
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub struct HandlerId(u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(0);

type Handler<A> = Arc<dyn Fn(A) + Send + Sync>;

struct Inner<A> {
    name: String,
    condition: Box<dyn Fn() -> bool + Send + Sync>,
    handlers: Mutex<Vec<(HandlerId, Handler<A>)>>,
}

/// An event with attached handlers and an optional condition.
///
/// `Event` is a handle: clones refer to the same event and share its
/// handlers. `A` is the argument passed to each handler. Use `()` for
/// events without an argument, or a tuple for several.
pub struct Event<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for Event<A> {
    fn clone(&self) -> Event<A> {
        Event {
            inner: self.inner.clone(),
        }
    }
}

impl<A> fmt::Display for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.name)
    }
}

impl<A> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.inner.name)
            .field("handlers", &self.len())
            .finish()
    }
}

impl<A> Event<A> {
    /// Returns the number of attached handlers.
    pub fn len(&self) -> usize {
        self.handlers().len()
    }

    /// Returns `true` if no handlers are attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handlers(&self) -> std::sync::MutexGuard<'_, Vec<(HandlerId, Handler<A>)>> {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<A: Clone + Send + 'static> Event<A> {
    /// Constructs a new `Event` that always fires.
    pub fn new(name: &str) -> Event<A> {
        Event::with_condition(name, || true)
    }

    /// Constructs a new `Event` that only fires while `condition` returns `true`.
    pub fn with_condition<C>(name: &str, condition: C) -> Event<A>
    where
        C: Fn() -> bool + Send + Sync + 'static,
    {
        Event {
            inner: Arc::new(Inner {
                name: name.to_owned(),
                condition: Box::new(condition),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attaches `handler`. Handlers are called in the order they were added.
    pub fn add<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        let id = HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed));
        self.handlers().push((id, Arc::new(handler)));

        id
    }

    /// Attaches `other`, so firing this event fires `other` as well.
    pub fn add_event(&self, other: &Event<A>) -> HandlerId {
        let other = other.clone();

        self.add(move |arg| other.fire(arg))
    }

    /// Detaches a handler. Returns `false` if it wasn't attached.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers();
        let len = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);

        handlers.len() != len
    }

    /// Calls all handlers with `arg` on the current thread, if the condition holds.
    ///
    /// A panicking handler is logged, and the remaining handlers are still called.
    pub fn fire(&self, arg: A) {
        if !(self.inner.condition)() {
            log::trace!("{} suppressed by condition", self.inner.name);
            return;
        }

        // Handlers may add or remove handlers, so don't hold the lock
        let handlers: Vec<Handler<A>> = self.handlers().iter().map(|(_, h)| h.clone()).collect();

        for handler in handlers {
            let arg = arg.clone();
            guarded(&self.inner.name, move || handler(arg));
        }
    }

    /// Fires the event with `arg` on the global [`EventLoop`] thread.
    ///
    /// [`EventLoop`]: struct.EventLoop.html
    pub fn queue(&self, arg: A) -> io::Result<()> {
        let event = self.clone();

        EventLoop::global().add(move || event.fire(arg))
    }

    /// Derives a new event named `name?` that fires this event while
    /// `condition` returns `true`.
    pub fn conditional<C>(&self, condition: C) -> Event<A>
    where
        C: Fn() -> bool + Send + Sync + 'static,
    {
        let event = Event::with_condition(&format!("{}?", self.inner.name), condition);
        event.add_event(self);

        event
    }

    /// Derives a new event that fires this event and `other`.
    ///
    /// Unlike [`add_event`], neither event is changed.
    ///
    /// [`add_event`]: #method.add_event
    pub fn join(&self, other: &Event<A>) -> Event<A> {
        let event = Event::new(&format!("{}+{}", self.inner.name, other.inner.name));
        event.add_event(self);
        event.add_event(other);

        event
    }

    /// Derives a new event that fires this event and calls `handler`.
    pub fn join_with<F>(&self, handler: F) -> Event<A>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        let event = Event::new(&format!("{}+other", self.inner.name));
        event.add_event(self);
        event.add(handler);

        event
    }

    /// Derives a new event whose argument is mapped by `f` before this event
    /// is fired with the result.
    pub fn partial<B, F>(&self, f: F) -> Event<B>
    where
        B: Clone + Send + 'static,
        F: Fn(B) -> A + Send + Sync + 'static,
    {
        let event = Event::new(&format!("{}(..)", self.inner.name));
        let target = self.clone();
        event.add(move |arg| target.fire(f(arg)));

        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(()) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();

        (count, move |_: ()| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn loop_runs_entries_on_its_thread() {
        let event_loop = EventLoop::new();
        assert!(!event_loop.in_loop());

        let event_loop = Arc::new(event_loop);
        let (tx, rx) = mpsc::channel();

        let el = event_loop.clone();
        let tx1 = tx.clone();
        event_loop
            .add(move || tx1.send(el.in_loop()).unwrap())
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());

        // A panicking entry doesn't stop the loop
        event_loop.add(|| panic!("entry failed")).unwrap();
        event_loop.add(move || tx.send(true).unwrap()).unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn fire_calls_all_handlers_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let event = Event::new("event");

        let l = log.clone();
        event.add(move |s: &'static str| l.lock().unwrap().push(format!("h1 {}", s)));
        event.add(|_| panic!("h2 failed"));
        let l = log.clone();
        event.add(move |s| l.lock().unwrap().push(format!("h3 {}", s)));

        event.fire("foo");

        assert_eq!(*log.lock().unwrap(), vec!["h1 foo", "h3 foo"]);
    }

    #[test]
    fn remove_detaches_handler() {
        let (count, handler) = counter();
        let event = Event::new("event");
        let id = event.add(handler);

        event.fire(());
        assert!(event.remove(id));
        assert!(!event.remove(id));
        event.fire(());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(event.is_empty());
    }

    #[test]
    fn queue_fires_on_loop_thread() {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        let event = Event::new("queued");
        event.add(move |n: i32| {
            let _ = tx
                .lock()
                .unwrap()
                .send((n, EventLoop::global().in_loop()));
        });

        event.fire(1);
        event.queue(2).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), (1, false));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), (2, true));
    }

    #[test]
    fn conditional() {
        let (count, handler) = counter();
        let event = Event::new("event");
        event.add(handler);

        let enabled = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let e = enabled.clone();
        let conditional = event.conditional(move || e.load(Ordering::SeqCst));
        assert_eq!(conditional.name(), "event?");

        conditional.fire(());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        enabled.store(true, Ordering::SeqCst);
        conditional.fire(());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn join_leaves_both_events_untouched() {
        let (c1, h1) = counter();
        let (c2, h2) = counter();
        let e1 = Event::new("a");
        let e2 = Event::new("b");
        e1.add(h1);
        e2.add(h2);

        let joined = e1.join(&e2);
        assert_eq!(joined.to_string(), "a+b");

        e1.fire(());
        assert_eq!((c1.load(Ordering::SeqCst), c2.load(Ordering::SeqCst)), (1, 0));
        e2.fire(());
        assert_eq!((c1.load(Ordering::SeqCst), c2.load(Ordering::SeqCst)), (1, 1));
        joined.fire(());
        assert_eq!((c1.load(Ordering::SeqCst), c2.load(Ordering::SeqCst)), (2, 2));
    }

    #[test]
    fn join_with_function() {
        let (c1, h1) = counter();
        let (c2, h2) = counter();
        let e1 = Event::new("a");
        e1.add(h1);

        let joined = e1.join_with(h2);
        assert_eq!(joined.name(), "a+other");

        e1.fire(());
        joined.fire(());
        assert_eq!((c1.load(Ordering::SeqCst), c2.load(Ordering::SeqCst)), (2, 1));
    }

    #[test]
    fn event_as_handler() {
        let (c1, h1) = counter();
        let (c2, h2) = counter();
        let e1 = Event::new("a");
        let e2 = Event::new("b");
        e1.add(h1);
        e2.add(h2);
        e1.add_event(&e2);

        e1.fire(());
        e2.fire(());
        assert_eq!((c1.load(Ordering::SeqCst), c2.load(Ordering::SeqCst)), (1, 2));
    }

    #[test]
    fn partial_maps_argument() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let event = Event::new("event");
        let s = seen.clone();
        event.add(move |(a, b): (&'static str, &'static str)| {
            s.lock().unwrap().push(format!("{} {}", a, b))
        });

        let partial = event.partial(|b: &'static str| ("foo", b));
        partial.fire("bar");

        assert_eq!(*seen.lock().unwrap(), vec!["foo bar"]);
    }
}
