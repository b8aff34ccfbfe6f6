//! Thread-safe ordered event queue with blocking retrieval and timer events.
//!
//! # How it is used (for beginners)
//!
//! The network task and the Ctrl-C handler *post* events; one dispatch thread
//! *gets* them and acts on them.  The queue is the only place where these
//! threads hand data to each other, so everything that crosses a thread
//! boundary passes through here in a well-defined order.
//!
//! # Ordering
//!
//! - Events posted with [`EventQueue::post`] come out in the order they went
//!   in.  Two producers racing each other interleave, but each producer's own
//!   events stay in its posting order.
//! - Events posted with [`EventQueue::post_after`] are held back until their
//!   delay has elapsed.  Once due they join the back of the ready queue, so
//!   anything posted before they became due is still delivered first.
//!
//! # Implementation
//!
//! A `Mutex` guards the ready queue and the timer heap; a `Condvar` wakes a
//! blocked [`EventQueue::get`] when an event is posted or the queue is shut
//! down.  A waiter with pending timers sleeps only until the earliest one is
//! due.

mod timer;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace};

use timer::Timer;

/// Returned when the queue has been shut down.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("event queue has been shut down")]
pub struct QueueClosed;

struct QueueState<E> {
    ready: VecDeque<E>,
    timers: BinaryHeap<Reverse<Timer<E>>>,
    next_timer_seq: u64,
    closed: bool,
}

impl<E> QueueState<E> {
    /// Moves every timer due at or before `now` to the ready tail.
    fn promote_due(&mut self, now: Instant) {
        while self
            .timers
            .peek()
            .is_some_and(|Reverse(timer)| timer.due <= now)
        {
            if let Some(Reverse(timer)) = self.timers.pop() {
                self.ready.push_back(timer.event);
            }
        }
    }

    fn next_timer_due(&self) -> Option<Instant> {
        self.timers.peek().map(|Reverse(timer)| timer.due)
    }
}

/// Multi-producer FIFO queue of `E` with blocking, timeout-bounded retrieval.
///
/// Share it as `Arc<EventQueue<E>>`; every method takes `&self`.
///
/// # Examples
///
/// ```rust
/// use deskshare_core::EventQueue;
/// use std::time::Duration;
///
/// let queue = EventQueue::new();
/// queue.post("a").unwrap();
/// queue.post("b").unwrap();
/// assert_eq!(queue.get(None), Ok(Some("a")));
/// assert_eq!(queue.get(Some(Duration::ZERO)), Ok(Some("b")));
/// assert_eq!(queue.get(Some(Duration::ZERO)), Ok(None));
/// ```
pub struct EventQueue<E> {
    state: Mutex<QueueState<E>>,
    available: Condvar,
}

impl<E> EventQueue<E> {
    /// Creates an empty, open queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                timers: BinaryHeap::new(),
                next_timer_seq: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    // A panicking holder cannot leave the state half-updated: every mutation
    // is a single push/pop or flag write.
    fn lock(&self) -> MutexGuard<'_, QueueState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `event` to the tail.  Never blocks on consumers.
    ///
    /// # Errors
    ///
    /// [`QueueClosed`] after [`shutdown`](Self::shutdown).
    pub fn post(&self, event: E) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueClosed);
        }
        state.ready.push_back(event);
        trace!(depth = state.ready.len(), "event posted");
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Schedules `event` to be delivered no earlier than `delay` from now.
    ///
    /// # Errors
    ///
    /// [`QueueClosed`] after [`shutdown`](Self::shutdown).
    pub fn post_after(&self, event: E, delay: Duration) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueClosed);
        }
        let seq = state.next_timer_seq;
        state.next_timer_seq = state.next_timer_seq.wrapping_add(1);
        state.timers.push(Reverse(Timer {
            due: Instant::now() + delay,
            seq,
            event,
        }));
        trace!(delay_ms = delay.as_millis() as u64, "timer event scheduled");
        drop(state);
        // A waiter may be sleeping until a later deadline; let it recompute.
        self.available.notify_all();
        Ok(())
    }

    /// Removes and returns the event at the head of the queue.
    ///
    /// `timeout` of `None` blocks until an event arrives.  `Some(d)` waits at
    /// most `d` and returns `Ok(None)` if nothing became available;
    /// `Some(Duration::ZERO)` polls.
    ///
    /// # Errors
    ///
    /// [`QueueClosed`] once the queue has been shut down, including while
    /// blocked.
    pub fn get(&self, timeout: Option<Duration>) -> Result<Option<E>, QueueClosed> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();

        loop {
            if state.closed {
                return Err(QueueClosed);
            }

            let now = Instant::now();
            state.promote_due(now);
            if let Some(event) = state.ready.pop_front() {
                return Ok(Some(event));
            }
            if deadline.is_some_and(|d| now >= d) {
                return Ok(None);
            }

            let wake_at = match (deadline, state.next_timer_due()) {
                (Some(d), Some(t)) => Some(d.min(t)),
                (d, t) => d.or(t),
            };
            state = match wake_at {
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(at) => {
                    self.available
                        .wait_timeout(state, at.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Number of events ready for delivery now (excludes pending timers).
    pub fn len(&self) -> usize {
        let mut state = self.lock();
        state.promote_due(Instant::now());
        state.ready.len()
    }

    /// Returns `true` if no event is ready for delivery now.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of timer events not yet due.
    pub fn pending_timers(&self) -> usize {
        self.lock().timers.len()
    }

    /// Closes the queue, drops every pending event and wakes all waiters.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        let dropped = state.ready.len() + state.timers.len();
        state.closed = true;
        state.ready.clear();
        state.timers.clear();
        drop(state);
        debug!(dropped, "event queue shut down");
        self.available.notify_all();
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
