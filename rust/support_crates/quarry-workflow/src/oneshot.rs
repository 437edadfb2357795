//! A blocking channel carrying exactly one value from a task to its waiter.
//!
//! The channel is pending until the sender either delivers a value or is
//! dropped, in which case the receiver observes it as closed.

use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

use crate::join_handle::JoinError;

pub fn channel<T>() -> (OneshotSender<T>, OneshotReceiver<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(State::Pending),
        signal: Condvar::new(),
    });
    (OneshotSender(Some(slot.clone())), OneshotReceiver(slot))
}

/// Creates a receiver that already holds `value`.
pub fn ready<T>(value: T) -> OneshotReceiver<T> {
    OneshotReceiver(Arc::new(Slot {
        state: Mutex::new(State::Ready(value)),
        signal: Condvar::new(),
    }))
}

struct Slot<T> {
    state: Mutex<State<T>>,
    signal: Condvar,
}

enum State<T> {
    Pending,
    Ready(T),
    Closed,
}

impl<T> Slot<T> {
    fn complete(&self, next: State<T>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, State::Pending) {
            *state = next;
            self.signal.notify_all();
        }
    }
}

/// The sending half. Dropping it without sending closes the channel.
pub struct OneshotSender<T>(Option<Arc<Slot<T>>>);

impl<T> OneshotSender<T> {
    pub fn send(mut self, value: T) {
        if let Some(slot) = self.0.take() {
            slot.complete(State::Ready(value));
        }
    }
}

impl<T> Drop for OneshotSender<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.0.take() {
            slot.complete(State::Closed);
        }
    }
}

/// The receiving half.
pub struct OneshotReceiver<T>(Arc<Slot<T>>);

impl<T> OneshotReceiver<T> {
    pub fn is_pending(&self) -> bool {
        let state = self.0.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*state, State::Pending)
    }

    /// Blocks until the value arrives or the sender is dropped.
    pub fn recv(&self) -> Result<T, JoinError> {
        self.recv_deadline(None)
    }

    /// Blocks for at most `timeout`. A timed out receiver stays usable.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, JoinError> {
        self.recv_deadline(Instant::now().checked_add(timeout))
    }

    fn recv_deadline(&self, deadline: Option<Instant>) -> Result<T, JoinError> {
        let mut state = self.0.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match std::mem::replace(&mut *state, State::Closed) {
                State::Ready(value) => return Ok(value),
                State::Closed => return Err(JoinError::Canceled),
                State::Pending => *state = State::Pending,
            }
            state = match deadline {
                None => self
                    .0
                    .signal
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(JoinError::Timeout);
                    }
                    self.0
                        .signal
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}
