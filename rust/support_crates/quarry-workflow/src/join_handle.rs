//! Handles for waiting on results of tasks spawned on a [`ThreadPool`](crate::ThreadPool).

use std::time::Duration;

use thiserror::Error;

use crate::oneshot::{self, OneshotReceiver};

/// Reasons a task result could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    /// The task panicked or was dropped before producing a result.
    #[error("task was canceled before completion")]
    Canceled,
    /// The wait timed out; the task may still be running.
    #[error("timed out waiting for task")]
    Timeout,
}

/// A handle for waiting on the result of a spawned task.
///
/// ## Lifecycle
///
/// 1. **Created**: When a task is spawned, a `JoinHandle` is returned
/// 2. **Pending**: The task is running or queued for execution
/// 3. **Ready**: The task has completed and the result is available
/// 4. **Consumed**: The result has been retrieved via [`join()`](Self::join)
pub struct JoinHandle<R>(OneshotReceiver<R>);

impl<R> JoinHandle<R> {
    pub(crate) fn new(rx: OneshotReceiver<R>) -> JoinHandle<R> {
        JoinHandle(rx)
    }

    /// Creates a `JoinHandle` that is immediately ready with the given result.
    pub fn ready(res: R) -> Self {
        Self(oneshot::ready(res))
    }

    /// Checks if the task result is ready without blocking.
    pub fn is_ready(&self) -> bool {
        !self.0.is_pending()
    }

    /// Waits for the task to complete and returns its result.
    ///
    /// # Returns
    ///
    /// The value produced by the task, or [`JoinError::Canceled`] if the task
    /// panicked.
    pub fn join(self) -> Result<R, JoinError> {
        self.0.recv()
    }

    /// Waits for at most `timeout`. On [`JoinError::Timeout`] the handle is
    /// returned alongside the error so the caller may keep waiting.
    pub fn join_timeout(self, timeout: Duration) -> Result<R, (JoinError, Option<Self>)> {
        match self.0.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(JoinError::Timeout) => Err((JoinError::Timeout, Some(self))),
            Err(e) => Err((e, None)),
        }
    }

    /// Waits for all handles, collecting their results in input order.
    pub fn join_all(handles: impl IntoIterator<Item = JoinHandle<R>>) -> Vec<Result<R, JoinError>> {
        handles.into_iter().map(|h| h.join()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ThreadPool;

    #[test]
    fn test_ready_handle() {
        let handle = JoinHandle::ready(5);
        assert!(handle.is_ready());
        assert_eq!(handle.join().unwrap(), 5);
    }

    #[test]
    fn test_join_timeout_keeps_handle() {
        let pool = ThreadPool::new(1);
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let handle = pool.spawn(move || {
            let _ = gate_rx.recv();
            11
        });
        let (err, handle) = handle
            .join_timeout(Duration::from_millis(10))
            .err()
            .unwrap();
        assert_eq!(err, JoinError::Timeout);
        gate_tx.send(()).unwrap();
        assert_eq!(handle.unwrap().join().unwrap(), 11);
    }
}
