//! Wall-clock and key-count budgets for scans.
//!
//! A [`ScanBudget`] is passed explicitly into every call that may touch
//! storage (`initialize`, `next`, `move_to`, ivarator population, term
//! expansion). Long-running scans check it periodically; the caller decides
//! whether expiry is an error or a "threshold exceeded" signal.

use std::time::{Duration, Instant};

use crate::{Result, error::Error};

/// A deadline shared by all scans of one evaluation.
///
/// `ScanBudget` is `Copy`: sub-scans narrow it with [`narrowed`](Self::narrowed)
/// and hand the copy to worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanBudget {
    deadline: Option<Instant>,
}

impl ScanBudget {
    /// A budget that never expires.
    pub fn unlimited() -> ScanBudget {
        ScanBudget { deadline: None }
    }

    /// A budget expiring `timeout` from now. Timeouts too large to represent
    /// are treated as unlimited.
    pub fn with_timeout(timeout: Duration) -> ScanBudget {
        ScanBudget {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn until(deadline: Instant) -> ScanBudget {
        ScanBudget {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_unlimited(&self) -> bool {
        self.deadline.is_none()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, `None` when unlimited.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns a budget that expires at the earlier of this deadline and
    /// `timeout` from now.
    pub fn narrowed(&self, timeout: Duration) -> ScanBudget {
        let other = ScanBudget::with_timeout(timeout);
        match (self.deadline, other.deadline) {
            (Some(a), Some(b)) => ScanBudget::until(a.min(b)),
            (Some(a), None) => ScanBudget::until(a),
            (None, b) => ScanBudget { deadline: b },
        }
    }

    /// Fails with `DeadlineExceeded` once the deadline has passed.
    ///
    /// # Arguments
    ///
    /// * `context` - Describes the interrupted activity for the error message.
    #[inline]
    pub fn check(&self, context: &str) -> Result<()> {
        if self.is_expired() {
            Err(Error::deadline_exceeded(context))
        } else {
            Ok(())
        }
    }
}

/// Counts keys examined by a bounded scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBudget {
    limit: Option<u64>,
    used: u64,
}

impl KeyBudget {
    pub fn new(limit: u64) -> KeyBudget {
        KeyBudget {
            limit: Some(limit),
            used: 0,
        }
    }

    pub fn unlimited() -> KeyBudget {
        KeyBudget {
            limit: None,
            used: 0,
        }
    }

    /// Records `count` more keys. Returns `false` once the total exceeds the
    /// limit.
    pub fn charge(&mut self, count: u64) -> bool {
        self.used = self.used.saturating_add(count);
        !self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.used > limit)
    }

    pub fn used(&self) -> u64 {
        self.used
    }
}
