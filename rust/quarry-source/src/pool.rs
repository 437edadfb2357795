//! A bounded pool of backing sources for background scans.
//!
//! Ivarator population runs on worker threads, each of which needs its own
//! cursor. The pool caps how many cursors exist at once; a checkout blocks
//! until one is returned or the scan budget runs out.

use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Condvar, Mutex, PoisonError},
};

use quarry_common::{Result, ScanBudget, error::Error};

use crate::source::{EmptySource, SortedSource};

/// Creates fresh, unpositioned cursors over one table.
pub trait SourceFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn SortedSource>>;
}

/// A factory that deep-copies a prototype cursor.
pub struct DeepCopyFactory(Mutex<Box<dyn SortedSource>>);

impl DeepCopyFactory {
    pub fn new(prototype: Box<dyn SortedSource>) -> DeepCopyFactory {
        DeepCopyFactory(Mutex::new(prototype))
    }
}

impl SourceFactory for DeepCopyFactory {
    fn create(&self) -> Result<Box<dyn SortedSource>> {
        let prototype = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(prototype.deep_copy())
    }
}

impl SourceFactory for crate::MemorySource {
    fn create(&self) -> Result<Box<dyn SortedSource>> {
        Ok(self.deep_copy())
    }
}

struct PoolState {
    idle: Vec<Box<dyn SortedSource>>,
    created: usize,
}

pub struct SourcePool {
    factory: Arc<dyn SourceFactory>,
    capacity: usize,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl SourcePool {
    /// Creates a pool handing out at most `capacity` sources at a time.
    pub fn new(factory: Arc<dyn SourceFactory>, capacity: usize) -> Result<Arc<SourcePool>> {
        quarry_common::verify_arg!(capacity, capacity > 0);
        Ok(Arc::new(SourcePool {
            factory,
            capacity,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                created: 0,
            }),
            returned: Condvar::new(),
        }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of sources created so far; never exceeds the capacity.
    pub fn created(&self) -> usize {
        self.lock().created
    }

    /// Takes a source out of the pool, creating one if the pool is below
    /// capacity and blocking otherwise.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` when `budget` expires while waiting.
    pub fn checkout(self: &Arc<Self>, budget: &ScanBudget) -> Result<PooledSource> {
        let mut state = self.lock();
        loop {
            if let Some(source) = state.idle.pop() {
                return Ok(self.wrap(source));
            }
            if state.created < self.capacity {
                state.created += 1;
                drop(state);
                return match self.factory.create() {
                    Ok(source) => Ok(self.wrap(source)),
                    Err(e) => {
                        self.lock().created -= 1;
                        self.returned.notify_one();
                        Err(e)
                    }
                };
            }
            state = match budget.remaining() {
                None => self
                    .returned
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(remaining) if remaining.is_zero() => {
                    return Err(Error::deadline_exceeded("waiting for a pooled source"));
                }
                Some(remaining) => {
                    self.returned
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn wrap(self: &Arc<Self>, source: Box<dyn SortedSource>) -> PooledSource {
        PooledSource {
            pool: self.clone(),
            source,
        }
    }

    fn release(&self, source: Box<dyn SortedSource>) {
        self.lock().idle.push(source);
        self.returned.notify_one();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A checked-out source; returns itself to the pool on drop.
pub struct PooledSource {
    pool: Arc<SourcePool>,
    source: Box<dyn SortedSource>,
}

impl Deref for PooledSource {
    type Target = dyn SortedSource;

    fn deref(&self) -> &Self::Target {
        &*self.source
    }
}

impl DerefMut for PooledSource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.source
    }
}

impl Drop for PooledSource {
    fn drop(&mut self) {
        let source = std::mem::replace(&mut self.source, Box::new(EmptySource));
        self.pool.release(source);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{Key, MemorySource, Range};

    fn pool(capacity: usize) -> Arc<SourcePool> {
        let table = MemorySource::from_keys([Key::new("r", "f", "q")]);
        SourcePool::new(Arc::new(table), capacity).unwrap()
    }

    #[test]
    fn test_checkout_reuses_sources() {
        let pool = pool(2);
        let budget = ScanBudget::unlimited();
        {
            let mut a = pool.checkout(&budget).unwrap();
            a.seek(&Range::all(), &[], false).unwrap();
            assert!(a.has_top());
        }
        let _b = pool.checkout(&budget).unwrap();
        let _c = pool.checkout(&budget).unwrap();
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn test_checkout_times_out_when_exhausted() {
        let pool = pool(1);
        let held = pool.checkout(&ScanBudget::unlimited()).unwrap();
        let err = pool
            .checkout(&ScanBudget::with_timeout(Duration::from_millis(20)))
            .err()
            .unwrap();
        assert!(err.is_deadline_exceeded());
        drop(held);
        assert!(pool.checkout(&ScanBudget::unlimited()).is_ok());
    }

    #[test]
    fn test_checkout_waits_for_release() {
        let pool = pool(1);
        let held = pool.checkout(&ScanBudget::unlimited()).unwrap();
        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.checkout(&ScanBudget::unlimited()).is_ok())
        };
        std::thread::sleep(Duration::from_millis(20));
        drop(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let table = MemorySource::from_keys([]);
        assert!(SourcePool::new(Arc::new(table), 0).is_err());
    }
}
