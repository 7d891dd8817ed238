//! Per-period single-writer locks.
//!
//! Settlement of one period never interleaves with another settlement of the
//! same period; different periods proceed in parallel.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::PeriodId;

#[derive(Debug, Default)]
pub struct PeriodLocks {
    locks: Mutex<HashMap<PeriodId, Arc<Mutex<()>>>>,
}

impl PeriodLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, period_id: PeriodId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(period_id).or_default().clone()
    }

    /// Run `f` while holding the period's lock.
    pub fn with_period<T>(&self, period_id: PeriodId, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(period_id);
        let _guard = lock.lock();
        f()
    }

    /// Number of periods that have been locked at least once
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
