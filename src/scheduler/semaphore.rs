//! Counting semaphore gating task eligibility.
//!
//! `try_acquire` never blocks: workers that fail to acquire park
//! themselves through the pool's sleep protocol instead of spinning
//! here. `release` wakes the pool's sleepers (broadcast, not targeted)
//! when the count transitions from non-positive to positive.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use super::pool::PoolInner;

pub struct Semaphore {
    count: AtomicI32,
    waker: OnceLock<Weak<PoolInner>>,
}

impl Semaphore {
    /// Create a semaphore with the given initial count. It wakes no
    /// one until it is used with a pool (submitting a gated task
    /// attaches it).
    pub fn new(initial: i32) -> Arc<Self> {
        Arc::new(Self {
            count: AtomicI32::new(initial),
            waker: OnceLock::new(),
        })
    }

    pub fn count(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }

    /// Subtract `n` if the result stays non-negative; otherwise leave
    /// the count unchanged and report failure.
    pub fn try_acquire(&self, n: i32) -> bool {
        debug_assert!(n > 0, "acquire of a non-positive count");
        let mut cur = self.count.load(Ordering::Acquire);
        loop {
            if cur < n {
                return false;
            }
            match self.count.compare_exchange_weak(
                cur,
                cur - n,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(seen) => cur = seen,
            }
        }
    }

    /// Add `n`, waking the pool's sleeping threads when the count goes
    /// from non-positive to positive.
    pub fn release(&self, n: i32) {
        debug_assert!(n > 0, "release of a non-positive count");
        let old = self.count.fetch_add(n, Ordering::AcqRel);
        if old <= 0 && old + n > 0 {
            if let Some(pool) = self.waker.get().and_then(Weak::upgrade) {
                pool.wake_all();
            }
        }
    }

    /// Bind this semaphore's wakeups to a pool. First binding wins;
    /// a semaphore gates work in one pool for its whole life.
    pub(crate) fn attach(&self, pool: &Arc<PoolInner>) {
        let _ = self.waker.set(Arc::downgrade(pool));
    }
}
