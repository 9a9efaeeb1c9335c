//! Spin-based mutex backend.
//!
//! The owner is a single atomic word, so acquiring and releasing never touch the
//! OS. Contended acquirers busy-wait for [`SpinConfig::spins_before_yield`]
//! iterations and then yield their time slice between attempts. Suited to very
//! short critical sections.

use crate::locks::{MutexBackend, MutexCondition, OwnerId};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use weft_types::config::SpinConfig;
use weft_types::errors::Error;
use weft_types::result::SyncResult;

const UNOWNED: u64 = 0;

/// A mutex whose waiters spin instead of parking
#[derive(Clone)]
pub struct SpinMutex {
    inner: Arc<SpinInner>,
}

struct SpinInner {
    owner: AtomicU64,
    config: SpinConfig,
}

impl Default for SpinMutex {
    fn default() -> Self {
        Self::new(SpinConfig::default())
    }
}

impl SpinMutex {
    pub fn new(config: SpinConfig) -> Self {
        Self {
            inner: Arc::new(SpinInner {
                owner: AtomicU64::new(UNOWNED),
                config,
            }),
        }
    }

    fn try_lock_as(&self, me: OwnerId) -> bool {
        self.inner
            .owner
            .compare_exchange_weak(UNOWNED, me.as_u64(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn acquire_until(&self, deadline: Option<(Instant, Duration)>) -> SyncResult<()> {
        let me = OwnerId::current();
        if self.owner() == Some(me) {
            return SyncResult::error(Error::illegal_state(
                "mutex is not reentrant and is already owned by the calling thread",
            ));
        }

        let mut backoff = Backoff::new(self.inner.config);
        while !self.try_lock_as(me) {
            if let Some((deadline, timeout)) = deadline {
                if Instant::now() >= deadline {
                    log::trace!(target: "weft", "{me:?} timed out acquiring spin mutex");
                    return SyncResult::error(Error::Timeout(timeout));
                }
            }

            backoff.snooze();
        }

        SyncResult::success(())
    }
}

impl MutexBackend for SpinMutex {
    type Condition = SpinCondition;

    fn acquire(&self) -> SyncResult<()> {
        self.acquire_until(None)
    }

    fn acquire_timeout(&self, timeout: Duration) -> SyncResult<()> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.acquire_until(Some((deadline, timeout))),
            None => self.acquire_until(None),
        }
    }

    fn try_acquire(&self) -> SyncResult<bool> {
        let me = OwnerId::current();
        match self.inner.owner.compare_exchange(
            UNOWNED,
            me.as_u64(),
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => SyncResult::success(true),
            Err(current) if current == me.as_u64() => SyncResult::error(Error::illegal_state(
                "mutex is not reentrant and is already owned by the calling thread",
            )),
            Err(_) => SyncResult::success(false),
        }
    }

    fn release(&self) -> SyncResult<()> {
        let me = OwnerId::current();
        match self.inner.owner.compare_exchange(
            me.as_u64(),
            UNOWNED,
            Ordering::Release,
            Ordering::Relaxed,
        ) {
            Ok(_) => SyncResult::success(()),
            Err(current) => SyncResult::error(Error::illegal_state(format!(
                "{me:?} released a mutex owned by {:?}",
                OwnerId::from_raw(current)
            ))),
        }
    }

    fn owner(&self) -> Option<OwnerId> {
        OwnerId::from_raw(self.inner.owner.load(Ordering::Acquire))
    }

    fn create_condition(&self) -> SpinCondition {
        SpinCondition {
            mutex: self.clone(),
            wait_set: Arc::new(WaitSet::default()),
        }
    }
}

/// A condition variable bound to one [`SpinMutex`].
///
/// Signals hand out permits to registered waiters. A waiter registers while it
/// still owns the mutex, so a signal sent by the next owner always sees it.
///
/// Permits are pooled rather than addressed: a waiter that registers after a
/// `signal` may take the permit ahead of the waiter it was sent for. Each
/// permit still wakes exactly one registered waiter, so no wakeup is lost, but
/// wake order is not FIFO.
#[derive(Clone)]
pub struct SpinCondition {
    mutex: SpinMutex,
    wait_set: Arc<WaitSet>,
}

#[derive(Default)]
struct WaitSet {
    // registered waiters that have not been granted a permit yet
    waiters: AtomicUsize,
    permits: AtomicUsize,
}

impl WaitSet {
    fn take_permit(&self) -> bool {
        let mut permits = self.permits.load(Ordering::Acquire);
        while permits > 0 {
            match self.permits.compare_exchange_weak(
                permits,
                permits - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => permits = actual,
            }
        }

        false
    }
}

impl MutexCondition for SpinCondition {
    fn wait(&self) -> SyncResult<()> {
        if !self.mutex.is_held_by_current_thread() {
            return SyncResult::error(Error::illegal_state(
                "wait called without holding the mutex",
            ));
        }

        let _ = self.wait_set.waiters.fetch_add(1, Ordering::AcqRel);
        if let Err(err) = self.mutex.release().into_outcome() {
            return SyncResult::error(err);
        }

        let mut backoff = Backoff::new(self.mutex.inner.config);
        while !self.wait_set.take_permit() {
            backoff.snooze();
        }

        self.mutex.acquire()
    }

    fn signal(&self) {
        let waiters = &self.wait_set.waiters;
        let mut registered = waiters.load(Ordering::Acquire);
        while registered > 0 {
            match waiters.compare_exchange_weak(
                registered,
                registered - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let _ = self.wait_set.permits.fetch_add(1, Ordering::AcqRel);
                    return;
                }
                Err(actual) => registered = actual,
            }
        }
    }

    fn signal_all(&self) {
        let registered = self.wait_set.waiters.swap(0, Ordering::AcqRel);
        if registered > 0 {
            let _ = self.wait_set.permits.fetch_add(registered, Ordering::AcqRel);
        }
    }
}

struct Backoff {
    spins: u32,
    config: SpinConfig,
}

impl Backoff {
    fn new(config: SpinConfig) -> Self {
        Self { spins: 0, config }
    }

    fn snooze(&mut self) {
        if self.spins < self.config.spins_before_yield {
            self.spins += 1;
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
    }
}
