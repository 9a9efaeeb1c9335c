//! Native blocking mutex backend built on parking_lot.
//!
//! Waiting threads are parked by the OS instead of spinning. Ownership is kept in
//! a small parking_lot-guarded cell; two condvars hang off that cell, one for
//! threads waiting to acquire and one per [`BlockingCondition`].

use crate::locks::{MutexBackend, MutexCondition, OwnerId};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use weft_types::errors::Error;
use weft_types::result::SyncResult;

/// A mutex whose waiters block in the OS scheduler
#[derive(Clone, Default)]
pub struct BlockingMutex {
    inner: Arc<BlockingInner>,
}

#[derive(Default)]
struct BlockingInner {
    owner: Mutex<Option<OwnerId>>,
    released: Condvar,
}

impl BlockingMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the mutex, giving up at `deadline` when one is set. The duration
    /// is only carried for the timeout error
    fn acquire_until(&self, deadline: Option<(Instant, Duration)>) -> SyncResult<()> {
        let me = OwnerId::current();
        let mut owner = self.inner.owner.lock();

        if *owner == Some(me) {
            return SyncResult::error(reentrant_acquire());
        }

        while owner.is_some() {
            match deadline {
                Some((deadline, timeout)) => {
                    if self.inner.released.wait_until(&mut owner, deadline).timed_out()
                        && owner.is_some()
                    {
                        log::trace!(target: "weft", "{me:?} timed out acquiring blocking mutex");
                        return SyncResult::error(Error::Timeout(timeout));
                    }
                }

                None => self.inner.released.wait(&mut owner),
            }
        }

        *owner = Some(me);
        log::trace!(target: "weft", "{me:?} acquired blocking mutex");
        SyncResult::success(())
    }
}

fn reentrant_acquire() -> Error {
    Error::illegal_state("mutex is not reentrant and is already owned by the calling thread")
}

impl MutexBackend for BlockingMutex {
    type Condition = BlockingCondition;

    fn acquire(&self) -> SyncResult<()> {
        self.acquire_until(None)
    }

    fn acquire_timeout(&self, timeout: Duration) -> SyncResult<()> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.acquire_until(Some((deadline, timeout))),
            // too far in the future to represent; equivalent to waiting forever
            None => self.acquire_until(None),
        }
    }

    fn try_acquire(&self) -> SyncResult<bool> {
        let me = OwnerId::current();
        let mut owner = self.inner.owner.lock();
        match *owner {
            None => {
                *owner = Some(me);
                SyncResult::success(true)
            }
            Some(current) if current == me => SyncResult::error(reentrant_acquire()),
            Some(_) => SyncResult::success(false),
        }
    }

    fn release(&self) -> SyncResult<()> {
        let me = OwnerId::current();
        let mut owner = self.inner.owner.lock();
        if *owner != Some(me) {
            return SyncResult::error(Error::illegal_state(format!(
                "{me:?} released a mutex owned by {:?}",
                *owner
            )));
        }

        *owner = None;
        let _ = self.inner.released.notify_one();
        log::trace!(target: "weft", "{me:?} released blocking mutex");
        SyncResult::success(())
    }

    fn owner(&self) -> Option<OwnerId> {
        *self.inner.owner.lock()
    }

    fn create_condition(&self) -> BlockingCondition {
        BlockingCondition {
            mutex: self.clone(),
            signalled: Arc::new(Condvar::new()),
        }
    }
}

/// A condition variable bound to one [`BlockingMutex`]
#[derive(Clone)]
pub struct BlockingCondition {
    mutex: BlockingMutex,
    signalled: Arc<Condvar>,
}

impl MutexCondition for BlockingCondition {
    fn wait(&self) -> SyncResult<()> {
        let me = OwnerId::current();
        let inner = &self.mutex.inner;
        let mut owner = inner.owner.lock();

        if *owner != Some(me) {
            return SyncResult::error(Error::illegal_state(
                "wait called without holding the mutex",
            ));
        }

        // releasing and parking happen under the same cell lock, so a signal
        // sent by the next owner cannot slip in between
        *owner = None;
        let _ = inner.released.notify_one();
        self.signalled.wait(&mut owner);

        while owner.is_some() {
            inner.released.wait(&mut owner);
        }

        *owner = Some(me);
        SyncResult::success(())
    }

    fn signal(&self) {
        let _ = self.signalled.notify_one();
    }

    fn signal_all(&self) {
        let _ = self.signalled.notify_all();
    }
}
