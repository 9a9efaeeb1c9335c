//! The mutex capability shared by every backend.
//!
//! A [`MutexBackend`] is a raw, data-less mutual exclusion primitive with explicit
//! ownership: the thread that acquired it is its owner and only the owner may
//! release it. Data guarded by a backend lives in a [`Protected`] cell, which
//! refuses access from any thread that does not currently own the mutex.
//!
//! Two backends ship with this crate: [`crate::standard::locks::BlockingMutex`],
//! which parks waiting threads, and [`crate::spin::locks::SpinMutex`], which
//! busy-waits. Everything built on top of the trait (the byte channel included)
//! runs unchanged on either.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use weft_types::errors::Error;
use weft_types::result::{Outcome, SyncResult};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_OWNER_ID: OwnerId = OwnerId(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed));
}

/// Process-unique identity of a thread, used to record mutex ownership.
///
/// Ids are allocated lazily the first time a thread asks for its own id and are
/// never reused. Zero is never a valid id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// The id of the calling thread
    pub fn current() -> Self {
        CURRENT_OWNER_ID.with(|id| *id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

/// A mutual exclusion primitive with explicit acquire and release.
///
/// Mutexes are non-reentrant: acquiring a mutex the calling thread already owns
/// fails with [`Error::IllegalState`] instead of deadlocking. Prefer
/// [`MutexBackend::critical_section`] over raw acquire/release; it releases the
/// mutex on every exit path, panics included.
pub trait MutexBackend: Clone + Send + Sync + 'static {
    type Condition: MutexCondition;

    /// Blocks until the mutex is free, then marks it owned by the caller
    fn acquire(&self) -> SyncResult<()>;

    /// Like [`MutexBackend::acquire`], but fails with [`Error::Timeout`] once `timeout` elapses
    fn acquire_timeout(&self, timeout: Duration) -> SyncResult<()>;

    /// Acquires the mutex if it is free. Returns `false` when another thread owns it. Never blocks
    fn try_acquire(&self) -> SyncResult<bool>;

    /// Releases the mutex. Fails with [`Error::IllegalState`] unless the caller owns it
    fn release(&self) -> SyncResult<()>;

    /// The current owner, if any
    fn owner(&self) -> Option<OwnerId>;

    /// Creates a condition variable bound to this mutex
    fn create_condition(&self) -> Self::Condition;

    fn is_acquired(&self) -> bool {
        self.owner().is_some()
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.owner() == Some(OwnerId::current())
    }

    /// Creates a condition whose `wait` only returns once `predicate` holds.
    ///
    /// The predicate is always evaluated while the mutex is held, so it may read
    /// [`Protected`] state guarded by this mutex.
    fn create_condition_with<P>(&self, predicate: P) -> PredicateCondition<Self>
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        PredicateCondition {
            mutex: self.clone(),
            condition: self.create_condition(),
            predicate: Box::new(predicate),
        }
    }

    /// Runs `action` while holding the mutex
    fn critical_section<R, F>(&self, action: F) -> SyncResult<R>
    where
        F: FnOnce() -> R,
    {
        self.try_critical_section(|| Ok(action()))
    }

    /// Runs a fallible `action` while holding the mutex. The outcome of `action`
    /// becomes the outcome of the critical section
    fn try_critical_section<R, F>(&self, action: F) -> SyncResult<R>
    where
        F: FnOnce() -> Outcome<R>,
    {
        if let Err(err) = self.acquire().into_outcome() {
            return SyncResult::error(err);
        }

        let _release = ReleaseOnDrop { mutex: self };
        SyncResult::from_outcome(action())
    }
}

/// A condition variable bound to exactly one mutex.
///
/// `wait` requires the caller to own the mutex. It releases the mutex and blocks
/// as one atomic step, then reacquires the mutex before returning. Signals sent
/// while nobody waits are dropped; use [`MutexBackend::create_condition_with`]
/// when a wakeup must not be missed.
pub trait MutexCondition: Send + Sync + 'static {
    fn wait(&self) -> SyncResult<()>;

    /// Wakes one waiting thread
    fn signal(&self);

    /// Wakes every waiting thread
    fn signal_all(&self);
}

/// A condition that loops on a predicate, covering spurious and stolen wakeups
pub struct PredicateCondition<M: MutexBackend> {
    mutex: M,
    condition: M::Condition,
    predicate: Box<dyn Fn() -> bool + Send + Sync>,
}

impl<M: MutexBackend> PredicateCondition<M> {
    /// Evaluates the predicate. The caller must own the mutex
    pub fn is_satisfied(&self) -> bool {
        (self.predicate)()
    }
}

impl<M: MutexBackend> MutexCondition for PredicateCondition<M> {
    fn wait(&self) -> SyncResult<()> {
        if !self.mutex.is_held_by_current_thread() {
            return SyncResult::error(Error::illegal_state(
                "wait called without holding the mutex",
            ));
        }

        while !self.is_satisfied() {
            if let Err(err) = self.condition.wait().into_outcome() {
                return SyncResult::error(err);
            }
        }

        SyncResult::success(())
    }

    fn signal(&self) {
        self.condition.signal()
    }

    fn signal_all(&self) {
        self.condition.signal_all()
    }
}

struct ReleaseOnDrop<'a, M: MutexBackend> {
    mutex: &'a M,
}

impl<M: MutexBackend> Drop for ReleaseOnDrop<'_, M> {
    fn drop(&mut self) {
        if let Err(err) = self.mutex.release().into_outcome() {
            log::warn!(target: "weft", "Critical section could not release its mutex: {err}");
        }
    }
}

/// State that may only be touched by the thread owning a particular mutex
pub struct Protected<T, M: MutexBackend> {
    mutex: M,
    cell: Mutex<T>,
}

impl<T, M: MutexBackend> Protected<T, M> {
    pub fn new(mutex: M, value: T) -> Self {
        Self {
            mutex,
            cell: Mutex::new(value),
        }
    }

    pub fn mutex(&self) -> &M {
        &self.mutex
    }

    /// Runs `f` on the state. Fails with [`Error::IllegalState`] unless the caller
    /// owns the mutex
    pub fn with<R, F>(&self, f: F) -> Outcome<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        if !self.mutex.is_held_by_current_thread() {
            return Err(Error::illegal_state("protected state accessed without holding its mutex").into());
        }

        // uncontended: only the owner of `mutex` reaches this point
        let mut state = self.cell.lock();
        Ok(f(&mut state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spin::locks::SpinMutex;
    use crate::standard::locks::BlockingMutex;
    use weft_types::result::Eventual;

    #[test]
    fn owner_ids_are_unique_per_thread() {
        let here = OwnerId::current();
        assert_eq!(here, OwnerId::current());
        let there = std::thread::spawn(OwnerId::current).join().unwrap();
        assert_ne!(here, there);
        assert!(OwnerId::from_raw(0).is_none());
    }

    fn protected_requires_owner<M: MutexBackend>(mutex: M) {
        let state = Protected::new(mutex.clone(), 0u32);
        assert!(state.with(|v| *v += 1).unwrap_err().is_illegal_state());

        mutex
            .critical_section(|| {
                assert!(state.mutex().is_held_by_current_thread());
                state.with(|v| *v += 1).unwrap()
            })
            .wait()
            .unwrap();

        let value = mutex.critical_section(|| state.with(|v| *v)).wait().unwrap();
        assert_eq!(value.unwrap(), 1);
    }

    #[test]
    fn protected_blocking() {
        protected_requires_owner(BlockingMutex::new());
    }

    #[test]
    fn protected_spin() {
        protected_requires_owner(SpinMutex::default());
    }

    #[test]
    fn critical_section_releases_on_panic() {
        weft_logging::setup_log_no_panic_hook();
        let mutex = BlockingMutex::new();
        let mutex_clone = mutex.clone();

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _ = mutex_clone.critical_section(|| panic!("inside critical section"));
        }));

        assert!(res.is_err());
        assert!(!mutex.is_acquired());
        assert!(mutex.try_acquire().wait().unwrap());
        mutex.release().wait().unwrap();
    }

    #[test]
    fn predicate_wait_requires_owner() {
        let mutex = SpinMutex::default();
        let condition = mutex.create_condition_with(|| true);
        assert!(condition.wait().wait().unwrap_err().cause().is_illegal_state());

        mutex
            .try_critical_section(|| condition.wait().into_outcome())
            .wait()
            .unwrap();
    }
}
