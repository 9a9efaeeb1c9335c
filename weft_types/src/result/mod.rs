//! Deferred results.
//!
//! Every fallible weft operation returns something implementing [`Eventual`]: a
//! computation that either already completed ([`SyncResult`]) or will complete the
//! first time somebody waits on it ([`LazyResult`]). Results chain with
//! [`Eventual::then`] and [`Eventual::catch_error`], which build new lazy results
//! without running anything. Only [`Eventual::wait`] (or [`Eventual::outcome`])
//! forces a chain, and it turns a stored failure into an `Err` the caller sees.
//!
//! Chained functions report failure by returning `Err(Failure)`; there is no
//! unwinding involved. A panicking chained function is recorded as a failure too.
//!
//! ```rust,ignore
//! use weft_types::prelude::*;
//!
//! let parsed = LazyResult::create(|| Ok("42".to_string()))
//!     .then(|text| text.parse::<u32>().map_err(Failure::new))
//!     .catch_error::<std::num::ParseIntError, _>(|_| Ok(0));
//!
//! assert_eq!(parsed.wait().unwrap(), 42);
//! ```

use crate::errors::{AwaitError, Failure, WaitError};
use std::fmt::{Debug, Display};
use std::sync::Arc;

pub mod lazy;
pub mod sync;

pub use lazy::LazyResult;
pub use sync::SyncResult;

/// The completed state of a result: the value, or the failure that replaced it
pub type Outcome<T> = Result<T, Failure>;

/// A computation carrying either a success value or a [`Failure`] once completed.
///
/// Implementors memoize: once an outcome has been observed it never changes, and
/// observing it again never re-runs anything.
pub trait Eventual<T>: Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    /// Whether the outcome is already known without forcing anything
    fn is_completed(&self) -> bool;

    /// Forces the computation if needed and returns its raw outcome
    fn outcome(&self) -> Outcome<T>;

    /// The lazy node behind this result, if there is one. Chains link to it
    /// directly so forcing them never recurses
    #[doc(hidden)]
    fn as_lazy(&self) -> Option<LazyResult<T>> {
        None
    }

    /// Forces the computation and returns its value. A failure comes back inside
    /// the [`AwaitError`] envelope
    fn wait(&self) -> Result<T, AwaitError> {
        self.outcome().map_err(AwaitError::new)
    }

    /// Like [`Eventual::wait`], but a failure of kind `E` is returned unwrapped
    fn wait_expecting<E>(&self) -> Result<T, WaitError<E>>
    where
        Self: Sized,
        E: Clone + Display + Debug + Send + Sync + 'static,
    {
        self.outcome().map_err(|failure| {
            if let Some(err) = failure.downcast_ref::<E>() {
                return WaitError::Expected(err.clone());
            }

            WaitError::Await(AwaitError::new(failure))
        })
    }

    /// Returns a lazy result that runs `f` on this result's value. A failure skips
    /// `f` and propagates unchanged
    fn then<U, F>(&self, f: F) -> LazyResult<U>
    where
        Self: Clone + Sized,
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        LazyResult::chain(self.clone(), move |parent| match parent {
            Ok(value) => f(value),
            Err(failure) => Err(failure),
        })
    }

    /// Returns a lazy result that replaces a failure of kind `E` with the outcome of
    /// `f`. Values and failures of other kinds pass through unchanged
    fn catch_error<E, F>(&self, f: F) -> LazyResult<T>
    where
        Self: Clone + Sized,
        E: Display + Debug + Send + Sync + 'static,
        F: FnOnce(&E) -> Outcome<T> + Send + 'static,
    {
        LazyResult::chain(self.clone(), move |parent| {
            let failure = match parent {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            if let Some(err) = failure.downcast_ref::<E>() {
                return f(err);
            }

            Err(failure)
        })
    }

    /// Returns a lazy result that replaces any failure with the outcome of `f`
    fn catch_any<F>(&self, f: F) -> LazyResult<T>
    where
        Self: Clone + Sized,
        F: FnOnce(Failure) -> Outcome<T> + Send + 'static,
    {
        LazyResult::chain(self.clone(), move |parent| parent.or_else(f))
    }
}

/// A type-erased handle to any [`Eventual`], for holding "some result" without naming its variant
pub struct Deferred<T: Clone + Send + Sync + 'static> {
    inner: Arc<dyn Eventual<T>>,
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    pub fn new<R: Eventual<T>>(result: R) -> Self {
        Self {
            inner: Arc::new(result),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Eventual<T> for Deferred<T> {
    fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }

    fn outcome(&self) -> Outcome<T> {
        self.inner.outcome()
    }

    fn as_lazy(&self) -> Option<LazyResult<T>> {
        self.inner.as_lazy()
    }
}

impl<T: Clone + Send + Sync + 'static> From<SyncResult<T>> for Deferred<T> {
    fn from(result: SyncResult<T>) -> Self {
        Deferred::new(result)
    }
}

impl<T: Clone + Send + Sync + 'static> From<LazyResult<T>> for Deferred<T> {
    fn from(result: LazyResult<T>) -> Self {
        Deferred::new(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct KindA;
    #[derive(Debug, Clone, PartialEq)]
    struct KindB(&'static str);

    impl Display for KindA {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "kind a")
        }
    }

    impl Display for KindB {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "kind b: {}", self.0)
        }
    }

    impl std::error::Error for KindA {}
    impl std::error::Error for KindB {}

    #[test]
    fn failure_skips_then() {
        weft_logging::setup_log_no_panic_hook();
        let called = Arc::new(AtomicUsize::new(0));
        let called_clone = called.clone();

        let result = LazyResult::<u32>::create(|| Err(Failure::new(KindA))).then(move |value| {
            called_clone.fetch_add(1, Ordering::SeqCst);
            Ok(value + 1)
        });

        let err = result.wait().unwrap_err();
        assert!(err.cause().is::<KindA>());
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn catch_error_ignores_other_kinds() {
        let handled = Arc::new(AtomicUsize::new(0));
        let handled_clone = handled.clone();

        let result = SyncResult::<u32>::error(Failure::new(KindB("original")))
            .catch_error::<KindA, _>(move |_| {
                handled_clone.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            });

        match result.wait_expecting::<KindB>() {
            Err(WaitError::Expected(err)) => assert_eq!(err, KindB("original")),
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }

        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn catch_error_recovers_matching_kind() {
        let result = LazyResult::<u32>::create(|| Err(Failure::new(KindB("io"))))
            .catch_error::<KindB, _>(|err| Ok(err.0.len() as u32))
            .then(|value| Ok(value * 10));

        assert_eq!(result.wait().unwrap(), 20);
    }

    #[test]
    fn catch_error_can_raise_a_new_failure() {
        let result = LazyResult::<u32>::create(|| Err(Failure::new(KindA)))
            .catch_error::<KindA, _>(|_| Err(Failure::new(KindB("converted"))));

        let err = result.wait().unwrap_err();
        assert!(err.cause().is::<KindB>());
        assert!(!err.cause().is::<KindA>());
    }

    #[test]
    fn success_passes_through_catch() {
        let result = SyncResult::success(5u8)
            .catch_error::<KindA, _>(|_| Ok(0))
            .catch_any(|_| Ok(1));
        assert_eq!(result.wait().unwrap(), 5);
    }

    #[test]
    fn wait_expecting_wraps_non_matching() {
        let result = SyncResult::<()>::error(Error::Disposed("Byte channel"));
        match result.wait_expecting::<KindA>() {
            Err(WaitError::Await(err)) => assert!(err.cause().is_disposed()),
            _ => panic!("expected the await envelope"),
        }

        match result.wait_expecting::<Error>() {
            Err(WaitError::Expected(Error::Disposed(name))) => assert_eq!(name, "Byte channel"),
            _ => panic!("expected the unwrapped kind"),
        }

        assert_eq!(
            result.wait_expecting::<Error>().unwrap_err().expected(),
            Some(Error::Disposed("Byte channel"))
        );
        assert!(result.wait_expecting::<KindA>().unwrap_err().expected().is_none());
    }

    #[test]
    fn long_chain_forces_each_stage_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let root_counter = counter.clone();

        let mut chain = LazyResult::create(move || {
            root_counter.fetch_add(1, Ordering::SeqCst);
            Ok(0u64)
        });

        for _ in 0..100 {
            let counter = counter.clone();
            chain = chain.then(move |value| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(value + 1)
            });
        }

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(chain.wait().unwrap(), 100);
        assert_eq!(chain.wait().unwrap(), 100);
        assert_eq!(counter.load(Ordering::SeqCst), 101);
    }

    #[test]
    fn deferred_erases_variant() {
        let results: Vec<Deferred<u8>> = vec![
            SyncResult::success(1u8).into(),
            LazyResult::create(|| Ok(2u8)).into(),
            Deferred::new(SyncResult::success(3u8).then(|v| Ok(v + 1))),
        ];

        assert!(results[0].is_completed());
        assert!(!results[1].is_completed());

        let values = results
            .iter()
            .map(|r| r.wait().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(values, vec![1, 2, 4]);

        let chained = results[1].then(|v| Ok(v * 3));
        assert_eq!(chained.wait().unwrap(), 6);
    }
}
