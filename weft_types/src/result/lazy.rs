use crate::errors::{Error, Failure};
use crate::result::{Eventual, Outcome};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

type Thunk<T> = Box<dyn FnOnce(Option<&dyn Stage>) -> Outcome<T> + Send + 'static>;
type Link = Arc<dyn Stage>;
type Reader<P> = fn(&dyn Stage) -> Option<Outcome<P>>;

/// A result computed the first time somebody waits on it.
///
/// The wrapped function runs at most once. Cloning the handle shares the same
/// memoized outcome, and several threads may force the same result concurrently:
/// exactly one of them runs the function while the others block until the
/// outcome is stored.
///
/// A result created through [`Eventual::then`] or [`LazyResult::chain`] owns a
/// link to its parent. Forcing walks the pending ancestors iteratively and runs
/// them oldest first, so neither forcing nor dropping a chain recurses with its
/// length. The parent link is released as soon as the child's function has run.
pub struct LazyResult<T> {
    inner: Arc<LazyInner<T>>,
}

struct LazyInner<T> {
    pending: Mutex<Option<Pending<T>>>,
    memo: OnceCell<Outcome<T>>,
}

struct Pending<T> {
    function: Thunk<T>,
    parent: Option<Link>,
}

/// One node of a result chain, with its value type erased
trait Stage: Send + Sync + 'static {
    /// The parent this stage still waits on. `None` once forced
    fn pending_parent(&self) -> Option<Link>;

    /// Runs this stage. Cheap when every ancestor has completed
    fn force_stage(&self);

    /// Detaches the parent link so the caller can drop the chain iteratively
    fn take_parent(&self) -> Option<Link>;

    fn as_any(&self) -> &dyn Any;
}

/// A parent that is not a lazy result, e.g. a [`crate::result::SyncResult`]
struct Foreign<P, R> {
    result: R,
    _value: PhantomData<fn() -> P>,
}

impl<T: Clone + Send + Sync + 'static> LazyResult<T> {
    /// Defers `f` until the first wait
    pub fn create<F>(f: F) -> Self
    where
        F: FnOnce() -> Outcome<T> + Send + 'static,
    {
        Self::pending(Box::new(move |_: Option<&dyn Stage>| f()), None)
    }

    /// Defers `f` until the first wait, then hands it the forced outcome of `parent`
    pub fn chain<P, R, F>(parent: R, f: F) -> Self
    where
        P: Clone + Send + Sync + 'static,
        R: Eventual<P>,
        F: FnOnce(Outcome<P>) -> Outcome<T> + Send + 'static,
    {
        let (link, read): (Link, Reader<P>) = match parent.as_lazy() {
            Some(lazy) => (lazy.inner as Link, read_lazy::<P> as Reader<P>),
            None => {
                let foreign = Foreign {
                    result: parent,
                    _value: PhantomData,
                };
                (Arc::new(foreign) as Link, read_foreign::<P, R> as Reader<P>)
            }
        };

        Self::pending(
            Box::new(move |parent: Option<&dyn Stage>| {
                let outcome = parent.and_then(read).unwrap_or_else(|| {
                    Err(Error::illegal_state("lazy result lost its parent").into())
                });
                f(outcome)
            }),
            Some(link),
        )
    }

    /// An already-completed lazy result
    pub fn success(value: T) -> Self {
        Self::completed(Ok(value))
    }

    /// An already-failed lazy result
    pub fn error<E: Into<Failure>>(err: E) -> Self {
        Self::completed(Err(err.into()))
    }

    fn pending(function: Thunk<T>, parent: Option<Link>) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                pending: Mutex::new(Some(Pending { function, parent })),
                memo: OnceCell::new(),
            }),
        }
    }

    fn completed(outcome: Outcome<T>) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                pending: Mutex::new(None),
                memo: OnceCell::with_value(outcome),
            }),
        }
    }

    fn force(&self) -> &Outcome<T> {
        if let Some(outcome) = self.inner.memo.get() {
            return outcome;
        }

        let mut ancestors = Vec::new();
        let mut next = self.inner.pending_parent();
        while let Some(stage) = next {
            next = stage.pending_parent();
            ancestors.push(stage);
        }

        for stage in ancestors.into_iter().rev() {
            stage.force_stage();
        }

        self.inner.force_here()
    }
}

impl<T: Clone + Send + Sync + 'static> LazyInner<T> {
    fn force_here(&self) -> &Outcome<T> {
        self.memo.get_or_init(|| {
            let pending = self.pending.lock().take();
            match pending {
                Some(Pending { function, parent }) => run_guarded(move || function(parent.as_deref())),
                // only reachable if a previous forcing attempt panicked past the guard
                None => Err(Error::illegal_state("lazy result function already consumed").into()),
            }
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Stage for LazyInner<T> {
    fn pending_parent(&self) -> Option<Link> {
        if self.memo.get().is_some() {
            return None;
        }

        self.pending.lock().as_ref().and_then(|pending| pending.parent.clone())
    }

    fn force_stage(&self) {
        let _ = self.force_here();
    }

    fn take_parent(&self) -> Option<Link> {
        self.pending.lock().as_mut().and_then(|pending| pending.parent.take())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T> Drop for LazyInner<T> {
    fn drop(&mut self) {
        let mut next = self
            .pending
            .get_mut()
            .as_mut()
            .and_then(|pending| pending.parent.take());

        // unlink ancestors nobody else holds, one at a time
        while let Some(mut stage) = next {
            next = Arc::get_mut(&mut stage).and_then(|unique| unique.take_parent());
        }
    }
}

impl<P, R> Stage for Foreign<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Eventual<P>,
{
    fn pending_parent(&self) -> Option<Link> {
        None
    }

    fn force_stage(&self) {
        let _ = self.result.outcome();
    }

    fn take_parent(&self) -> Option<Link> {
        None
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn read_lazy<P: Clone + Send + Sync + 'static>(stage: &dyn Stage) -> Option<Outcome<P>> {
    stage
        .as_any()
        .downcast_ref::<LazyInner<P>>()
        .map(|inner| inner.force_here().clone())
}

fn read_foreign<P, R>(stage: &dyn Stage) -> Option<Outcome<P>>
where
    P: Clone + Send + Sync + 'static,
    R: Eventual<P>,
{
    stage
        .as_any()
        .downcast_ref::<Foreign<P, R>>()
        .map(|foreign| foreign.result.outcome())
}

fn run_guarded<T>(function: impl FnOnce() -> Outcome<T>) -> Outcome<T> {
    std::panic::catch_unwind(AssertUnwindSafe(function)).unwrap_or_else(|panic| {
        let msg = panic_message(panic.as_ref());
        log::error!(target: "weft", "Chained function panicked: {msg}");
        Err(Failure::msg(format!("Chained function panicked: {msg}")))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl<T: Clone + Send + Sync + 'static> Eventual<T> for LazyResult<T> {
    fn is_completed(&self) -> bool {
        self.inner.memo.get().is_some()
    }

    fn outcome(&self) -> Outcome<T> {
        self.force().clone()
    }

    fn as_lazy(&self) -> Option<LazyResult<T>> {
        Some(self.clone())
    }
}

impl<T> Clone for LazyResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{Deferred, SyncResult};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    fn counting(counter: &Arc<AtomicUsize>, value: u32) -> LazyResult<u32> {
        let counter = counter.clone();
        LazyResult::create(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        })
    }

    #[rstest]
    #[case(2)]
    #[case(10)]
    fn wait_is_memoized(#[case] waits: usize) {
        weft_logging::setup_log_no_panic_hook();
        let counter = Arc::new(AtomicUsize::new(0));
        let result = counting(&counter, 7);

        assert!(!result.is_completed());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        for _ in 0..waits {
            assert_eq!(result.wait().unwrap(), 7);
        }

        assert!(result.is_completed());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shared_parent_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let parent = counting(&counter, 4);
        let doubled = parent.then(|v| Ok(v * 2));
        let squared = parent.then(|v| Ok(v * v));

        assert_eq!(doubled.wait().unwrap(), 8);
        assert_eq!(squared.wait().unwrap(), 16);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chain_sees_parent_failure() {
        let parent = LazyResult::<u32>::error(Error::Timeout(Duration::from_millis(1)));
        let child = LazyResult::chain(parent, |outcome: Outcome<u32>| match outcome {
            Ok(_) => Ok("value"),
            Err(err) if err.is_timeout() => Ok("timed out"),
            Err(err) => Err(err),
        });

        assert_eq!(child.wait().unwrap(), "timed out");
    }

    #[test]
    fn pre_completed_constructors() {
        let ok = LazyResult::success(1u8);
        assert!(ok.is_completed());
        assert_eq!(ok.wait().unwrap(), 1);

        let err = LazyResult::<u8>::error(Error::Disposed("Byte channel"));
        assert!(err.is_completed());
        assert!(err.wait().unwrap_err().cause().is_disposed());
    }

    #[test]
    fn panic_becomes_failure() {
        weft_logging::setup_log_no_panic_hook();
        let result = LazyResult::<u8>::create(|| panic!("exploded"));
        let err = result.wait().unwrap_err();
        assert!(err.to_string().contains("exploded"));
        // memoized like any other failure
        assert!(result.wait().unwrap_err().cause().ptr_eq(err.cause()));
    }

    const DEEP_CHAIN: u64 = 100_000;

    fn on_small_stack<R: Send + 'static>(f: impl FnOnce() -> R + Send + 'static) -> R {
        std::thread::Builder::new()
            .stack_size(512 * 1024)
            .spawn(f)
            .unwrap()
            .join()
            .unwrap()
    }

    fn deep_chain(stages: u64) -> LazyResult<u64> {
        let mut chain = LazyResult::create(|| Ok(0u64));
        for stage in 0..stages {
            chain = if stage % 1000 == 999 {
                // route some stages through the other result variants
                Deferred::from(chain)
                    .catch_error::<Error, _>(|_| Ok(u64::MAX))
                    .then(|v| Ok(v + 1))
            } else {
                chain.then(|v| Ok(v + 1))
            };
        }

        chain
    }

    #[test]
    fn deep_chain_forces_without_recursion() {
        let (value, copy_value) = on_small_stack(|| {
            let chain = deep_chain(DEEP_CHAIN);
            let copy = chain.clone();
            let value = chain.wait().unwrap();
            drop(chain);
            (value, copy.wait().unwrap())
        });

        assert_eq!(value, DEEP_CHAIN);
        assert_eq!(copy_value, DEEP_CHAIN);
    }

    #[test]
    fn deep_unforced_chain_drops_without_recursion() {
        let dropped = on_small_stack(|| {
            let forced = deep_chain(DEEP_CHAIN);
            let unforced = deep_chain(DEEP_CHAIN);
            assert_eq!(forced.wait().unwrap(), DEEP_CHAIN);
            assert!(!unforced.is_completed());
            drop(unforced);
            drop(forced);
            true
        });

        assert!(dropped);
    }

    #[test]
    fn deep_chain_over_sync_root() {
        let total = on_small_stack(|| {
            let root = SyncResult::success(1u64);
            let mut chain = root.then(|v| Ok(v * 2));
            for _ in 0..DEEP_CHAIN {
                chain = chain.then(|v| Ok(v + 1));
            }
            chain.wait().unwrap()
        });

        assert_eq!(total, DEEP_CHAIN + 2);
    }

    #[test]
    fn dropping_a_child_keeps_a_shared_parent() {
        let parent = LazyResult::create(|| Ok(5u32)).then(|v| Ok(v + 1));
        let child = parent.then(|v| Ok(v * 2));
        drop(child);
        assert_eq!(parent.wait().unwrap(), 6);
    }

    #[test]
    fn concurrent_forcing_runs_function_once() {
        const THREADS: usize = 8;
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let result = LazyResult::create(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(99u64)
        })
        .then(|v| Ok(v + 1));

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles = (0..THREADS)
            .map(|_| {
                let result = result.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    result.wait().unwrap()
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 100);
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
