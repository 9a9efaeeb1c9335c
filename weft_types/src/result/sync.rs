use crate::errors::Failure;
use crate::result::{Eventual, Outcome};

/// A result whose outcome was computed when it was constructed
#[derive(Clone, Debug)]
pub struct SyncResult<T> {
    outcome: Outcome<T>,
}

impl<T> SyncResult<T> {
    pub fn success(value: T) -> Self {
        Self { outcome: Ok(value) }
    }

    pub fn error<E: Into<Failure>>(err: E) -> Self {
        Self {
            outcome: Err(err.into()),
        }
    }

    /// Runs `f` immediately and stores its outcome
    pub fn create<F>(f: F) -> Self
    where
        F: FnOnce() -> Outcome<T>,
    {
        Self { outcome: f() }
    }

    pub fn from_outcome(outcome: Outcome<T>) -> Self {
        Self { outcome }
    }

    pub fn into_outcome(self) -> Outcome<T> {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }
}

impl<T: Clone + Send + Sync + 'static> Eventual<T> for SyncResult<T> {
    fn is_completed(&self) -> bool {
        true
    }

    fn outcome(&self) -> Outcome<T> {
        self.outcome.clone()
    }
}

impl<T> From<SyncResult<T>> for Outcome<T> {
    fn from(result: SyncResult<T>) -> Self {
        result.outcome
    }
}

impl<T> From<Outcome<T>> for SyncResult<T> {
    fn from(outcome: Outcome<T>) -> Self {
        Self { outcome }
    }
}
