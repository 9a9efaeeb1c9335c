use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// The failure kinds raised by the weft primitives themselves
#[derive(Clone, PartialEq, Eq)]
pub enum Error {
    /// The resource was disposed before or while the operation ran
    Disposed(&'static str),
    /// A timed acquisition did not succeed within the given duration
    Timeout(Duration),
    /// Programmer error, e.g. releasing a mutex the caller does not own. Never retried
    IllegalState(String),
}

impl Error {
    fn to_msg(&self) -> String {
        match self {
            Error::Disposed(resource) => format!("{resource} has been disposed"),
            Error::Timeout(duration) => format!("Timed out after {duration:?}"),
            Error::IllegalState(err) => format!("Illegal state: {err}"),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Error::IllegalState(err) => err,
            other => other.to_msg(),
        }
    }

    pub fn illegal_state<T: Into<String>>(msg: T) -> Self {
        Error::IllegalState(msg.into())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_msg())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl std::error::Error for Error {}

/// The error half of every outcome.
///
/// A `Failure` is a type-erased, cheaply cloneable handle to the original cause.
/// Memoized results hand the same failure to every waiter, so the cause lives
/// behind an [`Arc`]. The original kind can be recovered with [`Failure::is`] and
/// [`Failure::downcast_ref`].
#[derive(Clone)]
pub struct Failure {
    inner: Arc<anyhow::Error>,
}

impl Failure {
    /// Wraps any error type, preserving it for later kind matching
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(anyhow::Error::new(err)),
        }
    }

    /// A failure carrying only a message
    pub fn msg<M>(msg: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(anyhow::Error::msg(msg)),
        }
    }

    /// Returns true if the underlying cause is of type `E`
    pub fn is<E>(&self) -> bool
    where
        E: Display + Debug + Send + Sync + 'static,
    {
        self.inner.is::<E>()
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: Display + Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// The weft error kind, if this failure originated from a weft primitive
    pub fn kind(&self) -> Option<&Error> {
        self.downcast_ref::<Error>()
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.kind(), Some(Error::Disposed(_)))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind(), Some(Error::Timeout(_)))
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self.kind(), Some(Error::IllegalState(_)))
    }

    pub fn as_anyhow(&self) -> &anyhow::Error {
        &self.inner
    }

    /// Returns true if both handles share the same underlying cause
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Failure::new(err)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Self {
            inner: Arc::new(err),
        }
    }
}

impl Debug for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&*self.inner, f)
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&*self.inner, f)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// The "await failed" envelope returned when waiting on a failed result
#[derive(Clone)]
pub struct AwaitError {
    cause: Failure,
}

impl AwaitError {
    pub fn new(cause: Failure) -> Self {
        Self { cause }
    }

    pub fn cause(&self) -> &Failure {
        &self.cause
    }

    pub fn into_cause(self) -> Failure {
        self.cause
    }
}

impl Debug for AwaitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Await failed: {:?}", self.cause)
    }
}

impl Display for AwaitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Await failed: {}", self.cause)
    }
}

impl std::error::Error for AwaitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Returned by waiting for a result while expecting a particular error kind `E`.
///
/// A stored failure of kind `E` comes back unwrapped so the caller can match on
/// it; every other failure still arrives inside the [`AwaitError`] envelope.
#[derive(Clone)]
pub enum WaitError<E> {
    Expected(E),
    Await(AwaitError),
}

impl<E> WaitError<E> {
    pub fn expected(self) -> Option<E> {
        match self {
            WaitError::Expected(err) => Some(err),
            WaitError::Await(_) => None,
        }
    }
}

impl<E: Debug> Debug for WaitError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitError::Expected(err) => Debug::fmt(err, f),
            WaitError::Await(err) => Debug::fmt(err, f),
        }
    }
}

impl<E: Display> Display for WaitError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitError::Expected(err) => Display::fmt(err, f),
            WaitError::Await(err) => Display::fmt(err, f),
        }
    }
}

impl<E: Debug + Display> std::error::Error for WaitError<E> {}
