use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub struct BlockingSpawnError {
    pub message: String,
}

impl Debug for BlockingSpawnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Blocking task failed: {}", self.message)
    }
}

impl Display for BlockingSpawnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl std::error::Error for BlockingSpawnError {}

/// Resolves once a closure handed to the blocking pool returns
pub struct BlockingSpawn<T> {
    handle: tokio::task::JoinHandle<T>,
}

impl<T> BlockingSpawn<T> {
    pub(crate) fn new(handle: tokio::task::JoinHandle<T>) -> Self {
        Self { handle }
    }
}

impl<T> Future for BlockingSpawn<T> {
    type Output = Result<T, BlockingSpawnError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().handle)
            .poll(cx)
            .map_err(|err| BlockingSpawnError {
                message: err.to_string(),
            })
    }
}
