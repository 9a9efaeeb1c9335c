use crate::shared::spawn::BlockingSpawn;
use weft_types::result::{Eventual, Outcome};
pub use tokio::task::spawn;

/// Runs `f` on the tokio blocking pool. Must be called from within a tokio runtime
pub fn spawn_blocking<F, R>(f: F) -> BlockingSpawn<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    BlockingSpawn::new(tokio::task::spawn_blocking(f))
}

/// Forces `result` on the blocking pool, so a chain that blocks on a mutex or a
/// channel read does not stall the async executor
pub fn force_blocking<T, R>(result: R) -> BlockingSpawn<Outcome<T>>
where
    T: Clone + Send + Sync + 'static,
    R: Eventual<T>,
{
    spawn_blocking(move || result.outcome())
}
