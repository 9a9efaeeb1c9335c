//! Shared types for the weft concurrency primitives: the error taxonomy, the
//! deferred [`result`] abstraction every fallible operation returns, and the
//! explicitly passed [`config`] structs.
#![forbid(unsafe_code)]

pub mod prelude {
    pub use crate::config::{ChannelConfig, SpinConfig, TraceContext};
    pub use crate::errors::{AwaitError, Error, Failure, WaitError};
    pub use crate::result::{Deferred, Eventual, LazyResult, Outcome, SyncResult};
}

pub mod config;
pub mod errors;
pub mod result;
