//! Swappable mutex backends, condition variables and a blocking byte channel.
//!
//! The [`locks`] module defines the backend-agnostic [`locks::MutexBackend`] and
//! [`locks::MutexCondition`] capabilities. [`standard`] provides the parking
//! backend plus helpers for driving blocking work from tokio, [`spin`] the
//! busy-waiting backend, and [`channel`] the byte FIFO built on top of either.
#![forbid(unsafe_code)]

pub mod channel;
pub mod locks;
pub mod shared;
pub mod spin;
pub mod standard;

pub mod prelude {
    pub use crate::channel::pipe::{pipe, pipe_with, ByteReader, ByteWriter};
    pub use crate::channel::ByteChannel;
    pub use crate::locks::{MutexBackend, MutexCondition, OwnerId, PredicateCondition, Protected};
    pub use crate::spin::locks::{SpinCondition, SpinMutex};
    pub use crate::standard::locks::{BlockingCondition, BlockingMutex};
    pub use crate::standard::spawn::{force_blocking, spawn_blocking};
    pub use weft_types::prelude::*;
}

pub use channel::pipe::pipe;
pub use channel::ByteChannel;
pub use spin::locks::SpinMutex;
pub use standard::locks::BlockingMutex;
pub use standard::spawn::{force_blocking, spawn_blocking};

#[cfg(feature = "deadlock-detection")]
pub use parking_lot::deadlock;

pub use tokio;
