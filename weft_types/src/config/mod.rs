//! Explicitly constructed configuration for the weft primitives.
//!
//! Nothing here is global: every value is built by the caller and handed to the
//! primitive that needs it.

use serde::{Deserialize, Serialize};

/// The initial number of bytes a channel buffer reserves before growing
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// How often a spin mutex busy-waits before yielding its time slice
pub const DEFAULT_SPINS_BEFORE_YIELD: u32 = 64;

/// Toggles byte-level tracing for the component it is passed to
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TraceContext {
    pub enabled: bool,
}

impl TraceContext {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub struct ChannelConfig {
    pub initial_capacity: usize,
    pub trace: TraceContext,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CHANNEL_CAPACITY,
            trace: TraceContext::default(),
        }
    }
}

impl ChannelConfig {
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = trace;
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub struct SpinConfig {
    pub spins_before_yield: u32,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            spins_before_yield: DEFAULT_SPINS_BEFORE_YIELD,
        }
    }
}

impl SpinConfig {
    pub fn with_spins_before_yield(mut self, spins_before_yield: u32) -> Self {
        self.spins_before_yield = spins_before_yield;
        self
    }
}
