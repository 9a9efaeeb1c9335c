//! A blocking, unbounded byte FIFO shared between producer and consumer threads.
//!
//! All state lives behind one [`MutexBackend`] and is only touched inside a
//! critical section. Readers park on the `data_available` condition until bytes
//! arrive, the stream ends, or the channel is disposed; every state change
//! signals all of them.
//!
//! End-of-stream is not a failure: once it has been marked and the buffer is
//! drained, reads succeed with `None`. Disposal is terminal: every later read or
//! write fails with [`Error::Disposed`], and blocked readers wake up to that
//! failure, which makes `dispose` the channel's cancellation signal.

use crate::locks::{MutexBackend, MutexCondition, PredicateCondition, Protected};
use crate::standard::locks::BlockingMutex;
use std::collections::VecDeque;
use std::sync::Arc;
use weft_types::config::{ChannelConfig, TraceContext};
use weft_types::errors::Error;
use weft_types::result::{Outcome, SyncResult};

pub mod pipe;

const CHANNEL_NAME: &str = "Byte channel";

struct ChannelState {
    buffer: VecDeque<u8>,
    disposed: bool,
    end_of_stream: bool,
}

impl ChannelState {
    fn is_readable(&self) -> bool {
        self.disposed || self.end_of_stream || !self.buffer.is_empty()
    }
}

/// An unbounded byte queue with blocking reads
pub struct ByteChannel<M: MutexBackend = BlockingMutex> {
    mutex: M,
    data_available: PredicateCondition<M>,
    state: Arc<Protected<ChannelState, M>>,
    trace: TraceContext,
}

impl ByteChannel<BlockingMutex> {
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    pub fn with_config(config: ChannelConfig) -> Self {
        Self::with_mutex(BlockingMutex::new(), config)
    }
}

impl Default for ByteChannel<BlockingMutex> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MutexBackend> ByteChannel<M> {
    /// Creates a channel guarded by `mutex`. The mutex may be shared with other
    /// state; the channel only holds it for the duration of each call
    pub fn with_mutex(mutex: M, config: ChannelConfig) -> Self {
        let state = Arc::new(Protected::new(
            mutex.clone(),
            ChannelState {
                buffer: VecDeque::with_capacity(config.initial_capacity),
                disposed: false,
                end_of_stream: false,
            },
        ));

        let readable = state.clone();
        // a failed check means the caller lost the mutex; stop waiting and let the
        // subsequent state access report it
        let data_available = mutex.create_condition_with(move || {
            readable.with(|state| state.is_readable()).unwrap_or(true)
        });

        Self {
            mutex,
            data_available,
            state,
            trace: config.trace,
        }
    }

    /// Dequeues a single byte, blocking while the channel is empty and live.
    /// Returns `None` once the stream has ended and every byte has been read
    pub fn read_byte(&self) -> SyncResult<Option<u8>> {
        self.mutex.try_critical_section(|| {
            self.data_available.wait().into_outcome()?;
            let byte = self.state.with(|state| {
                if state.disposed {
                    return Err(disposed());
                }

                Ok(state.buffer.pop_front())
            })??;

            if self.trace.enabled {
                log::trace!(target: "weft", "read_byte -> {byte:?}");
            }

            Ok(byte)
        })
    }

    /// Dequeues up to `length` bytes into `output[start..]`, blocking while the
    /// channel is empty and live. Returns the number of bytes read, or `None` once
    /// the stream has ended and every byte has been read
    pub fn read_bytes(&self, output: &mut [u8], start: usize, length: usize) -> SyncResult<Option<usize>> {
        if let Err(err) = check_range(output.len(), start, length) {
            return SyncResult::error(err);
        }

        self.mutex.try_critical_section(|| {
            if length == 0 {
                return self.state.with(|state| {
                    if state.disposed {
                        Err(disposed())
                    } else {
                        Ok(Some(0))
                    }
                })?;
            }

            self.data_available.wait().into_outcome()?;
            let read = self.state.with(|state| {
                if state.disposed {
                    return Err(disposed());
                }

                if state.buffer.is_empty() {
                    return Ok(None);
                }

                let count = length.min(state.buffer.len());
                for (slot, byte) in output[start..start + count]
                    .iter_mut()
                    .zip(state.buffer.drain(..count))
                {
                    *slot = byte;
                }

                Ok(Some(count))
            })??;

            if self.trace.enabled {
                log::trace!(target: "weft", "read_bytes({start}, {length}) -> {read:?}");
            }

            Ok(read)
        })
    }

    /// Dequeues whatever fits into `output`. Equivalent to `read_bytes(output, 0, output.len())`
    pub fn read_available(&self, output: &mut [u8]) -> SyncResult<Option<usize>> {
        let length = output.len();
        self.read_bytes(output, 0, length)
    }

    /// Appends `input[start..start + length]` as one unit and wakes all readers.
    /// The channel is unbounded, so the whole range is always written
    pub fn write_bytes(&self, input: &[u8], start: usize, length: usize) -> SyncResult<usize> {
        if let Err(err) = check_range(input.len(), start, length) {
            return SyncResult::error(err);
        }

        self.mutex.try_critical_section(|| {
            self.state.with(|state| {
                if state.disposed {
                    return Err(disposed());
                }

                if state.end_of_stream {
                    return Err(Error::illegal_state("write after end of stream").into());
                }

                state.buffer.extend(&input[start..start + length]);
                Ok(())
            })??;

            if self.trace.enabled {
                log::trace!(target: "weft", "write_bytes wrote {length} bytes");
            }

            self.data_available.signal_all();
            Ok(length)
        })
    }

    pub fn write_all(&self, input: &[u8]) -> SyncResult<usize> {
        self.write_bytes(input, 0, input.len())
    }

    /// Marks that no more bytes will be written. Buffered bytes stay readable.
    /// Idempotent
    pub fn end_of_stream(&self) -> SyncResult<()> {
        self.mutex.try_critical_section(|| {
            let transitioned = self.state.with(|state| !std::mem::replace(&mut state.end_of_stream, true))?;
            if transitioned {
                log::debug!(target: "weft", "Byte channel reached end of stream");
            }

            self.data_available.signal_all();
            Ok(())
        })
    }

    /// Disposes the channel, failing every pending and future read or write.
    /// Returns `true` only for the call that performed the transition
    pub fn dispose(&self) -> SyncResult<bool> {
        self.mutex.try_critical_section(|| {
            let transitioned = self.state.with(|state| {
                if state.disposed {
                    return false;
                }

                state.disposed = true;
                state.buffer = VecDeque::new();
                true
            })?;

            if transitioned {
                log::debug!(target: "weft", "Byte channel disposed");
            }

            self.data_available.signal_all();
            Ok(transitioned)
        })
    }

    /// The number of buffered bytes
    pub fn available(&self) -> SyncResult<usize> {
        self.inspect(|state| state.buffer.len())
    }

    pub fn is_disposed(&self) -> SyncResult<bool> {
        self.inspect(|state| state.disposed)
    }

    pub fn is_end_of_stream(&self) -> SyncResult<bool> {
        self.inspect(|state| state.end_of_stream)
    }

    pub fn mutex(&self) -> &M {
        &self.mutex
    }

    fn inspect<R>(&self, f: impl FnOnce(&ChannelState) -> R) -> SyncResult<R> {
        self.mutex
            .try_critical_section(|| self.state.with(|state| f(state)))
    }
}

fn disposed() -> weft_types::errors::Failure {
    Error::Disposed(CHANNEL_NAME).into()
}

fn check_range(len: usize, start: usize, length: usize) -> Outcome<()> {
    match start.checked_add(length) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::illegal_state(format!(
            "range {start}..{start}+{length} is out of bounds for a slice of length {len}"
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::result::Eventual;

    #[test]
    fn range_is_validated() {
        let channel = ByteChannel::new();
        let err = channel.write_bytes(&[1, 2, 3], 2, 2).wait().unwrap_err();
        assert!(err.cause().is_illegal_state());

        let mut output = [0u8; 2];
        assert!(channel
            .read_bytes(&mut output, usize::MAX, 1)
            .wait()
            .unwrap_err()
            .cause()
            .is_illegal_state());
    }

    #[test]
    fn zero_length_read_does_not_block() {
        let channel = ByteChannel::new();
        let mut output = [0u8; 4];
        assert_eq!(channel.read_bytes(&mut output, 0, 0).wait().unwrap(), Some(0));
    }

    #[test]
    fn write_after_end_of_stream_fails() {
        let channel = ByteChannel::new();
        channel.write_all(&[1]).wait().unwrap();
        channel.end_of_stream().wait().unwrap();
        channel.end_of_stream().wait().unwrap();

        let err = channel.write_all(&[2]).wait().unwrap_err();
        assert!(err.cause().is_illegal_state());
        assert_eq!(channel.read_byte().wait().unwrap(), Some(1));
        assert_eq!(channel.read_byte().wait().unwrap(), None);
    }

    #[test]
    fn dispose_is_idempotent_and_terminal() {
        let channel = ByteChannel::new();
        channel.write_all(&[1, 2]).wait().unwrap();

        assert!(channel.dispose().wait().unwrap());
        assert!(!channel.dispose().wait().unwrap());
        assert!(channel.is_disposed().wait().unwrap());

        assert!(channel.read_byte().wait().unwrap_err().cause().is_disposed());
        assert!(channel.write_all(&[3]).wait().unwrap_err().cause().is_disposed());

        let mut output = [0u8; 1];
        assert!(channel
            .read_bytes(&mut output, 0, 0)
            .wait()
            .unwrap_err()
            .cause()
            .is_disposed());
    }

    #[test]
    fn queries_reflect_state() {
        let channel = ByteChannel::with_config(ChannelConfig::default().with_initial_capacity(2));
        assert_eq!(channel.available().wait().unwrap(), 0);
        channel.write_bytes(&[9, 8, 7, 6], 1, 3).wait().unwrap();
        assert_eq!(channel.available().wait().unwrap(), 3);
        assert!(!channel.is_end_of_stream().wait().unwrap());

        let mut output = [0u8; 5];
        assert_eq!(channel.read_bytes(&mut output, 2, 3).wait().unwrap(), Some(3));
        assert_eq!(output, [0, 0, 8, 7, 6]);
    }
}
