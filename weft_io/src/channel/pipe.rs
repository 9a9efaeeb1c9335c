//! An in-memory stream pair over one [`ByteChannel`].
//!
//! The halves speak `std::io`, so encoders and line readers can sit on either
//! end. Dropping the writer ends the stream; dropping the reader disposes the
//! channel, which makes any further write fail.

use crate::channel::ByteChannel;
use crate::locks::MutexBackend;
use crate::standard::locks::BlockingMutex;
use std::io::{Read, Write};
use std::sync::Arc;
use weft_types::config::ChannelConfig;
use weft_types::errors::{Error, Failure};

/// Creates a connected writer/reader pair backed by a blocking mutex
pub fn pipe() -> (ByteWriter, ByteReader) {
    pipe_with(ByteChannel::with_config(ChannelConfig::default()))
}

/// Creates a connected writer/reader pair over an existing channel
pub fn pipe_with<M: MutexBackend>(channel: ByteChannel<M>) -> (ByteWriter<M>, ByteReader<M>) {
    let channel = Arc::new(channel);
    (
        ByteWriter {
            channel: channel.clone(),
        },
        ByteReader { channel },
    )
}

pub struct ByteWriter<M: MutexBackend = BlockingMutex> {
    channel: Arc<ByteChannel<M>>,
}

pub struct ByteReader<M: MutexBackend = BlockingMutex> {
    channel: Arc<ByteChannel<M>>,
}

impl<M: MutexBackend> ByteWriter<M> {
    pub fn channel(&self) -> &ByteChannel<M> {
        &self.channel
    }
}

impl<M: MutexBackend> ByteReader<M> {
    pub fn channel(&self) -> &ByteChannel<M> {
        &self.channel
    }
}

fn to_io_error(failure: Failure) -> std::io::Error {
    let kind = match failure.kind() {
        Some(Error::Disposed(_)) => std::io::ErrorKind::BrokenPipe,
        Some(Error::Timeout(_)) => std::io::ErrorKind::TimedOut,
        Some(Error::IllegalState(_)) => std::io::ErrorKind::InvalidInput,
        None => std::io::ErrorKind::Other,
    };

    std::io::Error::new(kind, failure)
}

impl<M: MutexBackend> Write for ByteWriter<M> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.channel.write_all(buf).into_outcome().map_err(to_io_error)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<M: MutexBackend> Read for ByteReader<M> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.channel
            .read_available(buf)
            .into_outcome()
            .map(|read| read.unwrap_or(0))
            .map_err(to_io_error)
    }
}

impl<M: MutexBackend> Drop for ByteWriter<M> {
    fn drop(&mut self) {
        if let Err(err) = self.channel.end_of_stream().into_outcome() {
            log::warn!(target: "weft", "Unable to end the stream on writer drop: {err}");
        }
    }
}

impl<M: MutexBackend> Drop for ByteReader<M> {
    fn drop(&mut self) {
        if let Err(err) = self.channel.dispose().into_outcome() {
            log::warn!(target: "weft", "Unable to dispose the channel on reader drop: {err}");
        }
    }
}
