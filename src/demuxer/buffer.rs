use bytes::{Buf, BytesMut};
use parking_lot::Mutex;

use crate::error::{DemuxError, Result};
use crate::format::ReadOutcome;

/// Counters of everything that went through the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Total bytes appended.
    pub appended: u64,
    /// Bytes handed to the container.
    pub consumed: u64,
    /// Bytes dropped by flushes.
    pub discarded: u64,
    /// Bytes currently buffered.
    pub len: usize,
    /// Flush count.
    pub generation: u64,
}

#[derive(Debug, Default)]
struct BufferState {
    data: BytesMut,
    appended: u64,
    consumed: u64,
    discarded: u64,
    end_of_stream: bool,
    generation: u64,
    closed: bool,
}

/// Container bytes handed over by the caller and not yet parsed.
///
/// The caller appends and flushes, the worker consumes from the front. The
/// lock is held only for one copy in or out. Invariant:
/// `appended - consumed - discarded == len`.
#[derive(Debug, Default)]
pub struct SharedInputBuffer {
    inner: Mutex<BufferState>,
}

impl SharedInputBuffer {
    /// Empty buffer at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` to the back. Fails with `Closed` after [`Self::close`].
    pub fn append(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(DemuxError::Closed);
        }
        state.data.extend_from_slice(bytes);
        state.appended += bytes.len() as u64;
        Ok(())
    }

    /// No more bytes will follow in this generation.
    pub fn mark_end_of_stream(&self) -> Result<()> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(DemuxError::Closed);
        }
        state.end_of_stream = true;
        Ok(())
    }

    /// Copies up to `buf.len()` bytes out for a reader bound to `generation`.
    /// Stale or closed readers always see `NeedMoreData`.
    pub fn read(&self, generation: u64, buf: &mut [u8]) -> ReadOutcome {
        let mut state = self.inner.lock();
        if state.closed || state.generation != generation {
            return ReadOutcome::NeedMoreData;
        }
        if state.data.is_empty() || buf.is_empty() {
            return if state.end_of_stream && state.data.is_empty() {
                ReadOutcome::EndOfStream
            } else {
                ReadOutcome::NeedMoreData
            };
        }

        let n = buf.len().min(state.data.len());
        buf[..n].copy_from_slice(&state.data[..n]);
        state.data.advance(n);
        state.consumed += n as u64;
        ReadOutcome::Data(n)
    }

    /// Drops all buffered bytes, clears end-of-stream and starts a new
    /// generation, which is returned.
    pub fn flush(&self) -> u64 {
        let mut state = self.inner.lock();
        let dropped = state.data.len();
        state.discarded += dropped as u64;
        state.data.clear();
        state.end_of_stream = false;
        state.generation += 1;
        log::debug!(
            "input buffer flushed: {} bytes dropped, generation {}",
            dropped,
            state.generation
        );
        state.generation
    }

    /// Releases the bytes; every later append fails and every read stalls.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        state.data = BytesMut::new();
    }

    /// Bumped by every flush.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    /// True once end of stream has been marked and not flushed away.
    pub fn is_end_of_stream(&self) -> bool {
        self.inner.lock().end_of_stream
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> BufferStats {
        let state = self.inner.lock();
        BufferStats {
            appended: state.appended,
            consumed: state.consumed,
            discarded: state.discarded,
            len: state.data.len(),
            generation: state.generation,
        }
    }
}
