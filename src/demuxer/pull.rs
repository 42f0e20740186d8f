use std::sync::Arc;

use super::buffer::SharedInputBuffer;
use crate::format::{ByteSource, ReadOutcome};

/// Read callback handed to the container: drains the shared input buffer
/// on behalf of one generation.
///
/// Never blocks. Once a flush has bumped the buffer generation this adapter
/// only ever reports `NeedMoreData`, so a container built before the flush
/// cannot see bytes meant for its successor.
pub struct PullAdapter {
    buffer: Arc<SharedInputBuffer>,
    generation: u64,
}

impl PullAdapter {
    /// Adapter reading `buffer` for as long as it stays at `generation`.
    pub fn new(buffer: Arc<SharedInputBuffer>, generation: u64) -> Self {
        Self { buffer, generation }
    }

    /// Generation this adapter was created for.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl ByteSource for PullAdapter {
    fn read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        let outcome = self.buffer.read(self.generation, buf);
        if let ReadOutcome::Data(n) = outcome {
            log::trace!("pulled {} bytes (generation {})", n, self.generation);
        }
        outcome
    }
}
