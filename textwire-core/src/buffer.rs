//! Fixed-capacity chunk accumulator for one relay direction.
//!
//! The buffer owns the unconsumed tail a decoder leaves behind when the
//! last codec unit in a chunk is incomplete: after a flush the consumed
//! prefix is advanced away and the tail stays at the front, so the next
//! read appends fresh bytes directly after it.

use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default chunk capacity per direction.
pub const CHUNK_CAPACITY: usize = 4096;

/// Result of one bounded read into the buffer's free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` fresh bytes were appended.
    Data(usize),
    /// No data arrived within the wait.
    Timeout,
    /// The source reported end-of-stream.
    Eof,
}

/// A bounded byte accumulator with tail carry-over.
#[derive(Debug)]
pub struct ChunkBuffer {
    capacity: usize,
    data: BytesMut,
}

impl ChunkBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            capacity,
            data: BytesMut::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    /// Current buffered bytes, carry first.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Drop everything except the trailing `tail` bytes, which become
    /// the carry for the next cycle.
    pub fn retain_tail(&mut self, tail: usize) {
        debug_assert!(tail <= self.data.len());
        let consumed = self.data.len() - tail;
        self.data.advance(consumed);
    }

    /// Discard the whole buffer (resynchronisation of last resort).
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Append bytes directly (test and replay paths).
    pub fn extend(&mut self, bytes: &[u8]) {
        debug_assert!(self.data.len() + bytes.len() <= self.capacity);
        self.data.extend_from_slice(bytes);
    }

    /// Read from `source` into the free space, waiting at most `wait`.
    ///
    /// Must not be called on a full buffer — a zero-byte read would be
    /// indistinguishable from end-of-stream.
    pub async fn fill_from<R>(
        &mut self,
        source: &mut R,
        wait: Duration,
    ) -> std::io::Result<ReadOutcome>
    where
        R: AsyncRead + Unpin,
    {
        let free = self.capacity - self.data.len();
        debug_assert!(free > 0);

        let mut dst = (&mut self.data).limit(free);
        match tokio::time::timeout(wait, source.read_buf(&mut dst)).await {
            Err(_) => Ok(ReadOutcome::Timeout),
            Ok(Ok(0)) => Ok(ReadOutcome::Eof),
            Ok(Ok(n)) => Ok(ReadOutcome::Data(n)),
            Ok(Err(e)) => Err(e),
        }
    }
}
