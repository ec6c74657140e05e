//! Recycled segment buffers handed between the ingest and processing workers
//!
//! Two queues carry buffer ownership: `empty` flows from the processor back
//! to the ingest side, `full` flows from ingest to the processor. A buffer is
//! only ever reachable from one side at a time.
//!
//! The ingest side never waits for a free buffer. When the empty queue is
//! exhausted a fresh one is allocated, trading unbounded memory under
//! sustained overload for a socket reader that never stalls.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// One segment worth of raw interleaved bytes
#[derive(Debug)]
pub struct RawBuffer {
    data: Vec<u8>,
    filled: usize,
}

impl RawBuffer {
    /// Zero-filled buffer of `len` bytes
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: vec![0u8; len],
            filled: 0,
        }
    }

    /// Completely filled buffer holding `bytes`
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let filled = bytes.len();
        Self {
            data: bytes,
            filled,
        }
    }

    /// Total size in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes received so far
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.data.len()
    }

    /// The received bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Space still to be filled
    pub fn unfilled_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.filled..]
    }

    /// Mark `n` more bytes as received
    pub fn advance(&mut self, n: usize) {
        self.filled = (self.filled + n).min(self.data.len());
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }
}

/// Pre-allocated buffers plus the two hand-off queues
pub struct BufferPool {
    buffer_len: usize,
    empty_tx: Sender<RawBuffer>,
    empty_rx: Receiver<RawBuffer>,
    full_tx: Sender<RawBuffer>,
    full_rx: Receiver<RawBuffer>,
}

impl BufferPool {
    /// Create a pool of `count` zeroed buffers of `buffer_len` bytes
    pub fn new(count: usize, buffer_len: usize) -> Self {
        let (empty_tx, empty_rx) = unbounded();
        let (full_tx, full_rx) = unbounded();

        for _ in 0..count {
            let _ = empty_tx.send(RawBuffer::zeroed(buffer_len));
        }

        Self {
            buffer_len,
            empty_tx,
            empty_rx,
            full_tx,
            full_rx,
        }
    }

    /// Size of every buffer in the pool
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Buffers currently waiting in the empty queue
    pub fn available(&self) -> usize {
        self.empty_rx.len()
    }

    /// Hand each worker its end of the queues
    ///
    /// Once the [`FillSide`] is dropped, [`DrainSide::acquire_full`] reports
    /// [`FullWait::Closed`] after the remaining full buffers are drained.
    pub fn split(self) -> (FillSide, DrainSide) {
        let fill = FillSide {
            buffer_len: self.buffer_len,
            empty_rx: self.empty_rx,
            full_tx: self.full_tx,
            fresh_allocations: 0,
        };
        let drain = DrainSide {
            empty_tx: self.empty_tx,
            full_rx: self.full_rx,
        };
        (fill, drain)
    }
}

/// Ingest end of the pool
pub struct FillSide {
    buffer_len: usize,
    empty_rx: Receiver<RawBuffer>,
    full_tx: Sender<RawBuffer>,
    fresh_allocations: u64,
}

impl FillSide {
    /// Take a free buffer, allocating a new one rather than waiting
    pub fn acquire_empty(&mut self) -> RawBuffer {
        match self.empty_rx.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                buffer
            }
            Err(_) => {
                self.fresh_allocations += 1;
                tracing::debug!(
                    "No free buffer, allocating {} bytes ({} fresh so far)",
                    self.buffer_len,
                    self.fresh_allocations
                );
                RawBuffer::zeroed(self.buffer_len)
            }
        }
    }

    /// Pass a filled (or final partial) buffer to the processor
    pub fn release_full(&self, buffer: RawBuffer) {
        // A closed queue means the processor is gone; the buffer goes with the session.
        let _ = self.full_tx.send(buffer);
    }

    /// Buffers allocated because the empty queue was exhausted
    pub fn fresh_allocations(&self) -> u64 {
        self.fresh_allocations
    }

    /// Recycled buffers waiting to be filled
    pub fn available(&self) -> usize {
        self.empty_rx.len()
    }
}

/// Result of waiting for a full buffer
#[derive(Debug)]
pub enum FullWait {
    Ready(RawBuffer),
    /// Nothing arrived within the timeout
    TimedOut,
    /// The ingest side is gone and nothing is left to drain
    Closed,
}

/// Processing end of the pool
pub struct DrainSide {
    empty_tx: Sender<RawBuffer>,
    full_rx: Receiver<RawBuffer>,
}

impl DrainSide {
    /// Wait up to `timeout` for the next full buffer
    pub fn acquire_full(&self, timeout: Duration) -> FullWait {
        match self.full_rx.recv_timeout(timeout) {
            Ok(buffer) => FullWait::Ready(buffer),
            Err(RecvTimeoutError::Timeout) => FullWait::TimedOut,
            Err(RecvTimeoutError::Disconnected) => FullWait::Closed,
        }
    }

    /// Return a processed buffer for reuse
    pub fn release_empty(&self, buffer: RawBuffer) {
        let _ = self.empty_tx.send(buffer);
    }

    /// Full buffers not yet processed
    pub fn pending(&self) -> usize {
        self.full_rx.len()
    }
}
