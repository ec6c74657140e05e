//! Network ingest worker
//!
//! Owns the data socket for the session. Each loop iteration fills one
//! segment buffer with bounded partial reads and hands it to the processor.

use std::io::Read;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::acquisition::buffer::{FillSide, RawBuffer};
use crate::acquisition::transport::{classify, Connect, ReadOutcome};
use crate::error::NetworkError;
use crate::session::state::{SessionState, StreamCounters, TriggerTime};

/// Why the ingest worker stopped
#[derive(Debug, Clone, PartialEq)]
pub enum IngestExit {
    /// The session asked it to stop
    Stopped,
    /// The transport failed; any partial buffer was already forwarded
    Failed(NetworkError),
}

enum Fill {
    Complete,
    Interrupted,
    Failed(NetworkError),
}

/// Reads raw segments from the digitizer into pool buffers
pub struct IngestWorker<C: Connect> {
    connector: C,
    pool: FillSide,
    state: Arc<SessionState>,
    io_chunk_size: usize,
    retry_backoff: Duration,
    awaiting_trigger: bool,
}

impl<C: Connect> IngestWorker<C> {
    pub fn new(
        connector: C,
        pool: FillSide,
        state: Arc<SessionState>,
        io_chunk_size: usize,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            connector,
            pool,
            state,
            io_chunk_size: io_chunk_size.max(1),
            retry_backoff,
            awaiting_trigger: true,
        }
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<IngestExit>> {
        thread::Builder::new()
            .name("acq-ingest".to_string())
            .spawn(move || self.run())
    }

    /// Connect, then stream segments until stopped or the transport fails
    pub fn run(mut self) -> IngestExit {
        let peer = self.connector.peer();
        tracing::info!("Arming: connecting to {}", peer);

        let mut stream = match self.connector.connect() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", peer, e);
                return IngestExit::Failed(e);
            }
        };

        tracing::info!("Armed, waiting for trigger on {}", peer);
        let exit = self.stream_segments(&mut stream);
        tracing::info!("Ingest from {} ended: {:?}", peer, exit);
        exit
    }

    fn stream_segments<R: Read>(&mut self, stream: &mut R) -> IngestExit {
        while self.state.ingest_should_run() {
            let mut buffer = self.pool.acquire_empty();
            self.record_fresh_allocations();

            match self.fill(stream, &mut buffer) {
                Fill::Complete => {
                    StreamCounters::add(&self.state.counters.buffers_filled, 1);
                    self.pool.release_full(buffer);
                }
                Fill::Interrupted => {
                    tracing::debug!(
                        "Stop requested, discarding {} buffered bytes",
                        buffer.filled()
                    );
                    break;
                }
                Fill::Failed(e) => {
                    if buffer.filled() > 0 {
                        tracing::warn!(
                            "Forwarding partial segment: {} of {} bytes",
                            buffer.filled(),
                            buffer.capacity()
                        );
                        StreamCounters::add(&self.state.counters.partial_buffers, 1);
                        self.pool.release_full(buffer);
                    }
                    tracing::error!("Data stream failed: {}", e);
                    return IngestExit::Failed(e);
                }
            }
        }
        IngestExit::Stopped
    }

    /// Read exactly one segment, retrying timed-out reads in place
    fn fill<R: Read>(&mut self, stream: &mut R, buffer: &mut RawBuffer) -> Fill {
        while !buffer.is_complete() {
            let want = self.io_chunk_size.min(buffer.remaining());

            match classify(stream.read(&mut buffer.unfilled_mut()[..want])) {
                ReadOutcome::Data(n) => {
                    if self.awaiting_trigger {
                        self.awaiting_trigger = false;
                        let now = TriggerTime::now();
                        if self.state.record_first_byte(now) {
                            tracing::info!("Trigger: first data at {:.6}", now.seconds());
                        }
                    }
                    buffer.advance(n);
                    StreamCounters::add(&self.state.counters.bytes_received, n as u64);
                }
                ReadOutcome::TimedOut => {
                    StreamCounters::add(&self.state.counters.read_timeouts, 1);
                    tracing::trace!(
                        "Read timed out with {} of {} bytes, retrying",
                        buffer.filled(),
                        buffer.capacity()
                    );
                    if !self.state.ingest_should_run() {
                        return Fill::Interrupted;
                    }
                    thread::sleep(self.retry_backoff);
                    continue;
                }
                ReadOutcome::Closed => {
                    return Fill::Failed(NetworkError::ClosedByPeer {
                        received: buffer.filled(),
                        expected: buffer.capacity(),
                    });
                }
                ReadOutcome::Failed(e) => {
                    return Fill::Failed(NetworkError::ConnectionLost {
                        received: buffer.filled(),
                        expected: buffer.capacity(),
                        reason: e.to_string(),
                    });
                }
            }

            if !buffer.is_complete() && !self.state.ingest_should_run() {
                return Fill::Interrupted;
            }
        }
        Fill::Complete
    }

    fn record_fresh_allocations(&self) {
        self.state
            .counters
            .fresh_buffers
            .store(self.pool.fresh_allocations(), std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::buffer::{BufferPool, DrainSide, FullWait};
    use crate::testing::{tagged_segment, ScriptedConnector, Step};
    use std::io::ErrorKind;

    const CHANNELS: usize = 2;
    const SAMPLES: usize = 8;
    const SEGMENT: usize = CHANNELS * SAMPLES * 2;

    fn worker(steps: Vec<Step>) -> (IngestWorker<ScriptedConnector>, DrainSide, Arc<SessionState>) {
        let (fill, drain) = BufferPool::new(2, SEGMENT).split();
        let state = Arc::new(SessionState::new(100));
        state.mark_running();
        let worker = IngestWorker::new(
            ScriptedConnector::new(steps),
            fill,
            state.clone(),
            6,
            Duration::from_millis(1),
        );
        (worker, drain, state)
    }

    fn drain_all(drain: &DrainSide) -> Vec<RawBuffer> {
        let mut buffers = Vec::new();
        while let FullWait::Ready(buffer) = drain.acquire_full(Duration::from_millis(10)) {
            buffers.push(buffer);
        }
        buffers
    }

    #[test]
    fn test_timeouts_preserve_partial_bytes() {
        let data = tagged_segment(CHANNELS, SAMPLES, 0);
        let steps = vec![
            Step::Data(data[..5].to_vec()),
            Step::Timeout,
            Step::Timeout,
            Step::Data(data[5..20].to_vec()),
            Step::Timeout,
            Step::Data(data[20..].to_vec()),
        ];
        let (worker, drain, state) = worker(steps);

        let exit = worker.run();
        assert_eq!(
            exit,
            IngestExit::Failed(NetworkError::ClosedByPeer {
                received: 0,
                expected: SEGMENT
            })
        );

        let buffers = drain_all(&drain);
        assert_eq!(buffers.len(), 1);
        assert!(buffers[0].is_complete());
        assert_eq!(buffers[0].bytes(), data.as_slice());

        let stats = state.stats();
        assert_eq!(stats.read_timeouts, 3);
        assert_eq!(stats.bytes_received, SEGMENT as u64);
        assert_eq!(stats.partial_buffers, 0);
    }

    #[test]
    fn test_reads_bounded_by_chunk_size() {
        let data = tagged_segment(CHANNELS, SAMPLES, 0);
        let (worker, drain, _state) = worker(vec![Step::Data(data.clone())]);
        worker.run();

        let buffers = drain_all(&drain);
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].bytes(), data.as_slice());
    }

    #[test]
    fn test_peer_close_forwards_partial_buffer() {
        let first = tagged_segment(CHANNELS, SAMPLES, 0);
        let second = tagged_segment(CHANNELS, SAMPLES, 1);
        let (worker, drain, state) = worker(vec![
            Step::Data(first.clone()),
            Step::Data(second[..10].to_vec()),
        ]);

        let exit = worker.run();
        assert_eq!(
            exit,
            IngestExit::Failed(NetworkError::ClosedByPeer {
                received: 10,
                expected: SEGMENT
            })
        );

        let buffers = drain_all(&drain);
        assert_eq!(buffers.len(), 2);
        assert!(buffers[0].is_complete());
        assert_eq!(buffers[1].bytes(), &second[..10]);
        assert_eq!(state.stats().partial_buffers, 1);
    }

    #[test]
    fn test_socket_error_is_terminal() {
        let data = tagged_segment(CHANNELS, SAMPLES, 0);
        let (worker, drain, _state) = worker(vec![
            Step::Data(data[..12].to_vec()),
            Step::Error(ErrorKind::ConnectionReset),
            Step::Data(data[12..].to_vec()),
        ]);

        match worker.run() {
            IngestExit::Failed(NetworkError::ConnectionLost { received, .. }) => {
                assert_eq!(received, 12)
            }
            other => panic!("unexpected exit {:?}", other),
        }
        let buffers = drain_all(&drain);
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].filled(), 12);
    }

    #[test]
    fn test_connect_failure() {
        let (fill, drain) = BufferPool::new(1, SEGMENT).split();
        let state = Arc::new(SessionState::new(1));
        state.mark_running();
        let worker = IngestWorker::new(
            ScriptedConnector::refused(),
            fill,
            state,
            4096,
            Duration::from_millis(1),
        );

        assert!(matches!(
            worker.run(),
            IngestExit::Failed(NetworkError::ConnectFailed { .. })
        ));
        assert!(matches!(
            drain.acquire_full(Duration::from_millis(10)),
            FullWait::Closed
        ));
    }

    #[test]
    fn test_trigger_captured_at_first_data_read() {
        let pause = Duration::from_millis(40);
        let (worker, _drain, state) = worker(vec![
            Step::Pause(pause),
            Step::Data(tagged_segment(CHANNELS, SAMPLES, 0)),
            Step::Pause(pause),
            Step::Data(tagged_segment(CHANNELS, SAMPLES, 1)),
        ]);
        let before = TriggerTime::now();
        worker.run();
        let after = TriggerTime::now();
        let paused = pause.as_secs_f64() - 1e-3;

        // Connecting is instant, so a capture at connect would precede the pause
        let first = state.first_byte_time().unwrap();
        assert!(first.seconds() - before.seconds() >= paused);
        // The second segment arrives one pause later and must not move it
        assert!(after.seconds() - first.seconds() >= paused);
        assert_eq!(state.stats().buffers_filled, 2);
        assert_eq!(state.stats().read_timeouts, 2);
    }

    #[test]
    fn test_stop_during_stall() {
        let (worker, drain, state) = worker(vec![
            Step::Data(vec![0u8; 4]),
            Step::Stall(Duration::from_millis(5)),
        ]);
        let handle = worker.spawn().unwrap();

        std::thread::sleep(Duration::from_millis(30));
        state.request_stop();
        assert_eq!(handle.join().unwrap(), IngestExit::Stopped);
        // The interrupted partial buffer is discarded, not published
        assert!(matches!(
            drain.acquire_full(Duration::from_millis(10)),
            FullWait::Closed
        ));
    }
}
