//! Segment processing worker
//!
//! Pulls full buffers, publishes every enabled channel's decimated segment,
//! and returns the buffer to the pool. When the session ends it publishes
//! the corrected trigger time, stops the ingest worker and seals the report.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::acquisition::buffer::{DrainSide, FullWait, RawBuffer};
use crate::acquisition::ingest::IngestExit;
use crate::protocol::{complete_super_samples, SessionPhase};
use crate::segment::decimation::DecimationPlan;
use crate::segment::demux::Demultiplexer;
use crate::session::descriptor::StreamDescriptor;
use crate::session::state::{SessionOutcome, SessionReport, SessionState, StreamCounters};
use crate::sink::SegmentSink;

/// Why the streaming loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    MaxSegments,
    StopRequested,
    IngestGone,
}

/// Consumes full buffers and publishes channel segments
pub struct SegmentProcessor {
    descriptor: Arc<StreamDescriptor>,
    demux: Demultiplexer,
    pool: DrainSide,
    state: Arc<SessionState>,
    sink: Arc<dyn SegmentSink>,
    ingest: Option<JoinHandle<IngestExit>>,
}

impl SegmentProcessor {
    pub fn new(
        descriptor: Arc<StreamDescriptor>,
        plan: &DecimationPlan,
        pool: DrainSide,
        state: Arc<SessionState>,
        sink: Arc<dyn SegmentSink>,
        ingest: Option<JoinHandle<IngestExit>>,
    ) -> Self {
        let demux = Demultiplexer::new(descriptor.channels.clone(), plan, descriptor.dt());
        Self {
            descriptor,
            demux,
            pool,
            state,
            sink,
            ingest,
        }
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<SessionReport>> {
        thread::Builder::new()
            .name("acq-segments".to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) -> SessionReport {
        self.state.set_phase(SessionPhase::Streaming);
        let exit = self.stream();

        self.state.set_phase(SessionPhase::Draining);
        self.publish_trigger_time();

        self.state.stop_ingest();
        let ingest = match self.ingest.take() {
            Some(handle) => match handle.join() {
                Ok(exit) => Some(exit),
                Err(_) => None,
            },
            None => Some(IngestExit::Stopped),
        };

        let outcome = match (exit, ingest) {
            (LoopExit::MaxSegments, _) => SessionOutcome::Completed,
            (_, None) => SessionOutcome::Faulted("ingest worker panicked".to_string()),
            (_, Some(IngestExit::Failed(e))) => SessionOutcome::Aborted(e),
            (_, Some(IngestExit::Stopped)) => SessionOutcome::Stopped,
        };

        let report = self.state.finish(outcome);
        if report.outcome.is_degraded() {
            tracing::error!(
                "Session {} {} after {} segments",
                report.session_id,
                report.outcome,
                report.segments
            );
        } else {
            tracing::info!(
                "Session {} {} after {} segments",
                report.session_id,
                report.outcome,
                report.segments
            );
        }
        report
    }

    fn stream(&mut self) -> LoopExit {
        let max_segments = self.descriptor.max_segments;
        let mut segment = self.state.segments();

        loop {
            if !self.state.is_running() {
                return LoopExit::StopRequested;
            }
            if segment >= max_segments {
                return LoopExit::MaxSegments;
            }

            match self.pool.acquire_full(self.descriptor.queue_timeout) {
                FullWait::Ready(buffer) => {
                    let channels = self.descriptor.channel_count();
                    if complete_super_samples(buffer.filled(), channels) == 0 {
                        tracing::warn!(
                            "Dropping {} trailing bytes, less than one sample per channel",
                            buffer.filled()
                        );
                        self.pool.release_empty(buffer);
                        continue;
                    }

                    self.publish(&buffer, segment);
                    segment += 1;
                    self.state.set_segments(segment);
                    StreamCounters::add(&self.state.counters.segments_published, 1);

                    if let Err(e) = self.sink.emit_event(&self.descriptor.event_name) {
                        tracing::warn!("Failed to emit {}: {}", self.descriptor.event_name, e);
                        StreamCounters::add(&self.state.counters.sink_errors, 1);
                    }
                    self.pool.release_empty(buffer);
                }
                FullWait::TimedOut => continue,
                FullWait::Closed => return LoopExit::IngestGone,
            }
        }
    }

    fn publish(&self, buffer: &RawBuffer, segment: u64) {
        if !buffer.is_complete() {
            tracing::warn!(
                "Segment {} is short: {} of {} bytes",
                segment,
                buffer.filled(),
                buffer.capacity()
            );
        }

        for channel_segment in self.demux.split(buffer.bytes(), segment) {
            match self.sink.publish_channel_segment(&channel_segment) {
                Ok(()) => StreamCounters::add(&self.state.counters.channel_segments, 1),
                Err(e) => {
                    tracing::warn!(
                        "Failed to store segment {} of channel {}: {}",
                        segment,
                        channel_segment.channel + 1,
                        e
                    );
                    StreamCounters::add(&self.state.counters.sink_errors, 1);
                }
            }
        }
        tracing::trace!("Published segment {}", segment);
    }

    fn publish_trigger_time(&self) {
        let Some(first_byte) = self.state.first_byte_time() else {
            tracing::warn!("No data received, trigger time not recorded");
            return;
        };

        let trigger = first_byte.corrected(self.descriptor.io_chunk_size, self.descriptor.dt());
        self.state.set_trigger_time(trigger);
        tracing::info!(
            "Trigger time {:.6} ({})",
            trigger.seconds(),
            trigger.to_ctime().unwrap_or_default()
        );
        if let Err(e) = self.sink.publish_trigger_time(trigger) {
            tracing::warn!("Failed to store trigger time: {}", e);
            StreamCounters::add(&self.state.counters.sink_errors, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::buffer::{BufferPool, FillSide};
    use crate::error::{NetworkError, SinkError};
    use crate::segment::demux::ChannelSegment;
    use crate::session::state::TriggerTime;
    use crate::sink::MemorySink;
    use crate::testing::tagged_segment;
    use std::time::{Duration, Instant};

    fn descriptor(max_segments: u64) -> StreamDescriptor {
        let mut descriptor = StreamDescriptor::new("localhost", 2, 1024.0);
        descriptor.segment_length = 6;
        descriptor.channels[1].decimation = 3;
        descriptor.max_segments = max_segments;
        descriptor.queue_timeout = Duration::from_millis(20);
        descriptor
    }

    fn processor(
        descriptor: StreamDescriptor,
        sink: Arc<dyn SegmentSink>,
        ingest: Option<JoinHandle<IngestExit>>,
    ) -> (SegmentProcessor, FillSide, Arc<SessionState>) {
        let plan = descriptor.plan().unwrap();
        let (fill, drain) = BufferPool::new(4, plan.segment_bytes(2)).split();
        let state = Arc::new(SessionState::new(descriptor.max_segments));
        state.mark_running();
        let processor = SegmentProcessor::new(
            Arc::new(descriptor),
            &plan,
            drain,
            state.clone(),
            sink,
            ingest,
        );
        (processor, fill, state)
    }

    #[test]
    fn test_publishes_until_max_segments() {
        let sink = Arc::new(MemorySink::new());
        let (processor, fill, state) = processor(descriptor(2), sink.clone(), None);
        for s in 0..3 {
            fill.release_full(RawBuffer::from_bytes(tagged_segment(2, 6, s)));
        }
        state.record_first_byte(TriggerTime(100.0));

        let report = processor.run();
        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.segments, 2);
        assert_eq!(sink.segments().len(), 4);
        assert_eq!(sink.events(), vec!["STREAM", "STREAM"]);

        let ch1 = sink.channel(1);
        assert_eq!(ch1[1].begin, ch1[0].end + ch1[0].deltat);
        assert_eq!(
            sink.trigger_time(),
            Some(TriggerTime(100.0 - 2048.0 / 1024.0))
        );
        assert_eq!(report.trigger_time, sink.trigger_time());
        assert!(!state.is_running());
    }

    #[test]
    fn test_stop_observed_within_queue_timeout() {
        let sink = Arc::new(MemorySink::new());
        let (processor, _fill, state) = processor(descriptor(100), sink.clone(), None);
        let handle = processor.spawn().unwrap();

        std::thread::sleep(Duration::from_millis(30));
        let stopped_at = Instant::now();
        state.request_stop();
        let report = handle.join().unwrap();

        assert!(stopped_at.elapsed() < Duration::from_millis(500));
        assert_eq!(report.outcome, SessionOutcome::Stopped);
        assert!(sink.segments().is_empty());
        assert_eq!(report.trigger_time, None);
    }

    #[test]
    fn test_drains_partial_buffer_after_ingest_failure() {
        let sink = Arc::new(MemorySink::new());
        let failure = NetworkError::ClosedByPeer {
            received: 10,
            expected: 24,
        };
        let exit = IngestExit::Failed(failure.clone());

        let (processor, fill, _state) = processor(descriptor(100), sink.clone(), None);
        let full = tagged_segment(2, 6, 0);
        let short = tagged_segment(2, 6, 1);
        fill.release_full(RawBuffer::from_bytes(full));
        fill.release_full(RawBuffer::from_bytes(short[..10].to_vec()));
        let ingest = std::thread::spawn(move || {
            drop(fill);
            exit
        });

        let processor = SegmentProcessor {
            ingest: Some(ingest),
            ..processor
        };
        let report = processor.run();

        assert_eq!(report.outcome, SessionOutcome::Aborted(failure));
        assert_eq!(report.segments, 2);
        // 10 bytes hold two complete super-samples: channel 0 gets both,
        // channel 1 (decimation 3) gets the first
        let last: Vec<ChannelSegment> = sink
            .segments()
            .into_iter()
            .filter(|s| s.segment == 1)
            .collect();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].samples.len(), 2);
        assert_eq!(last[1].samples.len(), 1);
    }

    struct FailingSink;

    impl SegmentSink for FailingSink {
        fn publish_channel_segment(&self, _: &ChannelSegment) -> Result<(), SinkError> {
            Err(SinkError::Write("archive offline".to_string()))
        }

        fn emit_event(&self, _: &str) -> Result<(), SinkError> {
            Ok(())
        }

        fn publish_trigger_time(&self, _: TriggerTime) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failures_counted_not_fatal() {
        let (processor, fill, _state) = processor(descriptor(1), Arc::new(FailingSink), None);
        fill.release_full(RawBuffer::from_bytes(tagged_segment(2, 6, 0)));

        let report = processor.run();
        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.stats.sink_errors, 2);
        assert_eq!(report.stats.channel_segments, 0);
    }

    fn full_buffer(fill: &mut FillSide) -> RawBuffer {
        let mut buffer = fill.acquire_empty();
        let len = buffer.remaining();
        buffer.advance(len);
        buffer
    }

    #[test]
    fn test_runt_buffer_is_not_a_segment() {
        let sink = Arc::new(MemorySink::new());
        let failure = NetworkError::ClosedByPeer {
            received: 3,
            expected: 24,
        };
        let exit = IngestExit::Failed(failure.clone());

        let (processor, fill, _state) = processor(descriptor(100), sink.clone(), None);
        fill.release_full(RawBuffer::from_bytes(tagged_segment(2, 6, 0)));
        // Three bytes do not hold one sample of both channels
        fill.release_full(RawBuffer::from_bytes(vec![1, 2, 3]));
        let ingest = std::thread::spawn(move || {
            drop(fill);
            exit
        });

        let processor = SegmentProcessor {
            ingest: Some(ingest),
            ..processor
        };
        let report = processor.run();

        assert_eq!(report.outcome, SessionOutcome::Aborted(failure));
        assert_eq!(report.segments, 1);
        assert_eq!(report.stats.segments_published, 1);
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.segments().len(), 2);
    }

    #[test]
    fn test_processed_buffers_return_to_pool() {
        let sink = Arc::new(MemorySink::new());
        let (processor, mut fill, _state) = processor(descriptor(3), sink, None);
        for _ in 0..3 {
            let buffer = full_buffer(&mut fill);
            fill.release_full(buffer);
        }
        assert_eq!(fill.available(), 1);

        let report = processor.run();
        assert_eq!(report.segments, 3);
        assert_eq!(fill.available(), 4);
        assert_eq!(fill.fresh_allocations(), 0);
    }

    #[test]
    fn test_stop_leaves_every_buffer_accounted_for() {
        let sink = Arc::new(MemorySink::new());
        let (processor, mut fill, state) = processor(descriptor(100), sink, None);
        for _ in 0..2 {
            let buffer = full_buffer(&mut fill);
            fill.release_full(buffer);
        }
        // Held by the ingest side mid-fill; it is dropped with the session
        let in_flight = fill.acquire_empty();

        let handle = processor.spawn().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while state.segments() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        state.request_stop();
        let report = handle.join().unwrap();

        assert_eq!(report.outcome, SessionOutcome::Stopped);
        assert_eq!(report.segments, 2);
        assert_eq!(fill.available() + 1, 4);
        assert_eq!(fill.fresh_allocations(), 0);
        drop(in_flight);
    }
}
