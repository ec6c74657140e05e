//! Session lifecycle
//!
//! Starts the ingest and processing workers for one session at a time,
//! forwards stop requests, and collects the final report.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::acquisition::buffer::BufferPool;
use crate::acquisition::ingest::IngestWorker;
use crate::acquisition::transport::{Connect, TcpConnector};
use crate::error::{Result, SessionError};
use crate::protocol::{ChannelInfo, SessionPhase, SessionStatus};
use crate::segment::decimation::DecimationPlan;
use crate::segment::processor::SegmentProcessor;
use crate::session::descriptor::StreamDescriptor;
use crate::session::state::{SessionOutcome, SessionReport, SessionState};
use crate::sink::SegmentSink;

struct ActiveSession {
    descriptor: Arc<StreamDescriptor>,
    plan: DecimationPlan,
    state: Arc<SessionState>,
    processor: Option<JoinHandle<SessionReport>>,
}

/// Join the processor if this caller holds its handle, then wait for the report
///
/// Only one caller gets the handle; everyone else blocks on the sealed report.
fn collect(handle: Option<JoinHandle<SessionReport>>, state: &SessionState) -> Result<SessionReport> {
    if let Some(handle) = handle {
        if handle.join().is_err() {
            state.finish(SessionOutcome::Faulted(
                "segment processor panicked".to_string(),
            ));
            return Err(SessionError::WorkerPanicked("segment processor").into());
        }
    }
    Ok(state.wait_report())
}

/// Owns the streaming session and its shared state
pub struct StreamController {
    sink: Arc<dyn SegmentSink>,
    current: Mutex<Option<ActiveSession>>,
    /// Serializes `start_with`; `current` is never held across a join
    starting: Mutex<()>,
}

impl StreamController {
    pub fn new(sink: Arc<dyn SegmentSink>) -> Self {
        Self {
            sink,
            current: Mutex::new(None),
            starting: Mutex::new(()),
        }
    }

    /// Start streaming from the digitizer named in `descriptor`
    pub fn start(&self, descriptor: StreamDescriptor) -> Result<Arc<SessionState>> {
        let connector = TcpConnector::from_descriptor(&descriptor);
        self.start_with(descriptor, connector)
    }

    /// Start streaming from an arbitrary transport
    ///
    /// Returns as soon as both workers are running.
    pub fn start_with<C: Connect>(
        &self,
        descriptor: StreamDescriptor,
        connector: C,
    ) -> Result<Arc<SessionState>> {
        let _starting = self.starting.lock();

        let (plan, previous) = {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|s| s.state.is_running()) {
                return Err(SessionError::AlreadyRunning.into());
            }
            let plan = descriptor.plan()?;
            let previous = current
                .as_mut()
                .map(|s| (s.processor.take(), s.state.clone()));
            (plan, previous)
        };

        if plan.segment_length != plan.nominal_length {
            tracing::info!(
                "Segment length rounded from {} to {} (decimation quantum {})",
                plan.nominal_length,
                plan.segment_length,
                plan.quantum
            );
        }

        // The previous session stays visible to status() while it winds down
        if let Some((handle, state)) = previous {
            let _ = collect(handle, &state);
        }

        let descriptor = Arc::new(descriptor);
        let state = Arc::new(SessionState::new(descriptor.max_segments));
        state.mark_running();
        state.set_phase(SessionPhase::Connecting);

        let segment_bytes = plan.segment_bytes(descriptor.channel_count());
        let (fill, drain) = BufferPool::new(descriptor.buffer_pool_size, segment_bytes).split();

        let ingest = IngestWorker::new(
            connector,
            fill,
            state.clone(),
            descriptor.io_chunk_size,
            descriptor.retry_backoff,
        )
        .spawn()
        .map_err(|e| {
            state.request_stop();
            SessionError::Spawn {
                worker: "ingest",
                reason: e.to_string(),
            }
        })?;

        let processor = SegmentProcessor::new(
            descriptor.clone(),
            &plan,
            drain,
            state.clone(),
            self.sink.clone(),
            Some(ingest),
        )
        .spawn()
        .map_err(|e| {
            state.request_stop();
            SessionError::Spawn {
                worker: "segment processor",
                reason: e.to_string(),
            }
        })?;

        tracing::info!(
            "Session {} started: {} channels, {} samples/segment ({} bytes), max {} segments",
            state.id(),
            descriptor.channel_count(),
            plan.segment_length,
            segment_bytes,
            descriptor.max_segments
        );

        *self.current.lock() = Some(ActiveSession {
            descriptor,
            plan,
            state: state.clone(),
            processor: Some(processor),
        });
        Ok(state)
    }

    /// Ask the running session to stop; idempotent
    pub fn request_stop(&self) {
        if let Some(session) = self.current.lock().as_ref() {
            if session.state.is_running() {
                tracing::info!("Stop requested for session {}", session.state.id());
            }
            session.state.request_stop();
        }
    }

    /// Block until the current session has ended and return its report
    ///
    /// Safe to call from several threads; every caller gets the same report.
    pub fn wait(&self) -> Result<SessionReport> {
        let (handle, state) = {
            let mut current = self.current.lock();
            let session = current.as_mut().ok_or(SessionError::NotStarted)?;
            (session.processor.take(), session.state.clone())
        };
        collect(handle, &state)
    }

    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|s| s.state.is_running())
    }

    /// State of the current or most recent session
    pub fn session(&self) -> Option<Arc<SessionState>> {
        self.current.lock().as_ref().map(|s| s.state.clone())
    }

    /// Status snapshot of the current or most recent session
    pub fn status(&self) -> Option<SessionStatus> {
        let current = self.current.lock();
        let session = current.as_ref()?;
        let state = &session.state;

        let trigger = state.trigger_time();
        Some(SessionStatus {
            session_id: state.id(),
            phase: state.phase(),
            running: state.is_running(),
            segments: state.segments(),
            max_segments: state.max_segments(),
            first_byte_time: state.first_byte_time().map(|t| t.seconds()),
            trigger_time: trigger.map(|t| t.seconds()),
            trigger_str: trigger.and_then(|t| t.to_ctime()),
            stats: state.stats(),
            outcome: state.report().map(|r| r.outcome.to_string()),
        })
    }

    /// Channel layout of the current or most recent session
    pub fn channels(&self) -> Option<Vec<ChannelInfo>> {
        let current = self.current.lock();
        current
            .as_ref()
            .map(|s| s.descriptor.channel_info(&s.plan))
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if let Some(session) = self.current.get_mut().take() {
            session.state.request_stop();
            let _ = collect(session.processor, &session.state);
        }
    }
}
