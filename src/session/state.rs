//! Shared session state
//!
//! The only mutable state shared between the ingest and processing
//! workers. Buffers never live here; they move through the pool queues.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, NetworkError, Result, SessionError};
use crate::protocol::{SessionPhase, SAMPLE_BYTES};

/// Wall-clock instant in seconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct TriggerTime(pub f64);

impl TriggerTime {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self(secs)
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }

    /// Remove the read-ahead latency of one bounded partial read
    ///
    /// The first byte only shows up once a full I/O chunk has been buffered
    /// by the transport, i.e. `io_chunk_size / 2` samples after the trigger.
    pub fn corrected(self, io_chunk_size: usize, dt: f64) -> Self {
        Self(self.0 - (io_chunk_size / SAMPLE_BYTES) as f64 * dt)
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = self.0.floor();
        let nanos = ((self.0 - secs) * 1e9) as u32;
        DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
    }

    /// ctime-style rendering, e.g. `Thu Mar  7 14:02:11 2024`
    pub fn to_ctime(&self) -> Option<String> {
        self.as_datetime()
            .map(|t| t.format("%a %b %e %H:%M:%S %Y").to_string())
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The segment counter reached its maximum
    Completed,
    /// A stop was requested
    Stopped,
    /// The transport failed; the last segment may be short
    Aborted(NetworkError),
    /// A worker died unexpectedly
    Faulted(String),
}

impl SessionOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, SessionOutcome::Aborted(_) | SessionOutcome::Faulted(_))
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionOutcome::Completed => write!(f, "completed"),
            SessionOutcome::Stopped => write!(f, "stopped"),
            SessionOutcome::Aborted(e) => write!(f, "aborted: {}", e),
            SessionOutcome::Faulted(reason) => write!(f, "faulted: {}", reason),
        }
    }
}

/// Lock-free counters updated on the hot path
#[derive(Debug, Default)]
pub struct StreamCounters {
    pub bytes_received: AtomicU64,
    pub buffers_filled: AtomicU64,
    pub partial_buffers: AtomicU64,
    pub read_timeouts: AtomicU64,
    pub fresh_buffers: AtomicU64,
    pub segments_published: AtomicU64,
    pub channel_segments: AtomicU64,
    pub sink_errors: AtomicU64,
}

impl StreamCounters {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            buffers_filled: self.buffers_filled.load(Ordering::Relaxed),
            partial_buffers: self.partial_buffers.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            fresh_buffers: self.fresh_buffers.load(Ordering::Relaxed),
            segments_published: self.segments_published.load(Ordering::Relaxed),
            channel_segments: self.channel_segments.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

/// Session statistics snapshot
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub bytes_received: u64,
    pub buffers_filled: u64,
    pub partial_buffers: u64,
    pub read_timeouts: u64,
    pub fresh_buffers: u64,
    pub segments_published: u64,
    pub channel_segments: u64,
    pub sink_errors: u64,
}

/// Final account of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    pub segments: u64,
    /// Corrected trigger instant, if any data arrived
    pub trigger_time: Option<TriggerTime>,
    pub stats: SessionStats,
}

impl SessionReport {
    /// Turn a degraded session into an error
    pub fn into_result(self) -> Result<Self> {
        match &self.outcome {
            SessionOutcome::Aborted(e) => Err(Error::Network(e.clone())),
            SessionOutcome::Faulted(_) => {
                Err(SessionError::WorkerPanicked("streaming").into())
            }
            _ => Ok(self),
        }
    }
}

/// State shared by the controller and both workers of one session
#[derive(Debug)]
pub struct SessionState {
    id: Uuid,
    running: AtomicBool,
    ingest_stop: AtomicBool,
    segments: AtomicU64,
    max_segments: u64,
    first_byte: OnceLock<TriggerTime>,
    trigger: OnceLock<TriggerTime>,
    phase: Mutex<SessionPhase>,
    report: OnceLock<SessionReport>,
    sealed: Mutex<()>,
    sealed_cv: Condvar,
    pub counters: StreamCounters,
}

impl SessionState {
    pub fn new(max_segments: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            running: AtomicBool::new(false),
            ingest_stop: AtomicBool::new(false),
            segments: AtomicU64::new(0),
            max_segments,
            first_byte: OnceLock::new(),
            trigger: OnceLock::new(),
            phase: Mutex::new(SessionPhase::Idle),
            report: OnceLock::new(),
            sealed: Mutex::new(()),
            sealed_cv: Condvar::new(),
            counters: StreamCounters::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_running(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Clear the running flag; idempotent
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the ingest worker should keep reading
    pub fn ingest_should_run(&self) -> bool {
        self.is_running() && !self.ingest_stop.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_ingest(&self) {
        self.ingest_stop.store(true, Ordering::SeqCst);
    }

    pub fn segments(&self) -> u64 {
        self.segments.load(Ordering::SeqCst)
    }

    pub fn max_segments(&self) -> u64 {
        self.max_segments
    }

    pub(crate) fn set_segments(&self, segments: u64) {
        self.segments.store(segments, Ordering::SeqCst);
    }

    /// Record the first byte of the session; later calls are ignored
    pub(crate) fn record_first_byte(&self, at: TriggerTime) -> bool {
        self.first_byte.set(at).is_ok()
    }

    /// Raw arrival time of the first byte
    pub fn first_byte_time(&self) -> Option<TriggerTime> {
        self.first_byte.get().copied()
    }

    pub(crate) fn set_trigger_time(&self, trigger: TriggerTime) {
        let _ = self.trigger.set(trigger);
    }

    /// Corrected trigger instant, available once the session has drained
    pub fn trigger_time(&self) -> Option<TriggerTime> {
        self.trigger.get().copied()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock() = phase;
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Seal the session with its outcome and clear the running flag
    pub(crate) fn finish(&self, outcome: SessionOutcome) -> SessionReport {
        self.request_stop();
        self.set_phase(SessionPhase::Stopped);
        let report = SessionReport {
            session_id: self.id,
            outcome,
            segments: self.segments(),
            trigger_time: self.trigger_time(),
            stats: self.stats(),
        };
        let _ = self.report.set(report.clone());

        let _sealed = self.sealed.lock();
        self.sealed_cv.notify_all();
        self.report.get().cloned().unwrap_or(report)
    }

    /// Final report, once the session has ended
    pub fn report(&self) -> Option<SessionReport> {
        self.report.get().cloned()
    }

    /// Block until the session is sealed; any number of callers may wait
    pub fn wait_report(&self) -> SessionReport {
        let mut sealed = self.sealed.lock();
        loop {
            if let Some(report) = self.report.get() {
                return report.clone();
            }
            self.sealed_cv.wait(&mut sealed);
        }
    }
}
