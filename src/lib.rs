//! # ACQ Stream
//!
//! Real-time segment streaming from networked multi-channel digitizers.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                      DIGITIZER (data port 4210)                        │
//! │      N channels × int16, interleaved, no framing, until disarmed       │
//! └───────────────────────────────────┬───────────────────────────────────┘
//!                                     │ TCP
//!                                     ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │              Ingest Worker (acquisition::ingest) - thread             │
//! │   acquire_empty ─► bounded partial reads ─► first byte = trigger      │
//! └───────────┬───────────────────────────────────────────▲───────────────┘
//!             │ full queue                                │ empty queue
//!             ▼                                           │
//! ┌───────────────────────────────────────────────────────┴───────────────┐
//! │           Segment Processor (segment::processor) - thread             │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐                  │
//! │  │  Channel 0  │   │  Channel 1  │   │  Channel N  │  stride N×d_i    │
//! │  │   d = 1     │   │   d = 3     │   │  disabled   │  from offset i   │
//! │  └──────┬──────┘   └──────┬──────┘   └─────────────┘                  │
//! └─────────┼─────────────────┼───────────────────────────────────────────┘
//!           ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │        SegmentSink (sink) - begin / end / deltat / samples            │
//! │        + completion event per segment + corrected trigger time        │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`session::StreamController`] owns one session at a time: it plans the
//! segment length, starts both workers and collects the final report.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod protocol;
pub mod segment;
pub mod session;
pub mod sink;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Streaming data port of the digitizer
    pub const DEFAULT_DATA_PORT: u16 = 4210;

    /// Input channels per digitizer site
    pub const CHANNELS_PER_SITE: usize = 32;

    /// Default sample frequency in Hz
    pub const DEFAULT_FREQUENCY: f64 = 16000.0;

    /// Default nominal samples per channel per segment
    pub const DEFAULT_SEGMENT_LENGTH: usize = 8000;

    /// Default maximum number of segments per session
    pub const DEFAULT_MAX_SEGMENTS: u64 = 1000;

    /// Default event raised after every segment
    pub const DEFAULT_EVENT_NAME: &str = "STREAM";

    /// Buffers pre-allocated per session
    pub const DEFAULT_BUFFER_POOL_SIZE: usize = 20;

    /// Upper bound of a single socket read
    pub const DEFAULT_IO_CHUNK_SIZE: usize = 4096;

    /// Socket read deadline
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(6);

    /// Pause before retrying a timed-out read
    pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

    /// Wait on the full queue between stop-flag checks
    pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Default HTTP port for the status API
    pub const DEFAULT_STATUS_PORT: u16 = 8080;
}
