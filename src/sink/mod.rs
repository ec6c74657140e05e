//! Destinations for finished segments
//!
//! The archive that stores segments is outside this crate; it only has to
//! implement [`SegmentSink`]. Calls are made from the processing worker and
//! are never retried.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;

use crate::error::SinkError;
use crate::segment::demux::ChannelSegment;
use crate::session::state::TriggerTime;

/// Append-only time series store for published segments
pub trait SegmentSink: Send + Sync {
    /// Store one channel's segment
    fn publish_channel_segment(&self, segment: &ChannelSegment) -> Result<(), SinkError>;

    /// Notify watchers that a new segment is available
    fn emit_event(&self, name: &str) -> Result<(), SinkError>;

    /// Store the corrected trigger instant, once per session
    fn publish_trigger_time(&self, trigger: TriggerTime) -> Result<(), SinkError>;
}
