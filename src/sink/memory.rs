//! In-memory sink

use parking_lot::Mutex;

use crate::error::SinkError;
use crate::segment::demux::ChannelSegment;
use crate::session::state::TriggerTime;
use crate::sink::SegmentSink;

/// Keeps everything it is given; handy for tests and embedding
#[derive(Debug, Default)]
pub struct MemorySink {
    segments: Mutex<Vec<ChannelSegment>>,
    events: Mutex<Vec<String>>,
    trigger: Mutex<Option<TriggerTime>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> Vec<ChannelSegment> {
        self.segments.lock().clone()
    }

    /// Segments of one channel in publication order
    pub fn channel(&self, channel: usize) -> Vec<ChannelSegment> {
        self.segments
            .lock()
            .iter()
            .filter(|s| s.channel == channel)
            .cloned()
            .collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn trigger_time(&self) -> Option<TriggerTime> {
        *self.trigger.lock()
    }
}

impl SegmentSink for MemorySink {
    fn publish_channel_segment(&self, segment: &ChannelSegment) -> Result<(), SinkError> {
        self.segments.lock().push(segment.clone());
        Ok(())
    }

    fn emit_event(&self, name: &str) -> Result<(), SinkError> {
        self.events.lock().push(name.to_string());
        Ok(())
    }

    fn publish_trigger_time(&self, trigger: TriggerTime) -> Result<(), SinkError> {
        *self.trigger.lock() = Some(trigger);
        Ok(())
    }
}
