//! Segment planning, de-interleaving and publication

pub mod decimation;
pub mod demux;
pub mod processor;

pub use decimation::{plan, DecimationPlan};
pub use demux::{deinterleave, ChannelSegment, Demultiplexer, SegmentTiming};
pub use processor::SegmentProcessor;
