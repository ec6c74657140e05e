//! De-interleaving raw segments into per-channel decimated samples
//!
//! Decimation is address-based: channel `i` with factor `d` keeps every
//! `d`-th super-sample by striding the interleaved words by `channels * d`
//! from offset `i`. No filtering is applied.

use serde::Serialize;

use crate::protocol::{complete_super_samples, decode_sample, SAMPLE_BYTES};
use crate::segment::decimation::DecimationPlan;
use crate::session::descriptor::Channel;

/// Extract one channel's decimated samples from interleaved bytes
///
/// Trailing bytes that do not form a complete super-sample are ignored.
pub fn deinterleave(bytes: &[u8], channels: usize, channel: usize, decimation: usize) -> Vec<i16> {
    let usable = complete_super_samples(bytes.len(), channels) * channels * SAMPLE_BYTES;
    bytes[..usable]
        .chunks_exact(SAMPLE_BYTES)
        .skip(channel)
        .step_by(channels * decimation)
        .map(decode_sample)
        .collect()
}

/// Time base of one channel segment
///
/// Tick values count undecimated sample periods from the start of the
/// session; seconds are derived from them and `dt`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentTiming {
    pub first_tick: u64,
    pub last_tick: u64,
    pub begin: f64,
    pub end: f64,
    pub deltat: f64,
}

impl SegmentTiming {
    /// Timing of `count` samples of a channel decimated by `decimation`
    /// in segment `segment` of `segment_length` undecimated samples
    pub fn new(segment: u64, segment_length: usize, decimation: u32, count: usize, dt: f64) -> Self {
        let decimation = decimation as u64;
        let slength = segment_length as u64 / decimation;
        let deltat = dt * decimation as f64;
        let last = count.saturating_sub(1) as u64;

        let begin = (segment * slength) as f64 * deltat;
        Self {
            first_tick: segment * segment_length as u64,
            last_tick: segment * segment_length as u64 + last * decimation,
            begin,
            end: begin + last as f64 * deltat,
            deltat,
        }
    }
}

/// One channel's decimated samples for one segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSegment {
    /// 0-based channel index
    pub channel: usize,
    pub segment: u64,
    pub begin: f64,
    pub end: f64,
    pub deltat: f64,
    pub samples: Vec<i16>,
}

impl ChannelSegment {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Splits raw segments into per-channel segments
#[derive(Debug, Clone)]
pub struct Demultiplexer {
    channels: Vec<Channel>,
    segment_length: usize,
    dt: f64,
}

impl Demultiplexer {
    pub fn new(channels: Vec<Channel>, plan: &DecimationPlan, dt: f64) -> Self {
        Self {
            channels,
            segment_length: plan.segment_length,
            dt,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Split one raw buffer, which may be short if the stream ended early
    ///
    /// Disabled channels, and channels left without any sample by a short
    /// buffer, produce nothing.
    pub fn split(&self, bytes: &[u8], segment: u64) -> Vec<ChannelSegment> {
        let total = self.channels.len();
        self.channels
            .iter()
            .filter(|c| c.enabled)
            .filter_map(|c| {
                let samples = deinterleave(bytes, total, c.index, c.decimation as usize);
                if samples.is_empty() {
                    return None;
                }
                let timing = SegmentTiming::new(
                    segment,
                    self.segment_length,
                    c.decimation,
                    samples.len(),
                    self.dt,
                );
                Some(ChannelSegment {
                    channel: c.index,
                    segment,
                    begin: timing.begin,
                    end: timing.end,
                    deltat: timing.deltat,
                    samples,
                })
            })
            .collect()
    }
}
