//! Immutable per-session stream description

use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;
use crate::protocol::{ChannelInfo, SAMPLE_BYTES};
use crate::segment::decimation::{self, DecimationPlan};

/// One digitizer input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// 0-based position in the interleaved stream
    pub index: usize,
    /// Keep one of every `decimation` samples
    pub decimation: u32,
    /// Disabled channels are never published
    pub enabled: bool,
}

impl Channel {
    pub fn new(index: usize, decimation: u32) -> Self {
        Self {
            index,
            decimation,
            enabled: true,
        }
    }

    /// 1-based number as labelled on the digitizer
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Everything a session needs, fixed at start
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    pub host: String,
    pub port: u16,
    pub channels: Vec<Channel>,
    /// Sample frequency in Hz
    pub frequency: f64,
    /// Nominal samples per channel per segment, before decimation rounding
    pub segment_length: usize,
    pub max_segments: u64,
    pub event_name: String,
    pub buffer_pool_size: usize,
    pub io_chunk_size: usize,
    pub read_timeout: Duration,
    pub connect_timeout: Option<Duration>,
    pub retry_backoff: Duration,
    pub queue_timeout: Duration,
    pub recv_buffer_size: Option<usize>,
}

impl StreamDescriptor {
    /// Descriptor with `channel_count` undecimated channels and default transport settings
    pub fn new(host: impl Into<String>, channel_count: usize, frequency: f64) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_DATA_PORT,
            channels: (0..channel_count).map(|i| Channel::new(i, 1)).collect(),
            frequency,
            segment_length: DEFAULT_SEGMENT_LENGTH,
            max_segments: DEFAULT_MAX_SEGMENTS,
            event_name: DEFAULT_EVENT_NAME.to_string(),
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE,
            io_chunk_size: DEFAULT_IO_CHUNK_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: None,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            recv_buffer_size: None,
        }
    }

    /// Number of interleaved channels in the stream
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Sample period in seconds
    pub fn dt(&self) -> f64 {
        1.0 / self.frequency
    }

    pub fn decimations(&self) -> Vec<u32> {
        self.channels.iter().map(|c| c.decimation).collect()
    }

    /// `host:port` of the data port
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check every field and plan the effective segment length
    pub fn plan(&self) -> Result<DecimationPlan, ConfigError> {
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(ConfigError::InvalidFrequency(self.frequency));
        }
        if self.max_segments == 0 {
            return Err(ConfigError::InvalidMaxSegments);
        }
        if self.io_chunk_size == 0 || self.io_chunk_size % SAMPLE_BYTES != 0 {
            return Err(ConfigError::InvalidIoChunk(self.io_chunk_size));
        }
        if self.buffer_pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        // The demultiplexer strides from `index`, so it must match the stream position
        if let Some((position, channel)) = self
            .channels
            .iter()
            .enumerate()
            .find(|(position, c)| c.index != *position)
        {
            return Err(ConfigError::ChannelOutOfPlace {
                position,
                index: channel.index,
            });
        }
        decimation::plan(&self.decimations(), self.segment_length)
    }

    /// Per-channel layout under `plan`
    pub fn channel_info(&self, plan: &DecimationPlan) -> Vec<ChannelInfo> {
        let dt = self.dt();
        self.channels
            .iter()
            .map(|c| ChannelInfo {
                number: c.number(),
                decimation: c.decimation,
                enabled: c.enabled,
                samples_per_segment: plan.samples_for(c.decimation),
                deltat: dt * c.decimation as f64,
            })
            .collect()
    }
}
