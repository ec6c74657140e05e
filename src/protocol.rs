//! Digitizer stream layout and shared status types
//!
//! The data port carries no framing: every segment is exactly
//! `segment_length * channels` little-endian `i16` samples, interleaved so
//! that sample `k` of channel `i` sits at byte offset `(k * channels + i) * 2`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::state::SessionStats;

/// Width of one sample on the wire
pub const SAMPLE_BYTES: usize = 2;

/// Bytes occupied by one segment of `samples_per_channel` samples on every channel
pub fn segment_bytes(samples_per_channel: usize, channels: usize) -> usize {
    samples_per_channel * channels * SAMPLE_BYTES
}

/// Number of complete super-samples (one sample of every channel) in `len` bytes
pub fn complete_super_samples(len: usize, channels: usize) -> usize {
    if channels == 0 {
        return 0;
    }
    len / (channels * SAMPLE_BYTES)
}

/// Decode one wire sample
#[inline]
pub fn decode_sample(bytes: &[u8]) -> i16 {
    i16::from_le_bytes([bytes[0], bytes[1]])
}

/// Encode one sample in wire order
#[inline]
pub fn encode_sample(value: i16) -> [u8; SAMPLE_BYTES] {
    value.to_le_bytes()
}

/// Lifecycle phase of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Connecting,
    Streaming,
    Draining,
    Stopped,
}

/// Session status snapshot served by the status API
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub running: bool,
    pub segments: u64,
    pub max_segments: u64,
    /// Raw first-byte arrival, seconds since the Unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_byte_time: Option<f64>,
    /// Corrected trigger instant, seconds since the Unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_str: Option<String>,
    pub stats: SessionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

/// Per-channel layout served by the status API
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    /// 1-based channel number as labelled on the digitizer
    pub number: usize,
    pub decimation: u32,
    pub enabled: bool,
    pub samples_per_segment: usize,
    pub deltat: f64,
}
