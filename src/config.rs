//! Configuration file handling
//!
//! Settings are read from a TOML file once at startup and turned into an
//! immutable [`StreamDescriptor`]. Every field has a default, so an empty
//! file (or no file at all) describes a one-site digitizer on localhost.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;
use crate::session::descriptor::{Channel, StreamDescriptor};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub acquisition: AcquisitionConfig,
    pub transport: TransportConfig,
    /// Per-channel overrides of the acquisition defaults
    pub channels: Vec<ChannelConfig>,
    pub sink: SinkConfig,
    pub status: StatusConfig,
}

/// Digitizer address and layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    /// Populated digitizer sites, 32 channels each
    pub sites: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_DATA_PORT,
            sites: 1,
        }
    }
}

/// Sampling and segmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Sample frequency in Hz
    pub frequency: f64,
    /// Nominal samples per channel per segment
    pub segment_length: usize,
    pub max_segments: u64,
    pub event_name: String,
    /// Decimation applied to channels without an override
    pub default_decimation: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            segment_length: DEFAULT_SEGMENT_LENGTH,
            max_segments: DEFAULT_MAX_SEGMENTS,
            event_name: DEFAULT_EVENT_NAME.to_string(),
            default_decimation: 1,
        }
    }
}

/// Override for one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// 1-based channel number
    pub number: usize,
    #[serde(default)]
    pub decimation: Option<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Socket and buffering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub read_timeout_ms: u64,
    pub connect_timeout_ms: Option<u64>,
    pub retry_backoff_ms: u64,
    pub queue_timeout_ms: u64,
    pub io_chunk_size: usize,
    pub buffer_pool_size: usize,
    pub recv_buffer_size: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: None,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF.as_millis() as u64,
            queue_timeout_ms: DEFAULT_QUEUE_TIMEOUT.as_millis() as u64,
            io_chunk_size: DEFAULT_IO_CHUNK_SIZE,
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE,
            recv_buffer_size: None,
        }
    }
}

/// Segment archive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// JSON-lines file receiving segments
    pub output: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("segments.jsonl"),
        }
    }
}

/// HTTP status API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_STATUS_PORT,
        }
    }
}

impl AppConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Load `path`, else the per-user config file if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "acq-stream", "acq-stream")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Read(e.to_string()))?;
        }
        std::fs::write(path, text).map_err(|e| ConfigError::Read(e.to_string()))
    }

    /// Total channel count of the digitizer
    pub fn channel_count(&self) -> usize {
        self.device.sites * CHANNELS_PER_SITE
    }

    /// Build and validate the session descriptor
    pub fn descriptor(&self) -> Result<StreamDescriptor, ConfigError> {
        let count = self.channel_count();
        let mut channels: Vec<Channel> = (0..count)
            .map(|i| Channel::new(i, self.acquisition.default_decimation))
            .collect();

        for channel in &self.channels {
            if channel.number == 0 || channel.number > count {
                return Err(ConfigError::UnknownChannel {
                    number: channel.number,
                    channels: count,
                });
            }
            let target = &mut channels[channel.number - 1];
            if let Some(decimation) = channel.decimation {
                target.decimation = decimation;
            }
            if let Some(enabled) = channel.enabled {
                target.enabled = enabled;
            }
        }

        let transport = &self.transport;
        let descriptor = StreamDescriptor {
            host: self.device.host.clone(),
            port: self.device.port,
            channels,
            frequency: self.acquisition.frequency,
            segment_length: self.acquisition.segment_length,
            max_segments: self.acquisition.max_segments,
            event_name: self.acquisition.event_name.clone(),
            buffer_pool_size: transport.buffer_pool_size,
            io_chunk_size: transport.io_chunk_size,
            read_timeout: Duration::from_millis(transport.read_timeout_ms),
            connect_timeout: transport.connect_timeout_ms.map(Duration::from_millis),
            retry_backoff: Duration::from_millis(transport.retry_backoff_ms),
            queue_timeout: Duration::from_millis(transport.queue_timeout_ms),
            recv_buffer_size: transport.recv_buffer_size,
        };
        descriptor.plan()?;
        Ok(descriptor)
    }
}
