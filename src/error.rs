//! Error types for the acquisition streaming pipeline

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid session configuration, fatal at session start
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No channels configured")]
    NoChannels,

    #[error("Channel {channel} has invalid decimation factor {factor}")]
    InvalidDecimation { channel: usize, factor: u32 },

    #[error("Decimation quantum overflows for factors {0:?}")]
    QuantumOverflow(Vec<u32>),

    #[error("Invalid sample frequency: {0}")]
    InvalidFrequency(f64),

    #[error("Segment length must be positive")]
    InvalidSegmentLength,

    #[error("Max segments must be positive")]
    InvalidMaxSegments,

    #[error("I/O chunk size must be a positive multiple of the sample width, got {0}")]
    InvalidIoChunk(usize),

    #[error("Buffer pool size must be positive")]
    InvalidPoolSize,

    #[error("Channel override {number} is outside 1..={channels}")]
    UnknownChannel { number: usize, channels: usize },

    #[error("Channel at position {position} has stream index {index}")]
    ChannelOutOfPlace { position: usize, index: usize },

    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Transport errors on the ingest side
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("Connection lost after {received} of {expected} segment bytes: {reason}")]
    ConnectionLost {
        received: usize,
        expected: usize,
        reason: String,
    },

    #[error("Peer closed the stream after {received} of {expected} segment bytes")]
    ClosedByPeer { received: usize, expected: usize },

    #[error("Timeout")]
    Timeout,
}

impl NetworkError {
    /// Whether the error is retried in place rather than ending the session
    pub fn is_transient(&self) -> bool {
        matches!(self, NetworkError::Timeout)
    }
}

/// Session lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A streaming session is already running")]
    AlreadyRunning,

    #[error("No session has been started")]
    NotStarted,

    #[error("Failed to spawn {worker} worker: {reason}")]
    Spawn { worker: &'static str, reason: String },

    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),
}

/// Errors raised by a segment sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink write failed: {0}")]
    Write(String),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_only_transient_error() {
        assert!(NetworkError::Timeout.is_transient());
        assert!(!NetworkError::ClosedByPeer { received: 10, expected: 20 }.is_transient());
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = SessionError::AlreadyRunning.into();
        assert!(matches!(err, Error::Session(SessionError::AlreadyRunning)));
        assert_eq!(
            err.to_string(),
            "Session error: A streaming session is already running"
        );
    }
}
