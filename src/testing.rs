//! Scripted transports and synthetic data for tests

use std::collections::VecDeque;
use std::io::{self, Read};
use std::time::Duration;

use crate::acquisition::transport::Connect;
use crate::error::NetworkError;
use crate::protocol::encode_sample;

/// Sample value identifying `(channel, sample)` in a synthetic stream
pub fn tagged_value(channel: usize, sample: usize) -> i16 {
    ((channel * 1000 + sample) % 32_000) as i16
}

/// Interleaved segment where every sample encodes its channel and position
///
/// Sample positions continue across segments so a stream of several
/// segments reads as one ramp per channel.
pub fn tagged_segment(channels: usize, samples: usize, segment: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(channels * samples * 2);
    for k in 0..samples {
        for c in 0..channels {
            bytes.extend_from_slice(&encode_sample(tagged_value(c, segment * samples + k)));
        }
    }
    bytes
}

/// One step of a scripted stream
#[derive(Debug)]
pub enum Step {
    Data(Vec<u8>),
    Timeout,
    Error(io::ErrorKind),
    /// Sleep for `Duration`, then time out once
    Pause(Duration),
    /// Time out forever, sleeping `Duration` per read like a socket deadline
    Stall(Duration),
}

/// `Read` implementation that replays a script, then reports end of stream
#[derive(Debug, Default)]
pub struct ScriptedStream {
    steps: VecDeque<Step>,
}

impl ScriptedStream {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
        }
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            None => Ok(0),
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.steps.push_front(Step::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(Step::Timeout) => Err(io::ErrorKind::WouldBlock.into()),
            Some(Step::Error(kind)) => Err(kind.into()),
            Some(Step::Pause(delay)) => {
                std::thread::sleep(delay);
                Err(io::ErrorKind::WouldBlock.into())
            }
            Some(Step::Stall(delay)) => {
                std::thread::sleep(delay);
                self.steps.push_front(Step::Stall(delay));
                Err(io::ErrorKind::WouldBlock.into())
            }
        }
    }
}

/// Connector handing out a prepared [`ScriptedStream`]
pub struct ScriptedConnector {
    pub stream: Option<ScriptedStream>,
}

impl ScriptedConnector {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            stream: Some(ScriptedStream::new(steps)),
        }
    }

    /// Connector whose connect attempt fails
    pub fn refused() -> Self {
        Self { stream: None }
    }
}

impl Connect for ScriptedConnector {
    type Stream = ScriptedStream;

    fn peer(&self) -> String {
        "scripted".to_string()
    }

    fn connect(&mut self) -> Result<ScriptedStream, NetworkError> {
        self.stream.take().ok_or_else(|| NetworkError::ConnectFailed {
            addr: "scripted".to_string(),
            reason: "connection refused".to_string(),
        })
    }
}
