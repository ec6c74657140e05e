//! Data-port transport
//!
//! Reads are classified into explicit outcomes so the ingest loop can choose
//! between retrying in place and ending the session without inspecting
//! error types itself.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::NetworkError;
use crate::session::descriptor::StreamDescriptor;

/// Outcome of one bounded partial read
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n > 0` bytes were received
    Data(usize),
    /// The read deadline passed with nothing received
    TimedOut,
    /// The peer closed the stream
    Closed,
    /// Any other socket failure
    Failed(io::Error),
}

/// Classify the result of a single `read` call
pub fn classify(result: io::Result<usize>) -> ReadOutcome {
    match result {
        Ok(0) => ReadOutcome::Closed,
        Ok(n) => ReadOutcome::Data(n),
        Err(e) => match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
                ReadOutcome::TimedOut
            }
            _ => ReadOutcome::Failed(e),
        },
    }
}

/// Opens the data stream for one session
pub trait Connect: Send + 'static {
    type Stream: Read + Send + 'static;

    /// Human-readable peer name for logs
    fn peer(&self) -> String;

    /// Open the stream; called once per session
    fn connect(&mut self) -> Result<Self::Stream, NetworkError>;
}

/// TCP connection to the digitizer's streaming port
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    read_timeout: Duration,
    connect_timeout: Option<Duration>,
    recv_buffer_size: Option<usize>,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, read_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            read_timeout,
            connect_timeout: None,
            recv_buffer_size: None,
        }
    }

    pub fn from_descriptor(descriptor: &StreamDescriptor) -> Self {
        Self {
            host: descriptor.host.clone(),
            port: descriptor.port,
            read_timeout: descriptor.read_timeout,
            connect_timeout: descriptor.connect_timeout,
            recv_buffer_size: descriptor.recv_buffer_size,
        }
    }

    fn open(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        if let Some(size) = self.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        socket.set_keepalive(true)?;

        let addr = SockAddr::from(addr);
        match self.connect_timeout {
            Some(timeout) => socket.connect_timeout(&addr, timeout)?,
            None => socket.connect(&addr)?,
        }
        socket.set_read_timeout(Some(self.read_timeout))?;

        Ok(socket.into())
    }
}

impl Connect for TcpConnector {
    type Stream = TcpStream;

    fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect(&mut self) -> Result<TcpStream, NetworkError> {
        let failed = |reason: String| NetworkError::ConnectFailed {
            addr: self.peer(),
            reason,
        };

        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| failed(e.to_string()))?;

        let mut last_error = None;
        for addr in addrs {
            match self.open(addr) {
                Ok(stream) => {
                    tracing::debug!("Connected to {} ({})", self.peer(), addr);
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(failed(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string()),
        ))
    }
}
