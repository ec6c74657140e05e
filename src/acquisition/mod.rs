//! Acquisition side of the pipeline: socket, buffers and ingest worker

pub mod buffer;
pub mod ingest;
pub mod transport;

pub use buffer::{BufferPool, DrainSide, FillSide, FullWait, RawBuffer};
pub use ingest::{IngestExit, IngestWorker};
pub use transport::{Connect, ReadOutcome, TcpConnector};
