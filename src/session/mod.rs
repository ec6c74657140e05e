//! Session description, shared state and lifecycle control

pub mod controller;
pub mod descriptor;
pub mod state;

pub use controller::StreamController;
pub use descriptor::{Channel, StreamDescriptor};
pub use state::{SessionOutcome, SessionReport, SessionState, SessionStats, TriggerTime};
