//! HTTP status and control API

pub mod handlers;
pub mod server;

pub use server::StatusServer;
