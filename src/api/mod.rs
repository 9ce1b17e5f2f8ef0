//! HTTP API: REST endpoints and real-time transcript streaming.

pub mod events;
pub mod server;
pub mod types;
