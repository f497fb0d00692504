//! Dual-transport HTTP front door library.

pub mod app;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::ServerConfig;
pub use http::{DualServer, ServerError};
pub use lifecycle::{ServerState, Shutdown};
