//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP (TLS or plain) connection ─┐
//!                                ├─→ TraceLayer
//! QUIC connection (HTTP/3) ──────┘     → middleware::instrument
//!                                          (log writer, security headers)
//!                                      → application handler
//!                                      → access log line + metrics observation
//! ```

pub mod middleware;
pub mod server;

pub use server::{DualServer, ServerContext, ServerError};
