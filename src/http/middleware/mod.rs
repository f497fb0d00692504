//! HTTP middleware.
//!
//! - instrument.rs: access log, metrics and TLS headers around the handler
//! - log_writer.rs: pooled per-request log context

pub mod instrument;
pub mod log_writer;

pub use instrument::{AdvertisedHeaders, Instrumentation, RequestScope};
pub use log_writer::{LogPool, LogWriter};
