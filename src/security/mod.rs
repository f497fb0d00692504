//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Response leaving the handler (TLS configured):
//!     → headers.rs (add Strict-Transport-Security and alt-svc if absent)
//!     → Send to client
//! ```

pub mod headers;

pub use headers::SecurityHeaders;
