//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Primary (TCP):
//!     listener.rs (address parsing, bind)
//!     → tls.rs (rustls config resolving through the CertificateStore)
//!     → axum-server accept loop → HTTP layer
//!
//! Secondary (UDP):
//!     quic.rs (quinn endpoint, HTTP/3 via h3)
//!     → same instrumented router as the primary
//!
//! Reload:
//!     watcher.rs (file change) or SIGHUP → CertificateStore::load
//! ```
//!
//! # Design Decisions
//! - Both listeners share one address and one certificate store
//! - Certificate swaps are atomic; handshakes never block on reloads
//! - TLS is optional; without it only the plain TCP listener runs

pub mod listener;
pub mod quic;
pub mod tls;
pub mod watcher;

pub use quic::{QuicError, QuicListener};
pub use tls::{CertificateStore, TlsError};
pub use watcher::CertificateWatcher;
