//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! State (state.rs):
//!     Unconfigured → Starting → Serving → Degraded → Stopped
//!
//! Shutdown (shutdown.rs):
//!     Signal received → primary and QUIC listeners stop → process exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Reload certificate pair
//! ```
//!
//! # Design Decisions
//! - Any startup error is fatal; the binary exits with the diagnostic
//! - The primary listener ending always ends the process

pub mod shutdown;
pub mod signals;
pub mod state;

pub use shutdown::Shutdown;
pub use state::{ServerState, StateHandle};
