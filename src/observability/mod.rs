//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request (via the instrumentation middleware):
//!     → access_log.rs (one line per request, file or stdout)
//!     → metrics.rs (request counter, duration summary)
//!
//! Everything else:
//!     → logging.rs (structured tracing events)
//!
//! Consumers:
//!     → Access log file / stdout
//!     → Metrics endpoint (Prometheus scrape of /metrics)
//! ```

pub mod access_log;
pub mod logging;
pub mod metrics;

pub use access_log::{AccessLogError, AccessLogger, AccessRecord};
pub use metrics::MetricsRecorder;
