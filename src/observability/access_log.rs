//! Access log sink.
//!
//! One line per completed request:
//!
//! ```text
//! 2024/05/01 12:00:00 203.0.113.7:51234 GET /index.html 1.2034ms 200 "curl/8.5.0"
//! ```
//!
//! Lines are formatted before the sink lock is taken and written with a
//! single `write_all`, so concurrent requests never interleave partial lines.

use std::fs::OpenOptions;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("cannot open access log {path:?}: {source}")]
pub struct AccessLogError {
    path: PathBuf,
    #[source]
    source: io::Error,
}

/// Fields of a single access log line.
#[derive(Debug, Clone, Copy)]
pub struct AccessRecord<'a> {
    pub remote_addr: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub elapsed: Duration,
    pub status: u16,
    pub user_agent: &'a str,
}

/// Shared handle to the access log.
#[derive(Clone)]
pub struct AccessLogger {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl AccessLogger {
    /// Open the configured sink: an append-only file, or stdout when no
    /// path is given.
    pub fn open(path: Option<&Path>) -> Result<Self, AccessLogError> {
        let Some(path) = path else {
            tracing::info!("Access log to stdout");
            return Ok(Self::with_writer(Box::new(io::stdout())));
        };

        let err = |source| AccessLogError {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(err)?;
        file.seek(SeekFrom::End(0)).map_err(err)?;

        tracing::info!(path = ?path, "Access log to file");
        Ok(Self::with_writer(Box::new(file)))
    }

    /// Log into an arbitrary writer.
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(writer)),
        }
    }

    /// Append one line. Write failures are reported through tracing and
    /// never reach the request path.
    pub fn log(&self, record: &AccessRecord<'_>) {
        let line = format_line(record);
        let mut sink = self.sink.lock();
        if let Err(e) = sink.write_all(line.as_bytes()).and_then(|()| sink.flush()) {
            tracing::error!(error = %e, "Failed to write access log");
        }
    }
}

impl std::fmt::Debug for AccessLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLogger").finish_non_exhaustive()
    }
}

fn format_line(record: &AccessRecord<'_>) -> String {
    format!(
        "{} {} {} {} {:?} {} \"{}\"\n",
        Local::now().format("%Y/%m/%d %H:%M:%S"),
        record.remote_addr,
        record.method,
        record.path,
        record.elapsed,
        record.status,
        record.user_agent,
    )
}
