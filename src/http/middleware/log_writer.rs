//! Pooled per-request log context.
//!
//! A [`LogWriter`] carries everything the access log line needs and
//! captures the status written onto the response. Writers are recycled
//! through a [`LogPool`] so their string buffers are reused across requests.
//! Ownership moves out of the pool on [`LogPool::acquire`] and back on
//! [`LogPool::release`], so two requests can never hold the same writer.

use std::time::{Duration, Instant};

use axum::http::{header::USER_AGENT, Request, StatusCode};
use parking_lot::Mutex;

/// Status logged when the handler never sets one explicitly.
pub const DEFAULT_STATUS: StatusCode = StatusCode::OK;

/// Idle writers kept for reuse; extras are dropped on release.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Reusable status-capturing record for one in-flight request.
#[derive(Debug)]
pub struct LogWriter {
    status: StatusCode,
    status_written: bool,
    remote_addr: String,
    method: String,
    path: String,
    user_agent: String,
    handler: String,
    start: Instant,
}

impl LogWriter {
    fn new() -> Self {
        Self {
            status: DEFAULT_STATUS,
            status_written: false,
            remote_addr: String::new(),
            method: String::new(),
            path: String::new(),
            user_agent: String::new(),
            handler: String::new(),
            start: Instant::now(),
        }
    }

    fn reset(&mut self) {
        self.status = DEFAULT_STATUS;
        self.status_written = false;
        self.remote_addr.clear();
        self.method.clear();
        self.path.clear();
        self.user_agent.clear();
        self.handler.clear();
        self.start = Instant::now();
    }

    /// Bind the writer to an incoming request.
    pub fn bind<B>(&mut self, request: &Request<B>, remote_addr: &str, handler: &str) {
        self.start = Instant::now();
        self.remote_addr.push_str(remote_addr);
        self.method.push_str(request.method().as_str());
        self.path.push_str(request.uri().path());
        self.handler.push_str(handler);
        if let Some(agent) = request.headers().get(USER_AGENT) {
            self.user_agent
                .push_str(&String::from_utf8_lossy(agent.as_bytes()));
        }
    }

    /// Intercept the status written onto the response. Only the first
    /// write is recorded.
    pub fn write_header(&mut self, status: StatusCode) {
        if !self.status_written {
            self.status = status;
            self.status_written = true;
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Concurrent object pool of [`LogWriter`]s.
#[derive(Debug)]
pub struct LogPool {
    idle: Mutex<Vec<LogWriter>>,
    max_idle: usize,
}

impl LogPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take an idle writer, or build one when the pool is empty. The
    /// writer comes back reset, with its status at [`DEFAULT_STATUS`].
    pub fn acquire(&self) -> LogWriter {
        let recycled = self.idle.lock().pop();
        match recycled {
            Some(mut writer) => {
                writer.reset();
                writer
            }
            None => LogWriter::new(),
        }
    }

    /// Return a writer for reuse.
    pub fn release(&self, writer: LogWriter) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(writer);
        }
    }

    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }
}

impl Default for LogPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}
