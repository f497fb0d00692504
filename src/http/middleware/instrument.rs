//! Request instrumentation middleware.
//!
//! Wraps the application handler so that every request produces exactly one
//! access log line and one latency observation. The per-request work happens
//! in [`RequestScope`]'s `Drop`. The scope travels inside the response body,
//! so elapsed time covers writing the body; it is dropped once the body is
//! finished, when the handler panics, or when the connection goes away.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ConnectInfo, MatchedPath, State},
    http::{HeaderMap, Request},
    middleware::{self, Next},
    response::Response,
    Router,
};

use http_body::{Frame, SizeHint};

use crate::http::middleware::log_writer::{LogPool, LogWriter};
use crate::observability::{AccessLogger, AccessRecord, MetricsRecorder};
use crate::security::headers::SecurityHeaders;

/// Handler label used when no route pattern matched.
pub const DEFAULT_HANDLER: &str = "default";

/// Security headers the response will carry, visible to the handler as a
/// request extension.
#[derive(Debug, Clone)]
pub struct AdvertisedHeaders(pub HeaderMap);

/// Shared instrumentation state.
#[derive(Debug)]
pub struct Instrumentation {
    pool: LogPool,
    access_log: AccessLogger,
    metrics: Arc<MetricsRecorder>,
    headers: Option<SecurityHeaders>,
}

impl Instrumentation {
    /// `headers` is `Some` exactly when TLS is configured.
    pub fn new(
        access_log: AccessLogger,
        metrics: Arc<MetricsRecorder>,
        headers: Option<SecurityHeaders>,
    ) -> Self {
        Self {
            pool: LogPool::default(),
            access_log,
            metrics,
            headers,
        }
    }

    /// Wrap `handler` with instrumentation.
    pub fn wrap(self: Arc<Self>, handler: Router) -> Router {
        handler.layer(middleware::from_fn_with_state(self, instrument))
    }

    pub fn pool(&self) -> &LogPool {
        &self.pool
    }

    /// Borrow a writer for `request`; the returned scope emits and releases
    /// it when dropped.
    pub fn begin<B>(self: &Arc<Self>, request: &Request<B>) -> RequestScope {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "-".to_string());
        let handler = request
            .extensions()
            .get::<MatchedPath>()
            .map_or(DEFAULT_HANDLER, MatchedPath::as_str);

        let mut writer = self.pool.acquire();
        writer.bind(request, &remote_addr, handler);

        RequestScope {
            writer: Some(writer),
            owner: Arc::clone(self),
        }
    }

    fn finish(&self, writer: LogWriter) {
        let elapsed = writer.elapsed();

        self.access_log.log(&AccessRecord {
            remote_addr: writer.remote_addr(),
            method: writer.method(),
            path: writer.path(),
            elapsed,
            status: writer.status().as_u16(),
            user_agent: writer.user_agent(),
        });
        self.metrics.observe(writer.handler(), elapsed);

        self.pool.release(writer);
    }
}

/// Scoped borrow of a [`LogWriter`].
pub struct RequestScope {
    writer: Option<LogWriter>,
    owner: Arc<Instrumentation>,
}

impl RequestScope {
    pub fn writer(&mut self) -> &mut LogWriter {
        self.writer
            .as_mut()
            .unwrap_or_else(|| unreachable!("writer is only taken on drop"))
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            self.owner.finish(writer);
        }
    }
}

async fn instrument(
    State(instrumentation): State<Arc<Instrumentation>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let mut scope = instrumentation.begin(&request);

    if let Some(headers) = &instrumentation.headers {
        request
            .extensions_mut()
            .insert(AdvertisedHeaders(headers.as_map().clone()));
    }

    let mut response = next.run(request).await;

    if let Some(headers) = &instrumentation.headers {
        headers.apply(response.headers_mut());
    }
    scope.writer().write_header(response.status());

    response.map(|body| {
        Body::new(ScopedBody {
            inner: body,
            _scope: scope,
        })
    })
}

/// Response body holding the request's [`RequestScope`] until it is
/// finished or dropped.
struct ScopedBody {
    inner: Body,
    _scope: RequestScope,
}

impl HttpBody for ScopedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
