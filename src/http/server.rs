//! Dual-transport HTTP server.
//!
//! # Responsibilities
//! - Build the server context (config, certificate store, access log, metrics)
//! - Wrap the application handler with instrumentation and TLS headers
//! - Bind the primary TCP listener (TLS or plain) and serve on it
//! - Run the QUIC listener as an independent, best-effort task
//! - Run the optional metrics listener
//! - Stop when the primary listener stops
//!
//! The primary listener's fate is the process's fate: `run` returns as soon
//! as it terminates, for any reason. The QUIC listener only ever degrades
//! the server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::InvalidHeaderValue;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::http::middleware::Instrumentation;
use crate::lifecycle::{signals, Shutdown, StateHandle};
use crate::net::listener::{bind_tcp, parse_listen_addr, AddrError};
use crate::net::{CertificateStore, CertificateWatcher, QuicListener, TlsError};
use crate::observability::metrics::serve_metrics;
use crate::observability::{AccessLogError, AccessLogger, MetricsRecorder};
use crate::security::headers::SecurityHeaders;

/// Time in-flight requests get to finish after a shutdown signal.
const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Fatal server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Address(#[from] AddrError),

    #[error(transparent)]
    AccessLog(#[from] AccessLogError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("invalid alt-svc value: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("primary listener failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Everything the listeners and middleware share, built once at startup.
#[derive(Debug)]
pub struct ServerContext {
    pub config: Arc<ServerConfig>,
    pub certs: Arc<CertificateStore>,
    pub access_log: AccessLogger,
    pub metrics: Arc<MetricsRecorder>,
    pub state: StateHandle,
}

impl ServerContext {
    /// Build the context; fails if the configured access log cannot be
    /// opened.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let access_log = AccessLogger::open(config.access_log_path())?;
        Ok(Self::with_access_log(config, access_log))
    }

    pub fn with_access_log(config: ServerConfig, access_log: AccessLogger) -> Self {
        Self {
            config: Arc::new(config),
            certs: Arc::new(CertificateStore::new()),
            access_log,
            metrics: Arc::new(MetricsRecorder::new()),
            state: StateHandle::new(),
        }
    }
}

/// Serves one handler over TCP (TLS or plain) and, with TLS, over QUIC.
pub struct DualServer {
    ctx: Arc<ServerContext>,
    handler: Router,
}

impl DualServer {
    /// Create a server for `handler` from the given configuration.
    pub fn new(config: ServerConfig, handler: Router) -> Result<Self, ServerError> {
        Ok(Self::with_context(ServerContext::new(config)?, handler))
    }

    pub fn with_context(ctx: ServerContext, handler: Router) -> Self {
        Self {
            ctx: Arc::new(ctx),
            handler,
        }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    pub fn state(&self) -> StateHandle {
        self.ctx.state.clone()
    }

    /// Serve until the primary listener stops.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ServerError> {
        let state = self.state();
        state.starting();

        let result = self.serve(shutdown.clone()).await;
        state.stopped();
        // Secondary listener and reload tasks follow the primary down.
        shutdown.trigger();

        match &result {
            Ok(()) => tracing::info!("Primary listener stopped"),
            Err(e) => tracing::error!(error = %e, "Primary listener failed"),
        }
        result
    }

    async fn serve(self, shutdown: Shutdown) -> Result<(), ServerError> {
        let config = self.ctx.config.clone();
        let addr = parse_listen_addr(&config.listen)?;

        if let Some(metrics_addr) = config.metric_listen_addr() {
            self.spawn_metrics(metrics_addr);
        }

        let listener = bind_tcp(addr)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AddrError::Bind { addr, source })?;
        let app = self.build_router(local_addr)?;

        let handle = Handle::new();
        spawn_graceful_shutdown(handle.clone(), &shutdown);
        let make_service = app.clone().into_make_service_with_connect_info::<SocketAddr>();

        let Some((cert_path, key_path)) = config.tls_paths() else {
            self.ctx.state.serving();
            tracing::info!(address = %local_addr, "Serving HTTP");
            return axum_server::from_tcp(listener)
                .handle(handle)
                .serve(make_service)
                .await
                .map_err(ServerError::Serve);
        };

        // Failure is logged by the store; handshakes fail until a reload.
        let _ = self.ctx.certs.load(cert_path, key_path);

        self.spawn_quic(local_addr, app, &shutdown);
        let _watcher = self.watch_certificates(cert_path, key_path, &shutdown);

        let tls = RustlsConfig::from_config(Arc::new(self.ctx.certs.tcp_server_config()?));
        self.ctx.state.serving();
        tracing::info!(address = %local_addr, "Serving HTTPS and HTTP/3");

        axum_server::tls_rustls::from_tcp_rustls(listener, tls)
            .handle(handle)
            .serve(make_service)
            .await
            .map_err(ServerError::Serve)
    }

    /// Application handler wrapped with instrumentation and tracing.
    fn build_router(&self, local_addr: SocketAddr) -> Result<Router, ServerError> {
        let headers = if self.ctx.config.tls_enabled() {
            Some(SecurityHeaders::for_port(local_addr.port())?)
        } else {
            None
        };

        let instrumentation = Arc::new(Instrumentation::new(
            self.ctx.access_log.clone(),
            self.ctx.metrics.clone(),
            headers,
        ));

        Ok(instrumentation
            .wrap(self.handler.clone())
            .layer(TraceLayer::new_for_http()))
    }

    /// Secondary listener: bind and serve on its own task. Any failure is
    /// logged and degrades the server; there is no retry.
    fn spawn_quic(&self, addr: SocketAddr, app: Router, shutdown: &Shutdown) {
        let certs = self.ctx.certs.clone();
        let state = self.state();
        let stop = shutdown.subscribe();

        let task = async move {
            let result = match QuicListener::bind(addr, &certs, app) {
                Ok(listener) => listener.run(stop).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "QUIC listener failed, serving over TCP only");
                state.degraded();
            }
        };
        tokio::spawn(task.in_current_span());
    }

    fn spawn_metrics(&self, addr: &str) {
        let addr = match parse_listen_addr(addr) {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(error = %e, "Metrics listener disabled");
                return;
            }
        };
        let metrics = self.ctx.metrics.clone();

        tokio::spawn(
            async move {
                if let Err(e) = serve_metrics(addr, metrics).await {
                    tracing::error!(address = %addr, error = %e, "Metrics listener failed");
                }
            }
            .in_current_span(),
        );
    }

    /// External reload triggers: file changes and SIGHUP.
    fn watch_certificates(
        &self,
        cert_path: &Path,
        key_path: &Path,
        shutdown: &Shutdown,
    ) -> Option<notify::RecommendedWatcher> {
        signals::spawn_reload_listener(
            self.ctx.certs.clone(),
            cert_path.to_path_buf(),
            key_path.to_path_buf(),
            shutdown.clone(),
        );

        match CertificateWatcher::new(cert_path, key_path, self.ctx.certs.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Certificate file watcher disabled");
                None
            }
        }
    }
}

fn spawn_graceful_shutdown(handle: Handle, shutdown: &Shutdown) {
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        if let Err(RecvError::Closed) = stop.recv().await {
            return;
        }
        tracing::info!("Draining primary listener");
        handle.graceful_shutdown(Some(GRACE_PERIOD));
    });
}
