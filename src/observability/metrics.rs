//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): completed requests by handler
//! - `http_request_duration_seconds` (summary): latency distribution
//!
//! # Design Decisions
//! - The recorder is owned by the server context instead of being installed
//!   globally, so several servers (and tests) never share series
//! - Counter handles are registered once per handler label and cached

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::get, Router};
use dashmap::DashMap;
use metrics::{Counter, Histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tokio::net::TcpListener;

const REQUESTS_TOTAL: &str = "http_requests_total";
const REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Request counters and the latency distribution.
pub struct MetricsRecorder {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    duration: Histogram,
    requests: DashMap<String, Counter>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let duration = metrics::with_local_recorder(&recorder, || {
            metrics::describe_counter!(REQUESTS_TOTAL, "The total number of http request");
            metrics::describe_histogram!(
                REQUEST_DURATION,
                Unit::Seconds,
                "The request duration distribution"
            );
            metrics::histogram!(REQUEST_DURATION)
        });

        Self {
            recorder,
            handle,
            duration,
            requests: DashMap::new(),
        }
    }

    /// Record one completed request. Safe to call from any task.
    pub fn observe(&self, handler: &str, elapsed: Duration) {
        self.duration.record(elapsed.as_secs_f64());

        if let Some(counter) = self.requests.get(handler) {
            counter.increment(1);
            return;
        }

        let counter = self
            .requests
            .entry(handler.to_string())
            .or_insert_with(|| {
                let label = handler.to_string();
                metrics::with_local_recorder(&self.recorder, || {
                    metrics::counter!(REQUESTS_TOTAL, "handler" => label)
                })
            })
            .clone();
        counter.increment(1);
    }

    /// Prometheus text exposition of every series.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("handlers", &self.requests.len())
            .finish_non_exhaustive()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve `GET /metrics` until the listener fails.
pub async fn serve_metrics(addr: SocketAddr, recorder: Arc<MetricsRecorder>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Prometheus metrics at /metrics");

    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(recorder);
    axum::serve(listener, app).await
}

async fn render_metrics(State(recorder): State<Arc<MetricsRecorder>>) -> String {
    recorder.render()
}
