//! # Request Metrics
//!
//! In-process request and error counters, exposed at `/metrics` in the
//! Prometheus text format. Every request is also counted through the
//! `metrics` facade so an installed Prometheus recorder sees it with
//! method and status labels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Shared metrics state.
#[derive(Debug, Clone)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// 4xx and 5xx responses.
    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Counters in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        format!(
            "# TYPE audit_api_requests_total counter\naudit_api_requests_total {}\n\
             # TYPE audit_api_errors_total counter\naudit_api_errors_total {}\n",
            self.requests(),
            self.errors()
        )
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware that increments request and error counters.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let tracked = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();

    let response = next.run(request).await;
    let status = response.status();

    if let Some(m) = tracked {
        m.request_count.fetch_add(1, Ordering::Relaxed);
        if status.is_server_error() || status.is_client_error() {
            m.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    metrics::counter!(
        "audit_http_requests_total",
        "method" => method,
        "status" => status.as_u16().to_string()
    )
    .increment(1);

    response
}

/// Count a committed control transition.
pub fn record_transition(to: &str) {
    metrics::counter!("audit_control_transitions_total", "to" => to.to_string()).increment(1);
}
