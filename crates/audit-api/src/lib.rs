//! # audit-api: Axum API Services
//!
//! HTTP surface of the audit engagement stack, built on Axum/Tower/Tokio.
//! Every handler delegates to `audit-state` and `audit-testing`; no business
//! rule lives in a route.
//!
//! ## Routers
//!
//! - `/v1/matrices/*`: risk & control matrix builder
//! - `/v1/engagements/*`: engagements, their controls and deficiencies
//! - `/v1/engagements/{id}/controls/{cid}/*`: control lifecycle
//! - `/v1/engagements/{id}/controls/{cid}/testing/*`: testing workspace
//! - `/v1/evaluate/*`: stateless evaluation of request bodies
//! - `/metrics`: Prometheus text exposition
//! - `/health/*`: liveness and readiness probes
//!
//! ## Middleware Stack (Tower)
//!
//! TraceLayer → MetricsLayer
//!
//! The acting user comes from the `X-Actor` header, falling back to the
//! configured default actor.

pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use error::AppError;
pub use state::AppState;

use axum::extract::State;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::middleware::metrics::ApiMetrics;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let metrics = ApiMetrics::new();

    let api = Router::new()
        .merge(routes::matrices::router())
        .merge(routes::engagements::router())
        .merge(routes::controls::router())
        .merge(routes::testing::router())
        .merge(routes::evaluate::router())
        .route("/metrics", get(render_metrics))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(metrics))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    Router::new().merge(health).merge(api)
}

/// In-process counters, followed by the installed recorder's output.
async fn render_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> String {
    let mut body = metrics.render();
    if let Some(handle) = &state.prometheus {
        body.push_str(&handle.render());
    }
    body
}

/// Liveness probe. 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe. 200 once the application can serve.
async fn readiness() -> &'static str {
    "ready"
}
