//! Metrics exposition endpoint.

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::metrics::Metrics;

/// Creates the metrics route for any state that carries a registry.
pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Metrics: FromRef<S>,
{
    Router::new().route("/metrics", get(metrics_handler))
}

/// Returns all collected metrics in Prometheus text format.
///
/// Restrict this endpoint at the ingress if the services are exposed publicly.
async fn metrics_handler(State(metrics): State<Metrics>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics.render(),
    )
}
