//! `GET /metrics` Prometheus exposition (§5, observability). Served on its
//! own listener (`MetricsPort`, separate from the token API's `ListenPort`),
//! so a scraper never contends with request traffic.

use axum::extract::Extension;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install the Prometheus recorder")
}

pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render))
        .layer(Extension(handle))
}

async fn render(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
