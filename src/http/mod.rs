//! Legacy synchronous HTTP surface (§6) and the Prometheus metrics endpoint.

pub mod metrics;
pub mod routes;

pub use metrics::{install_recorder, metrics_router};
pub use routes::{build_router, AppState};
