use crate::server::SharedState;
use axum::{routing::get, Router};

mod dashboard;
mod health;
mod metrics;
mod ws;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(dashboard::index))
        .route("/ws", get(ws::ws_handler))
        .route("/healthcheck", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
