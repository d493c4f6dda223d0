//! `GET /metrics`: the Prometheus text exposition for the gauge
//! `metrics::Metrics` maintains.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(render_metrics))
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}
