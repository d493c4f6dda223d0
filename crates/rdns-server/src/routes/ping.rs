//! `GET /ping` liveness check: always 200, no auth, no body.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ping", get(|| async { "pong" }))
}
