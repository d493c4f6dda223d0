//! Shared application state for the RDNS server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`, following `zvault-server::state`'s shape but
//! holding only the one subsystem this control plane has: the record/lease
//! engine.

use std::sync::Arc;

use rdns_core::Engine;

use crate::metrics::Metrics;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// The record/lease engine, driving whichever storage driver was
    /// configured at startup.
    pub engine: Arc<Engine>,
    /// The `/metrics` Prometheus text exporter.
    pub metrics: Arc<Metrics>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
