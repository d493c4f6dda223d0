//! RDNS HTTP server.
//!
//! Wires the core engine and a storage driver into a running Axum server,
//! serving the JSON API at `/v1/*` plus `/ping` and `/metrics`.

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod reaper;
pub mod routes;
pub mod state;
