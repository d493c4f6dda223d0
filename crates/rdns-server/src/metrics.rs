//! Metrics emitter.
//!
//! Every 5 seconds, samples `Engine::token_count` and sets a single gauge
//! named `rancher_dns_tokens`. `prometheus` is new to this dependency set
//! but is the idiomatic choice for exposing a `/metrics` text endpoint, and
//! is wired the same way `zvault-server` wires any other periodic
//! `tokio::select!`-gated background task.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use tokio::sync::watch;
use tracing::{error, info};

use rdns_core::Engine;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

pub struct Metrics {
    registry: Registry,
    token_gauge: IntGauge,
}

impl Metrics {
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn new() -> Self {
        // Both calls are only fallible on a malformed metric name or a
        // duplicate registration — neither can happen with this
        // compile-time-constant name registered exactly once.
        let registry = Registry::new();
        let token_gauge = IntGauge::new("rancher_dns_tokens", "The number of the rancher dns tokens").unwrap();
        registry.register(Box::new(token_gauge.clone())).unwrap();
        Self { registry, token_gauge }
    }

    #[must_use]
    pub fn render(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run(engine: Arc<Engine>, metrics: Arc<Metrics>, mut shutdown: watch::Receiver<bool>) {
    info!("metrics emitter started");
    loop {
        tokio::select! {
            () = tokio::time::sleep(SAMPLE_INTERVAL) => {
                match engine.token_count().await {
                    Ok(count) => metrics.token_gauge.set(i64::try_from(count).unwrap_or(i64::MAX)),
                    Err(err) => error!(error = %err, "failed to sample token count"),
                }
            }
            _ = shutdown.changed() => {
                info!("metrics emitter shutting down");
                return;
            }
        }
    }
}
