//! Reaper background task, meaningful only for the managed-DNS+SQL driver —
//! the native-KV driver expires keys natively and `Engine::reap` is a no-op
//! for it.
//!
//! Scheduling follows `lease_expiry_worker`'s shape in `zvault-server`'s
//! `main.rs`: a `tokio::select!` between an interval tick and a
//! `watch::Receiver<bool>` shutdown signal, with the same consecutive-
//! failure escalation.
//!
//! Interval jitter mirrors the Go original's
//! `wait.JitterUntil(purge, 600*time.Second, 0.1, true, done)`: each tick
//! sleeps `600s * (1.0 + jitter)` with `jitter` drawn uniformly from
//! `[0.0, 0.1)` and recomputed every iteration.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};

use rdns_core::Engine;

const BASE_INTERVAL_SECS: f64 = 600.0;
const JITTER_FRACTION: f64 = 0.1;
const FAILURE_ESCALATION_THRESHOLD: u32 = 5;

fn next_interval() -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..JITTER_FRACTION);
    Duration::from_secs_f64(BASE_INTERVAL_SECS * (1.0 + jitter))
}

pub async fn run(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    let mut consecutive_failures: u32 = 0;
    info!("reaper started");

    loop {
        let sleep = tokio::time::sleep(next_interval());
        tokio::select! {
            () = sleep => {
                match engine.reap().await {
                    Ok(outcome) => {
                        consecutive_failures = 0;
                        if outcome.names_deleted > 0 || outcome.frozen_deleted > 0 || outcome.failures > 0 {
                            info!(
                                names_deleted = outcome.names_deleted,
                                frozen_deleted = outcome.frozen_deleted,
                                failures = outcome.failures,
                                "reaper sweep complete"
                            );
                        }
                    }
                    Err(err) => {
                        consecutive_failures = consecutive_failures.saturating_add(1);
                        if consecutive_failures >= FAILURE_ESCALATION_THRESHOLD {
                            tracing::error!(
                                error = %err,
                                consecutive_failures,
                                "reaper sweep persistently failing — driver may be unavailable"
                            );
                        } else {
                            warn!(error = %err, consecutive_failures, "reaper sweep failed, will retry next tick");
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("reaper shutting down");
                return;
            }
        }
    }
}
