//! Storage driver interface.
//!
//! Every operation the record/lease engine needs from a backing store,
//! expressed as one async trait so both the native-KV driver and the
//! managed-DNS+SQL driver share a single seam — following the shape of
//! `zvault_storage::StorageBackend` (one trait, several implementations,
//! the engine never matches on which one it holds).
//!
//! Every call may fail with a [`DriverError`]; the engine wraps each call
//! in its own timeout (100ms for KV, driver default for SQL) rather than
//! the trait enforcing one, matching how `StorageBackend` stays
//! transport-agnostic and lets the caller decide.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DriverError;
use crate::model::{Bundle, BundleWithTtl, Name};

#[async_trait]
pub trait DnsDriver: Send + Sync + 'static {
    /// Full Record bundle plus remaining TTL, or `NotFound`.
    async fn get(&self, name: &Name) -> Result<BundleWithTtl, DriverError>;

    /// Upsert `bundle`, refresh the lease, reconcile host sets and the
    /// sub-domain map. If `existing` is `false`, `name` must not already
    /// exist (`Exists` otherwise).
    async fn set(&self, name: &Name, bundle: &Bundle, existing: bool) -> Result<(), DriverError>;

    /// Extend the lease on every key belonging to `name` (token, root,
    /// wildcard, each sub-prefix, TXT/CNAME if present). Returns the new
    /// expiration.
    async fn renew(&self, name: &Name) -> Result<DateTime<Utc>, DriverError>;

    /// Remove the payload and token; the sub-domain tree is recursively
    /// deleted. The frozen slot is left untouched.
    async fn delete(&self, name: &Name) -> Result<(), DriverError>;

    async fn set_text(&self, name: &Name, text: &str) -> Result<(), DriverError>;
    async fn get_text(&self, name: &Name) -> Result<String, DriverError>;
    async fn update_text(&self, name: &Name, text: &str) -> Result<(), DriverError>;
    async fn delete_text(&self, name: &Name) -> Result<(), DriverError>;

    async fn set_cname(&self, name: &Name, cname: &str) -> Result<(), DriverError>;
    async fn get_cname(&self, name: &Name) -> Result<String, DriverError>;
    async fn update_cname(&self, name: &Name, cname: &str) -> Result<(), DriverError>;
    async fn delete_cname(&self, name: &Name) -> Result<(), DriverError>;

    /// The stored token origin, or `NotFound`.
    async fn get_token(&self, name: &Name) -> Result<String, DriverError>;

    /// Global live-name count, sampled by the metrics emitter.
    async fn get_token_count(&self) -> Result<u64, DriverError>;

    async fn check_frozen(&self, slug: &str) -> Result<bool, DriverError>;

    /// Create or refresh the frozen slot for `slug` with the configured
    /// `frozen` TTL.
    async fn reserve_frozen(&self, slug: &str) -> Result<(), DriverError>;

    /// Create the Token for `name` with a fresh lease, returning the
    /// plaintext origin. Part of the `Set` allocation protocol (step 2):
    /// separated from `set` because the token is written before the
    /// bundle and binds the lease every subsequent key for this Name
    /// reuses.
    async fn create_token(&self, name: &Name, origin: &str) -> Result<(), DriverError>;

    /// Sweep expired names/tokens and freed frozen slots. A no-op for the
    /// native-KV driver, whose keys expire via the store's own lease
    /// primitive; meaningful only for the managed-DNS+SQL driver, which
    /// emulates TTL in SQL and needs the reaper (§4.7) to do the work.
    /// Default implementation is the no-op so implementing `get_reap_batch`
    /// is opt-in.
    async fn reap_expired(&self) -> Result<ReapOutcome, DriverError> {
        Ok(ReapOutcome::default())
    }
}

/// Result of one reaper sweep.
#[derive(Debug, Clone, Default)]
pub struct ReapOutcome {
    pub names_deleted: usize,
    pub frozen_deleted: usize,
    pub failures: usize,
}
