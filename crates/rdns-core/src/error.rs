//! Errors from the record/lease engine.
//!
//! One enum for the whole engine, the way `rdns-storage::DriverError` covers
//! both storage drivers — the engine sits directly on top of one driver, so
//! there is no per-subsystem split the way `zvault-core` separates
//! `TokenError`/`LeaseError`/`PolicyError` for its several secrets engines.

use rdns_storage::DriverError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The requested Name has no record (or never had one).
    #[error("name not found")]
    NotFound,

    /// `Set` was asked to create a Name that already exists, or an
    /// update/renew/delete targeted one that does not.
    #[error("name already exists")]
    Exists,

    /// Every slug candidate drawn in the retry budget (100 attempts)
    /// collided with a live or frozen slug.
    #[error("exhausted slug generation attempts")]
    GenerationExhausted,

    /// The caller-supplied FQDN, host list, or TTL failed validation.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The presented bearer token did not match the stored origin.
    #[error("unauthorized")]
    Unauthorized,

    /// The underlying driver returned an error.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Token hashing or another internal operation failed.
    #[error("internal engine error: {0}")]
    Internal(String),
}
