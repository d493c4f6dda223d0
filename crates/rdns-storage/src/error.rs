//! Error kinds surfaced by every [`crate::driver::DnsDriver`] implementation.
//!
//! One enum for both drivers (the native-KV driver and the managed-DNS+SQL
//! driver) — the driver contract is uniform across both, so there is no
//! per-driver split the way `zvault-storage` splits `BarrierError`/
//! `TokenError`/`PolicyError` per subsystem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    Exists,

    #[error("backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error("operation timed out")]
    Timeout,

    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("internal driver error: {reason}")]
    Internal { reason: String },
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::PoolTimedOut => Self::Timeout,
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed => Self::BackendUnavailable {
                reason: err.to_string(),
            },
            other => Self::Internal {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(feature = "etcd-backend")]
impl From<etcd_client::Error> for DriverError {
    fn from(err: etcd_client::Error) -> Self {
        Self::BackendUnavailable {
            reason: err.to_string(),
        }
    }
}
