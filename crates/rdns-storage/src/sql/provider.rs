//! The external managed-DNS provider, abstracted behind a small async trait
//! rather than hard-wiring an AWS SDK call — the same seam `zvault-storage`
//! uses between `Barrier` and `StorageBackend` (swap the implementation,
//! keep the call site). This lets [`super::SqlDriver`] be exercised in
//! tests against [`InMemoryProvider`] without live credentials.
//!
//! `encode_wildcard` turns a Name into the `*.name` form a provider upsert
//! targets for the anchor A record.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::error::DriverError;

/// A single resource record set change.
#[derive(Debug, Clone)]
pub struct RrSet {
    /// On-the-wire name. Wildcards are encoded `\052.<rest>` the way the
    /// provider requires, not `*.<rest>`.
    pub name: String,
    pub record_type: &'static str,
    pub values: BTreeSet<String>,
}

#[async_trait]
pub trait DnsProvider: Send + Sync + 'static {
    async fn upsert(&self, rrset: &RrSet) -> Result<(), DriverError>;
    async fn delete(&self, name: &str, record_type: &'static str) -> Result<(), DriverError>;
    async fn list(&self, name: &str, record_type: &'static str) -> Result<BTreeSet<String>, DriverError>;
}

/// Encode a wildcard label the way the managed provider requires:
/// `*.name` => `\052.name`.
#[must_use]
pub fn encode_wildcard(name: &str) -> String {
    format!("\\052.{name}")
}

/// Fake provider backing tests: holds `(name, type) -> values` in memory so
/// the SQL driver's upsert/delete/read-path logic can be exercised without
/// live AWS credentials.
#[derive(Default)]
pub struct InMemoryProvider {
    records: Mutex<std::collections::HashMap<(String, &'static str), BTreeSet<String>>>,
}

impl InMemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DnsProvider for InMemoryProvider {
    async fn upsert(&self, rrset: &RrSet) -> Result<(), DriverError> {
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.insert((rrset.name.clone(), rrset.record_type), rrset.values.clone());
        Ok(())
    }

    async fn delete(&self, name: &str, record_type: &'static str) -> Result<(), DriverError> {
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.remove(&(name.to_owned(), record_type));
        Ok(())
    }

    async fn list(&self, name: &str, record_type: &'static str) -> Result<BTreeSet<String>, DriverError> {
        let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(records
            .get(&(name.to_owned(), record_type))
            .cloned()
            .unwrap_or_default())
    }
}
