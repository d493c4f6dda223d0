//! In-memory [`DnsDriver`] test double.
//!
//! Plays the same role `zvault_storage::MemoryBackend` does: a backend that
//! exists purely so the layers above it (here, the engine and the HTTP
//! routes) can be exercised in tests without a live etcd cluster or
//! Postgres instance. Lease semantics are emulated in-process: `get`
//! computes expiry from the stored `Lease` and reports `NotFound` once it
//! has lapsed, the same observable behavior a real TTL store gives for
//! free.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::driver::{DnsDriver, ReapOutcome};
use crate::error::DriverError;
use crate::model::{Bundle, BundleWithTtl, FrozenSlot, Lease, Name};

struct Entry {
    bundle: Bundle,
    lease: Lease,
    token_origin: String,
}

#[derive(Default)]
struct Inner {
    names: HashMap<String, Entry>,
    frozen: HashMap<String, FrozenSlot>,
    /// TXT/CNAME leaves keyed by their own full FQDN rather than the owning
    /// `Name`'s key, so a leaf nested arbitrarily deep under an allocated
    /// name (e.g. `_acme-challenge.sub.abc123.zone`) has somewhere to live.
    /// Liveness is still governed by the owning `Name`'s lease, resolved via
    /// `Name::ancestor_name`, not by an entry of its own here.
    texts: HashMap<String, String>,
    cnames: HashMap<String, String>,
}

/// An in-memory driver, safe to share across tasks via `Arc`.
pub struct MemoryDriver {
    zone: String,
    inner: Mutex<Inner>,
}

impl MemoryDriver {
    #[must_use]
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Check that the `Name` owning `leaf` (itself if `leaf` is already an
    /// allocated Name) is live, evicting it from `names` if its lease has
    /// lapsed. A TXT/CNAME leaf is never reachable once its owner is gone.
    fn live_owner<'a>(&self, inner: &'a mut Inner, leaf: &Name) -> Option<&'a mut Entry> {
        let owner = leaf.ancestor_name(&self.zone);
        live_entry(inner, owner.as_str())
    }
}

fn live_entry<'a>(inner: &'a mut Inner, key: &str) -> Option<&'a mut Entry> {
    let expired = inner.names.get(key).is_some_and(|e| e.lease.is_expired());
    if expired {
        inner.names.remove(key);
        return None;
    }
    inner.names.get_mut(key)
}

#[async_trait]
impl DnsDriver for MemoryDriver {
    async fn get(&self, name: &Name) -> Result<BundleWithTtl, DriverError> {
        let mut inner = self.lock();
        let entry = live_entry(&mut inner, name.as_str()).ok_or(DriverError::NotFound)?;
        let mut bundle = entry.bundle.clone();
        let expires_at = entry.lease.expires_at();
        bundle.text = inner.texts.get(name.as_str()).cloned();
        bundle.cname = inner.cnames.get(name.as_str()).cloned();
        Ok(BundleWithTtl { bundle, expires_at })
    }

    async fn set(&self, name: &Name, bundle: &Bundle, existing: bool) -> Result<(), DriverError> {
        let mut inner = self.lock();
        let already = live_entry(&mut inner, name.as_str()).is_some();
        if !existing && already {
            return Err(DriverError::Exists);
        }
        if existing && !already {
            return Err(DriverError::NotFound);
        }
        let entry = inner
            .names
            .get_mut(name.as_str())
            .ok_or(DriverError::NotFound)?;
        entry.bundle = bundle.clone();
        entry.lease = Lease::new(entry.lease.ttl);
        Ok(())
    }

    async fn renew(&self, name: &Name) -> Result<DateTime<Utc>, DriverError> {
        let mut inner = self.lock();
        let entry = live_entry(&mut inner, name.as_str()).ok_or(DriverError::NotFound)?;
        entry.lease = Lease::new(entry.lease.ttl);
        Ok(entry.lease.expires_at())
    }

    async fn delete(&self, name: &Name) -> Result<(), DriverError> {
        let mut inner = self.lock();
        inner.names.remove(name.as_str());
        Ok(())
    }

    async fn set_text(&self, name: &Name, text: &str) -> Result<(), DriverError> {
        let mut inner = self.lock();
        self.live_owner(&mut inner, name).ok_or(DriverError::NotFound)?;
        inner.texts.insert(name.as_str().to_owned(), text.to_owned());
        Ok(())
    }

    async fn get_text(&self, name: &Name) -> Result<String, DriverError> {
        let mut inner = self.lock();
        self.live_owner(&mut inner, name).ok_or(DriverError::NotFound)?;
        inner.texts.get(name.as_str()).cloned().ok_or(DriverError::NotFound)
    }

    async fn update_text(&self, name: &Name, text: &str) -> Result<(), DriverError> {
        self.set_text(name, text).await
    }

    async fn delete_text(&self, name: &Name) -> Result<(), DriverError> {
        let mut inner = self.lock();
        self.live_owner(&mut inner, name);
        inner.texts.remove(name.as_str());
        Ok(())
    }

    async fn set_cname(&self, name: &Name, cname: &str) -> Result<(), DriverError> {
        let mut inner = self.lock();
        self.live_owner(&mut inner, name).ok_or(DriverError::NotFound)?;
        inner.cnames.insert(name.as_str().to_owned(), cname.to_owned());
        Ok(())
    }

    async fn get_cname(&self, name: &Name) -> Result<String, DriverError> {
        let mut inner = self.lock();
        self.live_owner(&mut inner, name).ok_or(DriverError::NotFound)?;
        inner.cnames.get(name.as_str()).cloned().ok_or(DriverError::NotFound)
    }

    async fn update_cname(&self, name: &Name, cname: &str) -> Result<(), DriverError> {
        self.set_cname(name, cname).await
    }

    async fn delete_cname(&self, name: &Name) -> Result<(), DriverError> {
        let mut inner = self.lock();
        self.live_owner(&mut inner, name);
        inner.cnames.remove(name.as_str());
        Ok(())
    }

    async fn get_token(&self, name: &Name) -> Result<String, DriverError> {
        let mut inner = self.lock();
        let entry = live_entry(&mut inner, name.as_str()).ok_or(DriverError::NotFound)?;
        Ok(entry.token_origin.clone())
    }

    async fn get_token_count(&self) -> Result<u64, DriverError> {
        let mut inner = self.lock();
        let keys: Vec<String> = inner.names.keys().cloned().collect();
        for key in keys {
            live_entry(&mut inner, &key);
        }
        Ok(inner.names.len() as u64)
    }

    async fn check_frozen(&self, slug: &str) -> Result<bool, DriverError> {
        let mut inner = self.lock();
        let expired = inner
            .frozen
            .get(slug)
            .is_some_and(|f| Utc::now() > f.expires_at);
        if expired {
            inner.frozen.remove(slug);
        }
        Ok(inner.frozen.contains_key(slug))
    }

    async fn reserve_frozen(&self, slug: &str) -> Result<(), DriverError> {
        let mut inner = self.lock();
        inner.frozen.insert(
            slug.to_owned(),
            FrozenSlot {
                slug: slug.to_owned(),
                expires_at: Utc::now() + crate::model::default_ttl(),
            },
        );
        Ok(())
    }

    async fn create_token(&self, name: &Name, origin: &str) -> Result<(), DriverError> {
        let mut inner = self.lock();
        if inner.names.contains_key(name.as_str()) {
            return Err(DriverError::Exists);
        }
        inner.names.insert(
            name.as_str().to_owned(),
            Entry {
                bundle: Bundle {
                    hosts: BTreeSet::new(),
                    sub_domains: std::collections::BTreeMap::new(),
                    text: None,
                    cname: None,
                },
                lease: Lease::new(crate::model::default_ttl()),
                token_origin: origin.to_owned(),
            },
        );
        Ok(())
    }

    async fn reap_expired(&self) -> Result<ReapOutcome, DriverError> {
        let mut inner = self.lock();
        let expired_names: Vec<String> = inner
            .names
            .iter()
            .filter(|(_, e)| e.lease.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired_names {
            inner.names.remove(key);
        }
        inner.texts.retain(|leaf, _| !expired_names.iter().any(|n| leaf == n || leaf.ends_with(&format!(".{n}"))));
        inner.cnames.retain(|leaf, _| !expired_names.iter().any(|n| leaf == n || leaf.ends_with(&format!(".{n}"))));
        let expired_frozen: Vec<String> = inner
            .frozen
            .iter()
            .filter(|(_, f)| Utc::now() > f.expires_at)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired_frozen {
            inner.frozen.remove(key);
        }
        Ok(ReapOutcome {
            names_deleted: expired_names.len(),
            frozen_deleted: expired_frozen.len(),
            failures: 0,
        })
    }
}
