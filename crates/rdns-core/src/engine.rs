//! Record/lease engine: allocation, update, renewal, and deletion of DNS
//! names under a configured zone.
//!
//! The one piece of business logic shared by both storage drivers: it
//! drives a [`DnsDriver`] trait object and never matches on which
//! implementation it holds, the same shape as `vaultrs-core`'s stores
//! holding an `Arc<Barrier>` rather than a concrete backend.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rdns_storage::{Bundle, BundleWithTtl, DnsDriver, DriverError, Name};
use tracing::warn;

use crate::error::EngineError;
use crate::rand_token::{client_token, generate_slug, generate_token_origin, verify_token};

/// Slug draws attempted before giving up.
const MAX_SLUG_ATTEMPTS: u32 = 100;

/// Record/lease engine, holding the zone this instance serves and the
/// configured lease/frozen TTLs alongside the driver.
pub struct Engine {
    driver: Arc<dyn DnsDriver>,
    zone: String,
}

/// What `Set` returns to the HTTP layer: the bundle plus the bearer token
/// the client must keep (shown once).
#[derive(Debug, Clone)]
pub struct Allocation {
    pub name: Name,
    pub bundle: Bundle,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Engine {
    #[must_use]
    pub fn new(driver: Arc<dyn DnsDriver>, zone: impl Into<String>) -> Self {
        Self {
            driver,
            zone: zone.into(),
        }
    }

    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Parse `fqdn` against this engine's zone.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ValidationFailed`] if `fqdn` is not a valid
    /// descendant Name of the configured zone.
    pub fn parse_name(&self, fqdn: &str) -> Result<Name, EngineError> {
        Name::parse(fqdn, &self.zone).map_err(|err| EngineError::ValidationFailed(err.to_string()))
    }

    /// Allocate a new Name: draw an unused slug, mint a token, write the
    /// bundle, quarantine the slug's eventual release,
    /// and hand back the client-facing bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GenerationExhausted`] if every one of
    /// [`MAX_SLUG_ATTEMPTS`] candidate slugs collided with a live or frozen
    /// name. Returns [`EngineError::Driver`] if any underlying write fails.
    pub async fn allocate(&self, bundle: Bundle) -> Result<Allocation, EngineError> {
        bundle
            .validate()
            .map_err(|err| EngineError::ValidationFailed(err.to_string()))?;
        let name = self.reserve_slug().await?;

        let origin = generate_token_origin();
        self.driver.create_token(&name, &origin).await?;

        if let Err(err) = self.driver.set(&name, &bundle, true).await {
            warn!(name = %name, error = %err, "allocation: failed writing bundle after token creation");
            return Err(err.into());
        }

        self.driver.reserve_frozen(name.slug()).await?;

        let token = client_token(&origin)?;
        let read_back = self.driver.get(&name).await?;
        Ok(Allocation {
            name,
            bundle: read_back.bundle,
            token,
            expires_at: read_back.expires_at,
        })
    }

    async fn reserve_slug(&self) -> Result<Name, EngineError> {
        for _ in 0..MAX_SLUG_ATTEMPTS {
            let slug = generate_slug();
            if self.driver.check_frozen(&slug).await? {
                continue;
            }
            let name = Name::from_slug(&slug, &self.zone);
            match self.driver.get(&name).await {
                Err(DriverError::NotFound) => return Ok(name),
                Ok(_) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(EngineError::GenerationExhausted)
    }

    /// Read the current bundle plus remaining TTL.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if `name` has no record.
    pub async fn get(&self, name: &Name) -> Result<BundleWithTtl, EngineError> {
        self.driver.get(name).await.map_err(|err| match err {
            DriverError::NotFound => EngineError::NotFound,
            other => other.into(),
        })
    }

    /// Rewrite the root, diff-sync hosts and the sub-prefix map, and
    /// restart the quarantine clock.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if `name` has no existing record.
    pub async fn update(&self, name: &Name, bundle: Bundle) -> Result<BundleWithTtl, EngineError> {
        bundle
            .validate()
            .map_err(|err| EngineError::ValidationFailed(err.to_string()))?;
        let current = self.get(name).await?;
        let _ = current;
        self.driver
            .set(name, &bundle, true)
            .await
            .map_err(|err| match err {
                DriverError::NotFound => EngineError::NotFound,
                other => other.into(),
            })?;
        self.driver.reserve_frozen(name.slug()).await?;
        self.get(name).await
    }

    /// Extend the lease on every key bound to `name` and restart the
    /// quarantine clock.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if `name` has no existing token.
    pub async fn renew(&self, name: &Name) -> Result<DateTime<Utc>, EngineError> {
        let _ = self.driver.get_token(name).await.map_err(|err| match err {
            DriverError::NotFound => EngineError::NotFound,
            other => other.into(),
        })?;
        let expires_at = self.driver.renew(name).await?;
        self.driver.reserve_frozen(name.slug()).await?;
        Ok(expires_at)
    }

    /// Remove the wildcard/root, every sub-prefix, and the token. The
    /// frozen slot is left alive so
    /// the slug stays quarantined for its configured duration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Driver`] if the underlying delete fails.
    pub async fn delete(&self, name: &Name) -> Result<(), EngineError> {
        self.driver.delete(name).await?;
        Ok(())
    }

    /// TXT leaves may only be attached to a descendant label of an
    /// allocated Name (Invariant 5: `depth(name) > depth(zone) + 1`, i.e.
    /// `name.depth(&self.zone) > 1`), enforced once here rather than
    /// duplicated per driver — the same place `Bundle::validate`'s
    /// underscore rule lives.
    fn validate_txt_depth(&self, name: &Name) -> Result<(), EngineError> {
        if name.depth(&self.zone) <= 1 {
            return Err(EngineError::ValidationFailed(format!(
                "{name} is not a valid TXT leaf: must be nested under an allocated name"
            )));
        }
        Ok(())
    }

    pub async fn set_text(&self, name: &Name, text: &str) -> Result<(), EngineError> {
        self.validate_txt_depth(name)?;
        self.driver.set_text(name, text).await?;
        Ok(())
    }

    pub async fn get_text(&self, name: &Name) -> Result<String, EngineError> {
        self.validate_txt_depth(name)?;
        self.driver.get_text(name).await.map_err(|err| match err {
            DriverError::NotFound => EngineError::NotFound,
            other => other.into(),
        })
    }

    pub async fn update_text(&self, name: &Name, text: &str) -> Result<(), EngineError> {
        self.validate_txt_depth(name)?;
        self.driver.update_text(name, text).await.map_err(|err| match err {
            DriverError::NotFound => EngineError::NotFound,
            other => other.into(),
        })
    }

    pub async fn delete_text(&self, name: &Name) -> Result<(), EngineError> {
        self.validate_txt_depth(name)?;
        self.driver.delete_text(name).await?;
        Ok(())
    }

    pub async fn set_cname(&self, name: &Name, cname: &str) -> Result<(), EngineError> {
        self.driver.set_cname(name, cname).await?;
        Ok(())
    }

    pub async fn get_cname(&self, name: &Name) -> Result<String, EngineError> {
        self.driver.get_cname(name).await.map_err(|err| match err {
            DriverError::NotFound => EngineError::NotFound,
            other => other.into(),
        })
    }

    pub async fn update_cname(&self, name: &Name, cname: &str) -> Result<(), EngineError> {
        self.driver.update_cname(name, cname).await.map_err(|err| match err {
            DriverError::NotFound => EngineError::NotFound,
            other => other.into(),
        })
    }

    pub async fn delete_cname(&self, name: &Name) -> Result<(), EngineError> {
        self.driver.delete_cname(name).await?;
        Ok(())
    }

    /// Fetch the stored origin for `name` and compare it against the
    /// client-presented bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`] on a missing token or mismatch.
    pub async fn authenticate(&self, name: &Name, presented: &str) -> Result<(), EngineError> {
        let origin = self
            .driver
            .get_token(name)
            .await
            .map_err(|_| EngineError::Unauthorized)?;
        if verify_token(&origin, presented) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized)
        }
    }

    /// Sample the live-name count for the metrics emitter.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Driver`] if the underlying count fails.
    pub async fn token_count(&self) -> Result<u64, EngineError> {
        Ok(self.driver.get_token_count().await?)
    }

    /// Run one reaper sweep; a no-op for drivers that expire keys
    /// natively.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Driver`] if the sweep itself fails outright
    /// (individual Name failures are counted in the returned outcome, not
    /// surfaced as an `Err`).
    pub async fn reap(&self) -> Result<rdns_storage::ReapOutcome, EngineError> {
        Ok(self.driver.reap_expired().await?)
    }

    /// Bulk-import one record during a driver switch (`POST
    /// /v1/migrate/record`): write the bundle directly, bypassing slug
    /// generation, since the Name is already assigned in the source driver.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Driver`] if the underlying write fails.
    pub async fn import_record(&self, name: &Name, bundle: Bundle) -> Result<(), EngineError> {
        match self.driver.set(name, &bundle, false).await {
            Ok(()) | Err(DriverError::Exists) => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    /// Bulk-import one frozen slot (`POST /v1/migrate/frozen`).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Driver`] if the underlying write fails.
    pub async fn import_frozen(&self, slug: &str) -> Result<(), EngineError> {
        self.driver.reserve_frozen(slug).await?;
        Ok(())
    }

    /// Bulk-import one token origin (`POST /v1/migrate/token`).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Driver`] if the underlying write fails.
    pub async fn import_token(&self, name: &Name, origin: &str) -> Result<(), EngineError> {
        match self.driver.create_token(name, origin).await {
            Ok(()) | Err(DriverError::Exists) => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    /// `BTreeSet<String>` diff helper used by callers reconciling a
    /// caller-supplied host set against a previously stored one, preserving
    /// set-union semantics under concurrent writers.
    #[must_use]
    pub fn diff(current: &BTreeSet<String>, desired: &BTreeSet<String>) -> (BTreeSet<String>, BTreeSet<String>) {
        let to_add: BTreeSet<String> = desired.difference(current).cloned().collect();
        let to_remove: BTreeSet<String> = current.difference(desired).cloned().collect();
        (to_add, to_remove)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("zone", &self.zone).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rdns_storage::MemoryDriver;
    use std::collections::BTreeMap;

    fn engine() -> Engine {
        Engine::new(Arc::new(MemoryDriver::new("lb.rancher.cloud")), "lb.rancher.cloud")
    }

    fn bundle_with_hosts(hosts: &[&str]) -> Bundle {
        Bundle {
            hosts: hosts.iter().map(|h| (*h).to_owned()).collect(),
            sub_domains: BTreeMap::new(),
            text: None,
            cname: None,
        }
    }

    #[tokio::test]
    async fn allocate_then_get_round_trips() {
        let engine = engine();
        let alloc = engine
            .allocate(bundle_with_hosts(&["1.2.3.4"]))
            .await
            .expect("allocation should succeed");

        assert_eq!(alloc.bundle.hosts.len(), 1);
        assert!(alloc.name.as_str().ends_with("lb.rancher.cloud"));

        let fetched = engine.get(&alloc.name).await.expect("get should succeed");
        assert_eq!(fetched.bundle.hosts, alloc.bundle.hosts);
    }

    #[tokio::test]
    async fn allocate_issues_a_verifiable_token() {
        let engine = engine();
        let alloc = engine
            .allocate(bundle_with_hosts(&["1.2.3.4"]))
            .await
            .expect("allocation should succeed");

        engine
            .authenticate(&alloc.name, &alloc.token)
            .await
            .expect("freshly issued token should authenticate");

        let err = engine
            .authenticate(&alloc.name, "not-the-token")
            .await
            .expect_err("wrong token should be rejected");
        assert!(matches!(err, EngineError::Unauthorized));
    }

    #[tokio::test]
    async fn update_replaces_the_host_set() {
        let engine = engine();
        let alloc = engine
            .allocate(bundle_with_hosts(&["1.1.1.1"]))
            .await
            .expect("allocation should succeed");

        let updated = engine
            .update(&alloc.name, bundle_with_hosts(&["2.2.2.2", "3.3.3.3"]))
            .await
            .expect("update should succeed");
        assert_eq!(updated.bundle.hosts.len(), 2);
        assert!(!updated.bundle.hosts.contains("1.1.1.1"));
    }

    #[tokio::test]
    async fn update_on_absent_name_is_not_found() {
        let engine = engine();
        let ghost = Name::from_slug("ghost1", "lb.rancher.cloud");
        let err = engine
            .update(&ghost, bundle_with_hosts(&["1.1.1.1"]))
            .await
            .expect_err("update on a never-allocated name should fail");
        assert!(matches!(err, EngineError::NotFound));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let engine = engine();
        let alloc = engine
            .allocate(bundle_with_hosts(&["9.9.9.9"]))
            .await
            .expect("allocation should succeed");
        engine.delete(&alloc.name).await.expect("delete should succeed");
        let err = engine.get(&alloc.name).await.expect_err("deleted name should 404");
        assert!(matches!(err, EngineError::NotFound));
    }

    #[tokio::test]
    async fn text_and_cname_leaves_round_trip() {
        let engine = engine();
        let alloc = engine
            .allocate(bundle_with_hosts(&["1.1.1.1"]))
            .await
            .expect("allocation should succeed");

        let txt_leaf = Name::parse(&format!("_acme-challenge.{}", alloc.name), "lb.rancher.cloud")
            .expect("should parse");
        engine
            .set_text(&txt_leaf, "v=spf1 -all")
            .await
            .expect("set_text should succeed");
        assert_eq!(engine.get_text(&txt_leaf).await.unwrap(), "v=spf1 -all");

        engine
            .set_cname(&alloc.name, "origin.example.com")
            .await
            .expect("set_cname should succeed");
        assert_eq!(engine.get_cname(&alloc.name).await.unwrap(), "origin.example.com");
    }

    #[tokio::test]
    async fn set_text_at_depth_one_is_rejected() {
        let engine = engine();
        let alloc = engine
            .allocate(bundle_with_hosts(&["2.2.2.2"]))
            .await
            .expect("allocation should succeed");

        let err = engine
            .set_text(&alloc.name, "v=spf1 -all")
            .await
            .expect_err("TXT directly on the allocated name should be rejected");
        assert!(matches!(err, EngineError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn renew_extends_the_expiration() {
        let engine = engine();
        let alloc = engine
            .allocate(bundle_with_hosts(&["4.4.4.4"]))
            .await
            .expect("allocation should succeed");
        let before = engine.get(&alloc.name).await.expect("get should succeed").expires_at;

        let renewed = engine.renew(&alloc.name).await.expect("renew should succeed");
        assert!(renewed >= before);
    }

    #[tokio::test]
    async fn renew_on_absent_name_is_not_found() {
        let engine = engine();
        let ghost = Name::from_slug("ghost2", "lb.rancher.cloud");
        let err = engine.renew(&ghost).await.expect_err("renew on a never-allocated name should fail");
        assert!(matches!(err, EngineError::NotFound));
    }

    /// A driver that reports every slug frozen forces `reserve_slug` to
    /// exhaust its retry budget without ever touching the real store.
    struct AlwaysFrozenDriver;

    #[async_trait::async_trait]
    impl DnsDriver for AlwaysFrozenDriver {
        async fn get(&self, _name: &rdns_storage::Name) -> Result<BundleWithTtl, DriverError> {
            Err(DriverError::NotFound)
        }
        async fn set(&self, _name: &rdns_storage::Name, _bundle: &Bundle, _existing: bool) -> Result<(), DriverError> {
            Ok(())
        }
        async fn renew(&self, _name: &rdns_storage::Name) -> Result<DateTime<Utc>, DriverError> {
            Ok(Utc::now())
        }
        async fn delete(&self, _name: &rdns_storage::Name) -> Result<(), DriverError> {
            Ok(())
        }
        async fn set_text(&self, _name: &rdns_storage::Name, _text: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn get_text(&self, _name: &rdns_storage::Name) -> Result<String, DriverError> {
            Err(DriverError::NotFound)
        }
        async fn update_text(&self, _name: &rdns_storage::Name, _text: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn delete_text(&self, _name: &rdns_storage::Name) -> Result<(), DriverError> {
            Ok(())
        }
        async fn set_cname(&self, _name: &rdns_storage::Name, _cname: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn get_cname(&self, _name: &rdns_storage::Name) -> Result<String, DriverError> {
            Err(DriverError::NotFound)
        }
        async fn update_cname(&self, _name: &rdns_storage::Name, _cname: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn delete_cname(&self, _name: &rdns_storage::Name) -> Result<(), DriverError> {
            Ok(())
        }
        async fn get_token(&self, _name: &rdns_storage::Name) -> Result<String, DriverError> {
            Err(DriverError::NotFound)
        }
        async fn get_token_count(&self) -> Result<u64, DriverError> {
            Ok(0)
        }
        async fn check_frozen(&self, _slug: &str) -> Result<bool, DriverError> {
            Ok(true)
        }
        async fn reserve_frozen(&self, _slug: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn create_token(&self, _name: &rdns_storage::Name, _origin: &str) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn allocate_exhausts_retries_when_every_slug_is_frozen() {
        let engine = Engine::new(Arc::new(AlwaysFrozenDriver), "lb.rancher.cloud");
        let err = engine
            .allocate(bundle_with_hosts(&["1.1.1.1"]))
            .await
            .expect_err("every candidate slug is frozen");
        assert!(matches!(err, EngineError::GenerationExhausted));
    }

    #[test]
    fn diff_reports_additions_and_removals() {
        let current: BTreeSet<String> = ["a", "b"].iter().map(|s| (*s).to_owned()).collect();
        let desired: BTreeSet<String> = ["b", "c"].iter().map(|s| (*s).to_owned()).collect();
        let (added, removed) = Engine::diff(&current, &desired);
        assert_eq!(added, ["c".to_owned()].into_iter().collect());
        assert_eq!(removed, ["a".to_owned()].into_iter().collect());
    }
}
