//! Canonical record, option, and response shapes for the RDNS control plane.
//!
//! A [`Name`] is a validated fully-qualified label under a configured zone.
//! A [`Bundle`] is the full record set attached to a `Name` — hosts (the
//! wildcard A set), sub-domain A sets, and optional TXT/CNAME leaves. All of
//! it shares one [`Lease`] and one [`Token`] (see `rdns-core::engine`).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// A fully-qualified DNS label validated against a configured zone.
///
/// `slug.zone` — exactly one label longer than the zone itself. Validation
/// happens once, at construction, so every other component can treat a
/// `Name` as already well-formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    /// Parse and validate `fqdn` against `zone`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Validation`] if `fqdn` is not lowercase
    /// alphanumeric-plus-hyphen labels, does not end with `zone`, or is not
    /// strictly longer than `zone` (a bare zone is never a `Name`).
    pub fn parse(fqdn: &str, zone: &str) -> Result<Self, DriverError> {
        let fqdn = fqdn.trim_end_matches('.').to_ascii_lowercase();
        let zone = zone.trim_end_matches('.');

        if !fqdn.ends_with(&format!(".{zone}")) {
            return Err(DriverError::Validation {
                reason: format!("{fqdn} is not a descendant of zone {zone}"),
            });
        }

        if fqdn.split('.').any(|label| {
            label.is_empty()
                || !label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        }) {
            return Err(DriverError::Validation {
                reason: format!("{fqdn} contains an invalid label"),
            });
        }

        Ok(Self(fqdn))
    }

    /// Construct a `Name` for a freshly drawn slug, bypassing re-validation.
    #[must_use]
    pub fn from_slug(slug: &str, zone: &str) -> Self {
        Self(format!("{slug}.{}", zone.trim_end_matches('.')))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of `.`-separated labels.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.0.split('.').count()
    }

    /// Depth of `self` relative to `zone`: 1 identifies the Name itself,
    /// >1 identifies a descendant label usable by TXT/CNAME (Invariant 5).
    #[must_use]
    pub fn depth(&self, zone: &str) -> usize {
        let zone_labels = zone.trim_end_matches('.').split('.').count();
        self.label_count().saturating_sub(zone_labels)
    }

    /// The leading slug label (everything before the first `.`).
    #[must_use]
    pub fn slug(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Walk up from a deeper descendant label to the `Name` itself
    /// (depth == 1), used by the auth middleware to resolve a TXT/CNAME
    /// route back to the owning Name.
    #[must_use]
    pub fn ancestor_name(&self, zone: &str) -> Self {
        let depth = self.depth(zone);
        if depth <= 1 {
            return self.clone();
        }
        let labels: Vec<&str> = self.0.split('.').collect();
        let keep = labels.len() - (depth - 1);
        Self(labels[labels.len() - keep..].join("."))
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The full record set attached to one [`Name`].
///
/// `hosts` and each `sub_domains` value are sets (Invariant 4): duplicates
/// collapse and iteration order is not observable, which is why both are
/// `BTreeSet` rather than `Vec`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Wildcard-A host set (`*.name`).
    pub hosts: BTreeSet<String>,
    /// Per-prefix sub-domain A sets (`prefix.name`). Prefixes must not
    /// start with `_` — that namespace is reserved for TXT leaves.
    pub sub_domains: BTreeMap<String, BTreeSet<String>>,
    /// Optional TXT leaf, shared lease with the parent Name.
    pub text: Option<String>,
    /// Optional CNAME leaf, shared lease with the parent Name.
    pub cname: Option<String>,
}

impl Bundle {
    /// Reject a sub-domain prefix beginning with `_` (Invariant: that
    /// namespace is reserved for TXT leaves).
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Validation`] naming the offending prefix.
    pub fn validate(&self) -> Result<(), DriverError> {
        if let Some(prefix) = self.sub_domains.keys().find(|p| p.starts_with('_')) {
            return Err(DriverError::Validation {
                reason: format!("sub-domain prefix {prefix:?} may not start with '_'"),
            });
        }
        Ok(())
    }
}

/// Per-Name credential. The server stores only `origin`; the client is
/// handed `base64(bcrypt(origin))` and never sees `origin` again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

/// A TTL contract. Expiration is `issued_at + ttl`; default TTL is 240h.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Lease {
    pub ttl: Duration,
    pub issued_at: DateTime<Utc>,
}

impl Lease {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            issued_at: Utc::now(),
        }
    }

    /// `issued_at + ttl`, computed with plain arithmetic.
    ///
    /// The original Go implementation sometimes reconstructs this duration
    /// by formatting it as `"%dns"` and re-parsing it, which loses
    /// precision at very large nanosecond counts. That bug is intentionally
    /// not replicated here; see `DESIGN.md`.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + self.ttl
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }
}

/// Default lease TTL: 240 hours.
#[must_use]
pub fn default_ttl() -> Duration {
    Duration::hours(240)
}

/// A temporary reservation preventing immediate reuse of a released slug
/// (Invariant 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrozenSlot {
    pub slug: String,
    pub expires_at: DateTime<Utc>,
}

/// Remaining TTL plus the bundle, as returned by `DnsDriver::get`.
#[derive(Debug, Clone)]
pub struct BundleWithTtl {
    pub bundle: Bundle,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ZONE: &str = "lb.rancher.cloud";

    #[test]
    fn parse_accepts_a_direct_child_of_the_zone() {
        let name = Name::parse("abc123.lb.rancher.cloud", ZONE).expect("should parse");
        assert_eq!(name.as_str(), "abc123.lb.rancher.cloud");
        assert_eq!(name.slug(), "abc123");
        assert_eq!(name.depth(ZONE), 1);
    }

    #[test]
    fn parse_lowercases_and_strips_trailing_dot() {
        let name = Name::parse("ABC123.LB.RANCHER.CLOUD.", ZONE).expect("should parse");
        assert_eq!(name.as_str(), "abc123.lb.rancher.cloud");
    }

    #[test]
    fn parse_rejects_the_bare_zone() {
        let err = Name::parse(ZONE, ZONE).expect_err("bare zone is never a Name");
        assert!(matches!(err, DriverError::Validation { .. }));
    }

    #[test]
    fn parse_rejects_a_foreign_zone() {
        let err = Name::parse("abc123.example.com", ZONE).expect_err("not a descendant of the zone");
        assert!(matches!(err, DriverError::Validation { .. }));
    }

    #[test]
    fn parse_rejects_an_empty_label() {
        let err = Name::parse("abc123..lb.rancher.cloud", ZONE).expect_err("empty label");
        assert!(matches!(err, DriverError::Validation { .. }));
    }

    #[test]
    fn parse_rejects_a_zone_suffix_without_a_label_boundary() {
        // "xlb.rancher.cloud" ends with the raw string "lb.rancher.cloud" but
        // shares no label boundary with it and is not a descendant.
        let err = Name::parse("xlb.rancher.cloud", ZONE).expect_err("not a descendant of the zone");
        assert!(matches!(err, DriverError::Validation { .. }));
    }

    #[test]
    fn ancestor_name_walks_up_to_depth_one() {
        let leaf = Name::parse("_acme-challenge.sub.abc123.lb.rancher.cloud", ZONE).expect("should parse");
        assert_eq!(leaf.depth(ZONE), 3);
        let owner = leaf.ancestor_name(ZONE);
        assert_eq!(owner.as_str(), "abc123.lb.rancher.cloud");
        assert_eq!(owner.depth(ZONE), 1);
    }

    #[test]
    fn ancestor_name_is_identity_at_depth_one() {
        let name = Name::parse("abc123.lb.rancher.cloud", ZONE).expect("should parse");
        assert_eq!(name.ancestor_name(ZONE), name);
    }

    #[test]
    fn bundle_rejects_an_underscore_prefixed_sub_domain() {
        let mut bundle = Bundle::default();
        bundle
            .sub_domains
            .insert("_reserved".to_owned(), BTreeSet::from(["1.1.1.1".to_owned()]));
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn bundle_accepts_an_ordinary_sub_domain() {
        let mut bundle = Bundle::default();
        bundle
            .sub_domains
            .insert("x1".to_owned(), BTreeSet::from(["1.1.1.1".to_owned()]));
        assert!(bundle.validate().is_ok());
    }

    #[test]
    fn lease_expires_at_is_plain_addition() {
        let lease = Lease::new(Duration::hours(240));
        assert_eq!(lease.expires_at(), lease.issued_at + Duration::hours(240));
    }
}
