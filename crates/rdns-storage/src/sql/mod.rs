//! Managed-DNS + SQL driver: a `DnsDriver` backed by Postgres bookkeeping
//! tables plus an external [`provider::DnsProvider`] that owns the actual
//! resource records.

mod driver;
mod provider;
#[cfg(feature = "route53-backend")]
mod route53;
mod schema;

pub use driver::SqlDriver;
pub use provider::{encode_wildcard, DnsProvider, InMemoryProvider, RrSet};
#[cfg(feature = "route53-backend")]
pub use route53::Route53Provider;
pub use schema::{anchor_fqdn, CREATE_TABLES};
