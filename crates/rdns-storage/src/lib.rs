//! Storage layer for the RDNS control plane.
//!
//! This crate owns the data model ([`model`]) and the [`driver::DnsDriver`]
//! seam every backing store implements — the native-KV driver
//! (`kv`, feature `etcd-backend`) and the managed-DNS+SQL driver (`sql`,
//! always available since it depends only on `sqlx`). [`memory::MemoryDriver`]
//! is a third, in-process implementation used by `rdns-core`'s engine tests
//! and the server's route tests; it carries no feature gate.
//!
//! The trait and the data model live in the same crate rather than split
//! across `rdns-core`/`rdns-storage` because a driver's method signatures
//! are expressed in terms of `Name`/`Bundle`/`Lease` — putting the trait in
//! `rdns-core` while the model stayed here would make the two crates depend
//! on each other. `rdns-core` depends on this crate, not the reverse, which
//! also matches `zvault-core -> zvault-storage`'s own direction.

pub mod driver;
pub mod error;
pub mod memory;
pub mod model;
pub mod sql;

#[cfg(feature = "etcd-backend")]
pub mod kv;

pub use driver::{DnsDriver, ReapOutcome};
pub use error::DriverError;
pub use memory::MemoryDriver;
pub use model::{Bundle, BundleWithTtl, FrozenSlot, Lease, Name, Token};

#[cfg(feature = "etcd-backend")]
pub use kv::KvDriver;
