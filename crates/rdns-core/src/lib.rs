//! Core engine for the RDNS control plane.
//!
//! Holds the allocation/update/renew/delete protocol ([`engine::Engine`])
//! and the slug/token generation utilities it depends on
//! ([`rand_token`]). This crate depends on `rdns-storage` for the data
//! model and the `DnsDriver` trait and knows nothing about HTTP, config,
//! or process bring-up — those live in `rdns-server`.

pub mod engine;
pub mod error;
pub mod rand_token;

pub use engine::{Allocation, Engine};
pub use error::EngineError;
