//! Server configuration for the RDNS control plane.
//!
//! Every flag below is also an environment variable, declared once via
//! `clap`'s `env` feature the way `zvault-cli`'s `Cli` struct does, rather
//! than reading `std::env::var` by hand — `rdns-server` ships its own
//! binary (no separate CLI crate to share the flags with), so
//! `clap::Parser` both parses argv and documents `--help` for free.

use std::net::SocketAddr;

use chrono::Duration;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverKind {
    /// Native-TTL key-value driver (etcd).
    Kv,
    /// Managed-DNS-provider + SQL driver (Postgres bookkeeping, external provider).
    Sql,
}

#[derive(Debug, Parser)]
#[command(name = "rdns-server", about = "Multi-tenant Rancher DNS control plane")]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, env = "RDNS_LISTEN", default_value = ":9333")]
    pub listen: String,

    /// How long a released slug stays quarantined before reuse, parsed by
    /// `humantime` (e.g. `2160h`).
    #[arg(long, env = "RDNS_FROZEN", default_value = "2160h")]
    pub frozen: String,

    /// Storage driver to run against.
    #[arg(long, value_enum, env = "RDNS_DRIVER", default_value = "kv")]
    pub driver: DriverKind,

    /// Zone every allocated Name is a descendant of, e.g. `lb.rancher.cloud`.
    #[arg(long, env = "RDNS_DOMAIN", default_value = "lb.rancher.cloud")]
    pub domain: String,

    /// Lease TTL, parsed by `humantime` (e.g. `240h`).
    #[arg(long, env = "RDNS_TTL", default_value = "240h")]
    pub ttl: String,

    /// Comma-separated etcd endpoints (`--driver kv`).
    #[arg(long, env = "RDNS_KV_ENDPOINTS", default_value = "http://127.0.0.1:2379")]
    pub kv_endpoints: String,

    /// Key prefix under which every etcd key for this zone is stored.
    #[arg(long, env = "RDNS_KV_PREFIX", default_value = "rdns")]
    pub kv_prefix: String,

    /// Postgres DSN for the bookkeeping tables (`--driver sql`).
    #[arg(long, env = "RDNS_DATABASE_URL", default_value = "postgres://localhost/rdns")]
    pub database_url: String,

    /// Route 53 hosted zone id the managed-DNS provider writes to
    /// (`--driver sql`, feature `route53-backend`). AWS credentials are
    /// read from the process's default credential chain. When unset, the
    /// SQL driver falls back to an in-memory provider stub — fine for
    /// development, not for production use.
    #[arg(long, env = "RDNS_ROUTE53_ZONE_ID")]
    pub route53_zone_id: Option<String>,

    /// Log filter passed to `tracing_subscriber::EnvFilter` (overridden by
    /// `RUST_LOG` when set).
    #[arg(long, env = "RDNS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Resolved configuration, parsed from [`Cli`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub frozen_ttl: Duration,
    pub driver: DriverKind,
    pub domain: String,
    pub ttl: Duration,
    pub kv_endpoints: Vec<String>,
    pub kv_prefix: String,
    pub database_url: String,
    pub route53_zone_id: Option<String>,
    pub log_level: String,
}

impl ServerConfig {
    /// Parse CLI flags / environment variables into a resolved config.
    ///
    /// # Errors
    ///
    /// Returns an error string if `listen` is not a valid socket address or
    /// `frozen`/`ttl` is not a valid `humantime` duration.
    pub fn load() -> Result<Self, String> {
        let cli = Cli::parse();
        Self::from_cli(cli)
    }

    fn from_cli(cli: Cli) -> Result<Self, String> {
        let listen = match cli.listen.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => cli.listen.clone(),
        };
        let bind_addr: SocketAddr = listen
            .parse()
            .map_err(|err| format!("invalid --listen address {listen:?}: {err}"))?;

        let frozen_ttl = humantime::parse_duration(&cli.frozen)
            .map_err(|err| format!("invalid --frozen duration {:?}: {err}", cli.frozen))
            .and_then(|d| Duration::from_std(d).map_err(|err| err.to_string()))?;

        let ttl = humantime::parse_duration(&cli.ttl)
            .map_err(|err| format!("invalid --ttl duration {:?}: {err}", cli.ttl))
            .and_then(|d| Duration::from_std(d).map_err(|err| err.to_string()))?;

        let kv_endpoints = cli
            .kv_endpoints
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self {
            bind_addr,
            frozen_ttl,
            driver: cli.driver,
            domain: cli.domain,
            ttl,
            kv_endpoints,
            kv_prefix: cli.kv_prefix,
            database_url: cli.database_url,
            route53_zone_id: cli.route53_zone_id,
            log_level: cli.log_level,
        })
    }
}
