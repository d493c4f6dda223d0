//! Managed-DNS + SQL driver: bookkeeping tables in Postgres (see
//! `super::schema`) plus an external [`super::provider::DnsProvider`] that
//! owns the actual resource records, wired together through the wildcard
//! encoding in `super::provider`.
//!
//! TTL is emulated in SQL: expiration is `token.created_on + configured
//! ttl`, recomputed with plain arithmetic every time it's needed rather than
//! round-tripped through a formatted-duration string (see `DESIGN.md` for
//! why that round-trip is avoided here). Renewal rewrites
//! `token.created_on`/`frozen_prefix.created_on` to "now".
//!
//! Atomicity: an UPSERT against the provider and the SQL write are not one
//! transaction. If the provider call succeeds and the SQL write then fails,
//! the row is left stale and the reaper (`reap_expired`) reconciles it on
//! its next sweep — this is not compensated for synchronously; see
//! `DESIGN.md` for the accepted tradeoff.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::driver::{DnsDriver, ReapOutcome};
use crate::error::DriverError;
use crate::model::{Bundle, BundleWithTtl, Name};

use super::provider::{encode_wildcard, DnsProvider, RrSet};
use super::schema::anchor_fqdn;

pub struct SqlDriver {
    pool: PgPool,
    provider: Arc<dyn DnsProvider>,
    zone: String,
    ttl: Duration,
    frozen_ttl: Duration,
}

impl SqlDriver {
    /// Connect to `database_url`, running `CREATE TABLE IF NOT EXISTS` for
    /// the schema in `super::schema`, and create the pool with the §5
    /// limits (2000 max / 1000 min idle).
    pub async fn connect(
        database_url: &str,
        provider: Arc<dyn DnsProvider>,
        zone: String,
        ttl: Duration,
        frozen_ttl: Duration,
    ) -> Result<Self, DriverError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2000)
            .min_connections(1000)
            .connect(database_url)
            .await?;
        sqlx::raw_sql(super::schema::CREATE_TABLES)
            .execute(&pool)
            .await?;
        Ok(Self {
            pool,
            provider,
            zone,
            ttl,
            frozen_ttl,
        })
    }

    #[must_use]
    pub fn with_pool(
        pool: PgPool,
        provider: Arc<dyn DnsProvider>,
        zone: String,
        ttl: Duration,
        frozen_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            provider,
            zone,
            ttl,
            frozen_ttl,
        }
    }

    async fn token_row(&self, name: &Name) -> Result<(i64, DateTime<Utc>), DriverError> {
        let row: Option<(i64, DateTime<Utc>)> =
            sqlx::query_as("SELECT id, created_on FROM token WHERE fqdn = $1")
                .bind(name.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or(DriverError::NotFound)
    }

    async fn anchor_row_id(&self, name: &Name, tid: i64) -> Result<i64, DriverError> {
        let anchor = anchor_fqdn(name.as_str());
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM record_a WHERE fqdn = $1 AND tid = $2")
            .bind(&anchor)
            .bind(tid)
            .fetch_optional(&self.pool)
            .await?;
        if let Some((id,)) = row {
            return Ok(id);
        }
        let now = Utc::now();
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO record_a (fqdn, content, created_on, updated_on, tid) VALUES ($1, '', $2, $2, $3) RETURNING id",
        )
        .bind(&anchor)
        .bind(now)
        .bind(tid)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl DnsDriver for SqlDriver {
    async fn get(&self, name: &Name) -> Result<BundleWithTtl, DriverError> {
        let (tid, created_on) = self.token_row(name).await?;
        let expires_at = created_on + self.ttl;
        if Utc::now() > expires_at {
            return Err(DriverError::NotFound);
        }

        let wildcard = encode_wildcard(name.as_str());
        let hosts = self.provider.list(&wildcard, "A").await?;

        let prefixes: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT s.fqdn FROM sub_record_a s JOIN record_a r ON s.pid = r.id WHERE r.tid = $1",
        )
        .bind(tid)
        .fetch_all(&self.pool)
        .await?;

        let mut sub_domains = std::collections::BTreeMap::new();
        for (sub_fqdn,) in prefixes {
            let prefix = sub_fqdn
                .strip_suffix(&format!(".{name}"))
                .unwrap_or(&sub_fqdn)
                .to_owned();
            let sub_hosts = self.provider.list(&sub_fqdn, "A").await?;
            sub_domains.insert(prefix, sub_hosts);
        }

        let text = self.get_text(name).await.ok();
        let cname = self.get_cname(name).await.ok();

        Ok(BundleWithTtl {
            bundle: Bundle {
                hosts,
                sub_domains,
                text,
                cname,
            },
            expires_at,
        })
    }

    async fn set(&self, name: &Name, bundle: &Bundle, existing: bool) -> Result<(), DriverError> {
        let (tid, _) = self.token_row(name).await?;
        let _ = existing;
        let anchor_id = self.anchor_row_id(name, tid).await?;

        let wildcard = encode_wildcard(name.as_str());
        if bundle.hosts.is_empty() {
            self.provider.delete(&wildcard, "A").await?;
        } else {
            self.provider
                .upsert(&RrSet {
                    name: wildcard.clone(),
                    record_type: "A",
                    values: bundle.hosts.clone(),
                })
                .await?;
        }

        let existing_prefixes: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT fqdn FROM sub_record_a WHERE pid = $1",
        )
        .bind(anchor_id)
        .fetch_all(&self.pool)
        .await?;

        for (sub_fqdn,) in &existing_prefixes {
            let prefix = sub_fqdn
                .strip_suffix(&format!(".{name}"))
                .unwrap_or(sub_fqdn);
            if !bundle.sub_domains.contains_key(prefix) {
                self.provider.delete(sub_fqdn, "A").await?;
                sqlx::query("DELETE FROM sub_record_a WHERE fqdn = $1 AND pid = $2")
                    .bind(sub_fqdn)
                    .bind(anchor_id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        let now = Utc::now();
        for (prefix, hosts) in &bundle.sub_domains {
            let sub_fqdn = format!("{prefix}.{name}");
            if hosts.is_empty() {
                self.provider.delete(&sub_fqdn, "A").await?;
            } else {
                self.provider
                    .upsert(&RrSet {
                        name: sub_fqdn.clone(),
                        record_type: "A",
                        values: hosts.clone(),
                    })
                    .await?;
            }

            let present: Option<(i64,)> =
                sqlx::query_as("SELECT id FROM sub_record_a WHERE fqdn = $1 AND pid = $2")
                    .bind(&sub_fqdn)
                    .bind(anchor_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if present.is_none() {
                sqlx::query(
                    "INSERT INTO sub_record_a (fqdn, content, created_on, updated_on, pid) VALUES ($1, '', $2, $2, $3)",
                )
                .bind(&sub_fqdn)
                .bind(now)
                .bind(anchor_id)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn renew(&self, name: &Name) -> Result<DateTime<Utc>, DriverError> {
        let now = Utc::now();
        let result = sqlx::query("UPDATE token SET created_on = $1 WHERE fqdn = $2")
            .bind(now)
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DriverError::NotFound);
        }
        Ok(now + self.ttl)
    }

    async fn delete(&self, name: &Name) -> Result<(), DriverError> {
        let wildcard = encode_wildcard(name.as_str());
        self.provider.delete(&wildcard, "A").await?;

        if let Ok((tid, _)) = self.token_row(name).await {
            let prefixes: Vec<(String,)> = sqlx::query_as(
                "SELECT DISTINCT s.fqdn FROM sub_record_a s JOIN record_a r ON s.pid = r.id WHERE r.tid = $1",
            )
            .bind(tid)
            .fetch_all(&self.pool)
            .await?;
            for (sub_fqdn,) in prefixes {
                self.provider.delete(&sub_fqdn, "A").await?;
            }
            let _ = self.provider.delete(name.as_str(), "TXT").await;
            let _ = self.provider.delete(name.as_str(), "CNAME").await;
        }

        // ON DELETE CASCADE on record_a/sub_record_a/record_txt/record_cname
        // takes care of the rest of this Name's rows.
        sqlx::query("DELETE FROM token WHERE fqdn = $1")
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_text(&self, name: &Name, text: &str) -> Result<(), DriverError> {
        let owner = name.ancestor_name(&self.zone);
        let (tid, _) = self.token_row(&owner).await?;
        let now = Utc::now();
        self.provider
            .upsert(&RrSet {
                name: name.as_str().to_owned(),
                record_type: "TXT",
                values: BTreeSet::from([text.to_owned()]),
            })
            .await?;
        sqlx::query(
            "INSERT INTO record_txt (fqdn, content, created_on, updated_on, tid) VALUES ($1, $2, $3, $3, $4)
             ON CONFLICT (fqdn) DO UPDATE SET content = EXCLUDED.content, updated_on = EXCLUDED.updated_on",
        )
        .bind(name.as_str())
        .bind(text)
        .bind(now)
        .bind(tid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_text(&self, name: &Name) -> Result<String, DriverError> {
        self.provider
            .list(name.as_str(), "TXT")
            .await?
            .into_iter()
            .next()
            .ok_or(DriverError::NotFound)
    }

    async fn update_text(&self, name: &Name, text: &str) -> Result<(), DriverError> {
        self.get_text(name).await?;
        self.set_text(name, text).await
    }

    async fn delete_text(&self, name: &Name) -> Result<(), DriverError> {
        self.provider.delete(name.as_str(), "TXT").await?;
        sqlx::query("DELETE FROM record_txt WHERE fqdn = $1")
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_cname(&self, name: &Name, cname: &str) -> Result<(), DriverError> {
        let owner = name.ancestor_name(&self.zone);
        let (tid, _) = self.token_row(&owner).await?;
        let now = Utc::now();
        self.provider
            .upsert(&RrSet {
                name: name.as_str().to_owned(),
                record_type: "CNAME",
                values: BTreeSet::from([cname.to_owned()]),
            })
            .await?;
        sqlx::query(
            "INSERT INTO record_cname (fqdn, content, created_on, updated_on, tid) VALUES ($1, $2, $3, $3, $4)
             ON CONFLICT (fqdn) DO UPDATE SET content = EXCLUDED.content, updated_on = EXCLUDED.updated_on",
        )
        .bind(name.as_str())
        .bind(cname)
        .bind(now)
        .bind(tid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_cname(&self, name: &Name) -> Result<String, DriverError> {
        self.provider
            .list(name.as_str(), "CNAME")
            .await?
            .into_iter()
            .next()
            .ok_or(DriverError::NotFound)
    }

    async fn update_cname(&self, name: &Name, cname: &str) -> Result<(), DriverError> {
        self.get_cname(name).await?;
        self.set_cname(name, cname).await
    }

    async fn delete_cname(&self, name: &Name) -> Result<(), DriverError> {
        self.provider.delete(name.as_str(), "CNAME").await?;
        sqlx::query("DELETE FROM record_cname WHERE fqdn = $1")
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_token(&self, name: &Name) -> Result<String, DriverError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT token FROM token WHERE fqdn = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(t,)| t).ok_or(DriverError::NotFound)
    }

    async fn get_token_count(&self) -> Result<u64, DriverError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM token")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    async fn check_frozen(&self, slug: &str) -> Result<bool, DriverError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT prefix FROM frozen_prefix WHERE prefix = $1 AND created_on > $2")
                .bind(slug)
                .bind(Utc::now() - self.frozen_ttl)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn reserve_frozen(&self, slug: &str) -> Result<(), DriverError> {
        sqlx::query(
            "INSERT INTO frozen_prefix (prefix, created_on) VALUES ($1, $2)
             ON CONFLICT (prefix) DO UPDATE SET created_on = EXCLUDED.created_on",
        )
        .bind(slug)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_token(&self, name: &Name, origin: &str) -> Result<(), DriverError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO token (token, fqdn, created_on) VALUES ($1, $2, $3) ON CONFLICT (fqdn) DO NOTHING",
        )
        .bind(origin)
        .bind(name.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DriverError::Exists);
        }
        Ok(())
    }

    /// Sweep expired frozen rows and expired tokens: delete expired frozen
    /// rows, select expired tokens, and for each run the delete flow,
    /// logging per-Name failures without aborting the sweep.
    async fn reap_expired(&self) -> Result<ReapOutcome, DriverError> {
        let frozen_cutoff = Utc::now() - self.frozen_ttl;
        let frozen_result = sqlx::query("DELETE FROM frozen_prefix WHERE created_on <= $1")
            .bind(frozen_cutoff)
            .execute(&self.pool)
            .await?;

        let ttl_cutoff = Utc::now() - self.ttl;
        let expired: Vec<(String,)> = sqlx::query_as("SELECT fqdn FROM token WHERE created_on <= $1")
            .bind(ttl_cutoff)
            .fetch_all(&self.pool)
            .await?;

        let mut names_deleted = 0usize;
        let mut failures = 0usize;
        for (fqdn,) in expired {
            let name = match Name::parse(&fqdn, &self.zone) {
                Ok(n) => n,
                Err(_) => continue,
            };
            match self.delete(&name).await {
                Ok(()) => names_deleted += 1,
                Err(err) => {
                    tracing::warn!(fqdn = %fqdn, error = %err, "reaper: failed to delete expired name");
                    failures += 1;
                }
            }
        }

        Ok(ReapOutcome {
            names_deleted,
            frozen_deleted: frozen_result.rows_affected() as usize,
            failures,
        })
    }
}
