//! `POST /v1/migrate/{record,frozen,token}`: bulk import used when
//! switching the backing driver (KV ↔ SQL) — each endpoint takes a
//! batch and writes it straight through the engine's import primitives
//! rather than the normal allocation protocol, since the Names already
//! exist in the source driver.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::routes::Envelope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordEntry {
    pub fqdn: String,
    #[serde(default)]
    pub hosts: BTreeSet<String>,
    #[serde(default)]
    pub subdomain: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub cname: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FrozenEntry {
    pub slug: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenEntry {
    pub fqdn: String,
    pub origin: String,
}

#[derive(Debug, Serialize)]
struct MigrateSummary {
    imported: usize,
    failed: usize,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/migrate/record", post(migrate_record))
        .route("/v1/migrate/frozen", post(migrate_frozen))
        .route("/v1/migrate/token", post(migrate_token))
}

async fn migrate_record(
    State(state): State<Arc<AppState>>,
    Json(entries): Json<Vec<RecordEntry>>,
) -> Result<Json<Envelope<MigrateSummary>>, AppError> {
    let mut imported = 0;
    let mut failed = 0;
    for entry in entries {
        let Ok(name) = state.engine.parse_name(&entry.fqdn) else {
            failed += 1;
            continue;
        };
        let bundle = rdns_storage::Bundle {
            hosts: entry.hosts,
            sub_domains: entry.subdomain,
            text: entry.text,
            cname: entry.cname,
        };
        match state.engine.import_record(&name, bundle).await {
            Ok(()) => imported += 1,
            Err(_) => failed += 1,
        }
    }
    Ok(Json(Envelope::ok(MigrateSummary { imported, failed })))
}

async fn migrate_frozen(
    State(state): State<Arc<AppState>>,
    Json(entries): Json<Vec<FrozenEntry>>,
) -> Result<Json<Envelope<MigrateSummary>>, AppError> {
    let mut imported = 0;
    let mut failed = 0;
    for entry in entries {
        match state.engine.import_frozen(&entry.slug).await {
            Ok(()) => imported += 1,
            Err(_) => failed += 1,
        }
    }
    Ok(Json(Envelope::ok(MigrateSummary { imported, failed })))
}

async fn migrate_token(
    State(state): State<Arc<AppState>>,
    Json(entries): Json<Vec<TokenEntry>>,
) -> Result<Json<Envelope<MigrateSummary>>, AppError> {
    let mut imported = 0;
    let mut failed = 0;
    for entry in entries {
        let Ok(name) = state.engine.parse_name(&entry.fqdn) else {
            failed += 1;
            continue;
        };
        match state.engine.import_token(&name, &entry.origin).await {
            Ok(()) => imported += 1,
            Err(_) => failed += 1,
        }
    }
    Ok(Json(Envelope::ok(MigrateSummary { imported, failed })))
}
