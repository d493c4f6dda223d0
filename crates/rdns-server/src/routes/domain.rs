//! `/v1/domain[/{fqdn}]` routes: allocation, read, update, renew, delete,
//! translated onto axum extractors from the gorilla/mux handler shape the
//! HTTP surface below mirrors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rdns_storage::{Bundle, BundleWithTtl, Name};

use crate::error::AppError;
use crate::routes::Envelope;
use crate::state::AppState;

/// Wire shape for a domain record.
#[derive(Debug, Serialize)]
pub struct Domain {
    pub fqdn: String,
    pub hosts: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub subdomain: BTreeMap<String, BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl Domain {
    fn from_bundle(name: &Name, with_ttl: BundleWithTtl) -> Self {
        Self {
            fqdn: name.as_str().to_owned(),
            hosts: with_ttl.bundle.hosts,
            subdomain: with_ttl.bundle.sub_domains,
            text: with_ttl.bundle.text,
            cname: with_ttl.bundle.cname,
            expiration: Some(with_ttl.expires_at),
        }
    }
}

/// Request body for `POST`/`PUT /v1/domain[/{fqdn}]`.
#[derive(Debug, Deserialize)]
pub struct DomainOptions {
    #[serde(default)]
    pub hosts: BTreeSet<String>,
    #[serde(default)]
    pub subdomain: BTreeMap<String, BTreeSet<String>>,
}

impl From<DomainOptions> for Bundle {
    fn from(opts: DomainOptions) -> Self {
        Self {
            hosts: opts.hosts,
            sub_domains: opts.subdomain,
            text: None,
            cname: None,
        }
    }
}

pub fn open_router() -> Router<Arc<AppState>> {
    Router::new().route("/v1/domain/{fqdn}", get(get_domain))
}

pub fn mutating_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/domain", post(create_domain))
        .route("/v1/domain/{fqdn}", put(update_domain).delete(delete_domain))
        .route("/v1/domain/{fqdn}/renew", put(renew_domain))
}

async fn create_domain(
    State(state): State<Arc<AppState>>,
    Json(opts): Json<DomainOptions>,
) -> Result<Response, AppError> {
    let alloc = state.engine.allocate(opts.into()).await?;
    let domain = Domain {
        fqdn: alloc.name.as_str().to_owned(),
        hosts: alloc.bundle.hosts,
        subdomain: alloc.bundle.sub_domains,
        text: alloc.bundle.text,
        cname: alloc.bundle.cname,
        expiration: Some(alloc.expires_at),
    };
    Ok(Json(Envelope::ok_with_token(domain, alloc.token)).into_response())
}

/// One deliberate quirk: a `GET` of an absent Name is still HTTP 200, with
/// the not-found text carried in `msg` instead of `data`.
async fn get_domain(State(state): State<Arc<AppState>>, Path(fqdn): Path<String>) -> Response {
    let name = match state.engine.parse_name(&fqdn) {
        Ok(name) => name,
        Err(err) => return Json(Envelope::<Domain>::not_found_but_200(err.to_string())).into_response(),
    };
    match state.engine.get(&name).await {
        Ok(with_ttl) => Json(Envelope::ok(Domain::from_bundle(&name, with_ttl))).into_response(),
        Err(err) => Json(Envelope::<Domain>::not_found_but_200(err.to_string())).into_response(),
    }
}

async fn update_domain(
    State(state): State<Arc<AppState>>,
    Path(fqdn): Path<String>,
    Json(opts): Json<DomainOptions>,
) -> Result<Response, AppError> {
    let name = state.engine.parse_name(&fqdn)?;
    let updated = state.engine.update(&name, opts.into()).await?;
    Ok(Json(Envelope::ok(Domain::from_bundle(&name, updated))).into_response())
}

async fn renew_domain(State(state): State<Arc<AppState>>, Path(fqdn): Path<String>) -> Result<Response, AppError> {
    let name = state.engine.parse_name(&fqdn)?;
    state.engine.renew(&name).await?;
    let with_ttl = state.engine.get(&name).await?;
    Ok(Json(Envelope::ok(Domain::from_bundle(&name, with_ttl))).into_response())
}

async fn delete_domain(State(state): State<Arc<AppState>>, Path(fqdn): Path<String>) -> Result<Response, AppError> {
    let name = state.engine.parse_name(&fqdn)?;
    state.engine.delete(&name).await?;
    Ok(Json(Envelope::<Domain>::empty()).into_response())
}
