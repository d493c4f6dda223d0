//! `/v1/domain/{fqdn}/cname` routes: create, read, update, delete the
//! CNAME leaf under a Name. Unlike TXT, creation requires the bearer token
//! — only the owner of a Name may point its CNAME leaf elsewhere.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::routes::Envelope;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct CnameRecord {
    fqdn: String,
    cname: String,
}

#[derive(Debug, Deserialize)]
pub struct CnameOptions {
    pub cname: String,
}

pub fn open_router() -> Router<Arc<AppState>> {
    Router::new().route("/v1/domain/{fqdn}/cname", get(get_cname))
}

pub fn mutating_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/v1/domain/{fqdn}/cname",
        axum::routing::post(create_cname).put(update_cname).delete(delete_cname),
    )
}

async fn create_cname(
    State(state): State<Arc<AppState>>,
    Path(fqdn): Path<String>,
    Json(opts): Json<CnameOptions>,
) -> Result<Response, AppError> {
    let name = state.engine.parse_name(&fqdn)?;
    state.engine.set_cname(&name, &opts.cname).await?;
    Ok(Json(Envelope::ok(CnameRecord {
        fqdn: name.as_str().to_owned(),
        cname: opts.cname,
    }))
    .into_response())
}

async fn get_cname(State(state): State<Arc<AppState>>, Path(fqdn): Path<String>) -> Response {
    let name = match state.engine.parse_name(&fqdn) {
        Ok(name) => name,
        Err(err) => return Json(Envelope::<CnameRecord>::not_found_but_200(err.to_string())).into_response(),
    };
    match state.engine.get_cname(&name).await {
        Ok(cname) => Json(Envelope::ok(CnameRecord {
            fqdn: name.as_str().to_owned(),
            cname,
        }))
        .into_response(),
        Err(err) => Json(Envelope::<CnameRecord>::not_found_but_200(err.to_string())).into_response(),
    }
}

async fn update_cname(
    State(state): State<Arc<AppState>>,
    Path(fqdn): Path<String>,
    Json(opts): Json<CnameOptions>,
) -> Result<Response, AppError> {
    let name = state.engine.parse_name(&fqdn)?;
    state.engine.update_cname(&name, &opts.cname).await?;
    Ok(Json(Envelope::ok(CnameRecord {
        fqdn: name.as_str().to_owned(),
        cname: opts.cname,
    }))
    .into_response())
}

async fn delete_cname(State(state): State<Arc<AppState>>, Path(fqdn): Path<String>) -> Result<Response, AppError> {
    let name = state.engine.parse_name(&fqdn)?;
    state.engine.delete_cname(&name).await?;
    Ok(Json(Envelope::<CnameRecord>::empty()).into_response())
}
