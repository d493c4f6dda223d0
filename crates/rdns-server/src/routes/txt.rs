//! `/v1/domain/{fqdn}/txt` routes: create, read, update, delete the TXT
//! leaf under a Name. Creation is the one mutating route exempt from bearer
//! auth, provided the parent Name already exists
//! (`crate::auth::auth_middleware`).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::routes::Envelope;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct TextRecord {
    fqdn: String,
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct TextOptions {
    pub text: String,
}

pub fn open_router() -> Router<Arc<AppState>> {
    Router::new().route("/v1/domain/{fqdn}/txt", get(get_text))
}

pub fn mutating_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/v1/domain/{fqdn}/txt",
        post(create_text).put(update_text).delete(delete_text),
    )
}

async fn create_text(
    State(state): State<Arc<AppState>>,
    Path(fqdn): Path<String>,
    Json(opts): Json<TextOptions>,
) -> Result<Response, AppError> {
    let name = state.engine.parse_name(&fqdn)?;
    state.engine.set_text(&name, &opts.text).await?;
    Ok(Json(Envelope::ok(TextRecord {
        fqdn: name.as_str().to_owned(),
        text: opts.text,
    }))
    .into_response())
}

async fn get_text(State(state): State<Arc<AppState>>, Path(fqdn): Path<String>) -> Response {
    let name = match state.engine.parse_name(&fqdn) {
        Ok(name) => name,
        Err(err) => return Json(Envelope::<TextRecord>::not_found_but_200(err.to_string())).into_response(),
    };
    match state.engine.get_text(&name).await {
        Ok(text) => Json(Envelope::ok(TextRecord {
            fqdn: name.as_str().to_owned(),
            text,
        }))
        .into_response(),
        Err(err) => Json(Envelope::<TextRecord>::not_found_but_200(err.to_string())).into_response(),
    }
}

async fn update_text(
    State(state): State<Arc<AppState>>,
    Path(fqdn): Path<String>,
    Json(opts): Json<TextOptions>,
) -> Result<Response, AppError> {
    let name = state.engine.parse_name(&fqdn)?;
    state.engine.update_text(&name, &opts.text).await?;
    Ok(Json(Envelope::ok(TextRecord {
        fqdn: name.as_str().to_owned(),
        text: opts.text,
    }))
    .into_response())
}

async fn delete_text(State(state): State<Arc<AppState>>, Path(fqdn): Path<String>) -> Result<Response, AppError> {
    let name = state.engine.parse_name(&fqdn)?;
    state.engine.delete_text(&name).await?;
    Ok(Json(Envelope::<TextRecord>::empty()).into_response())
}
