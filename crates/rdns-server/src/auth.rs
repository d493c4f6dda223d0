//! Authentication middleware.
//!
//! Extracts the bearer token, resolves the route's `fqdn` path variable up
//! to the owning Name (walking past any deeper TXT/CNAME label), and
//! compares it against the stored origin — following `zvault-server`'s
//! `auth_middleware` shape (extract header → validate → inject context →
//! `next.run`) with the single bcrypt-against-origin check replacing the
//! token-store lookup.
//!
//! Exemptions: `GET`, `/ping`, the initial `POST /v1/domain` allocation,
//! and `POST .../txt` when the parent Name already exists.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Authentication context injected into request extensions by
/// [`auth_middleware`], read back by handlers that need the authenticated
/// Name.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub name: rdns_storage::Name,
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (status, axum::Json(serde_json::json!({"status": status.as_u16(), "msg": msg}))).into_response()
}

pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    let method = req.method().clone();

    if method == Method::GET || path == "/ping" || path == "/v1/domain" {
        return next.run(req).await;
    }

    if path.starts_with("/v1/migrate/") {
        return match bearer_token(&req) {
            Some(_) => next.run(req).await,
            None => error_response(StatusCode::FORBIDDEN, "missing Authorization header"),
        };
    }

    let Some(fqdn) = extract_fqdn_from_path(&path) else {
        return error_response(StatusCode::FORBIDDEN, "must specify the fqdn");
    };

    let name = match state.engine.parse_name(&fqdn) {
        Ok(name) => name,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    let owning_name = name.ancestor_name(state.engine.zone());

    if method == Method::POST && path.ends_with("/txt") {
        // Unauthenticated TXT creation is allowed, but only under a parent
        // Name that already exists.
        if state.engine.get(&owning_name).await.is_ok() {
            req.extensions_mut().insert(AuthContext { name: owning_name });
            return next.run(req).await;
        }
        return error_response(StatusCode::BAD_REQUEST, "parent name does not exist");
    }

    let Some(presented) = bearer_token(&req) else {
        return error_response(StatusCode::FORBIDDEN, "missing Authorization header");
    };

    match state.engine.authenticate(&owning_name, &presented).await {
        Ok(()) => {
            req.extensions_mut().insert(AuthContext { name: owning_name });
            next.run(req).await
        }
        Err(_) => error_response(StatusCode::FORBIDDEN, "forbidden to use"),
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    let header = req.headers().get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    Some(header.trim_start_matches("Bearer ").trim().to_owned())
}

/// Extract the `{fqdn}` path segment (`/v1/domain/<fqdn>...`) without
/// pulling in the route's `Path` extractor, which needs the matched router
/// to already know the segment's name — the middleware runs at the layer
/// above routing, so it parses the raw URI instead.
fn extract_fqdn_from_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/v1/domain/")?;
    let fqdn = rest.split('/').next()?;
    if fqdn.is_empty() {
        None
    } else {
        Some(fqdn.to_owned())
    }
}
