//! HTTP surface: route table, JSON envelope, and process bring-up
//! composition, the way `zvault-server` composes one `Router<Arc<AppState>>`
//! per concern in `build_router`.

pub mod cname;
pub mod domain;
pub mod metrics;
pub mod migrate;
pub mod ping;
pub mod txt;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use axum::Router;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::state::AppState;

/// The `{status, msg, data, token?}` envelope every response body uses.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl<T> Envelope<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            status: 200,
            msg: String::new(),
            data: Some(data),
            token: None,
        }
    }

    #[must_use]
    pub fn ok_with_token(data: T, token: String) -> Self {
        Self {
            status: 200,
            msg: String::new(),
            data: Some(data),
            token: Some(token),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: 200,
            msg: String::new(),
            data: None,
            token: None,
        }
    }

    /// The GET-of-absent-Name quirk: 200, empty `data`, error text in
    /// `msg`.
    #[must_use]
    pub fn not_found_but_200(msg: String) -> Self {
        Self {
            status: 200,
            msg,
            data: None,
            token: None,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let mutating = Router::new()
        .merge(domain::mutating_router())
        .merge(txt::mutating_router())
        .merge(cname::mutating_router())
        .merge(migrate::router())
        .route_layer(axum_mw::from_fn_with_state(Arc::clone(&state), auth_middleware));

    let open = Router::new()
        .merge(domain::open_router())
        .merge(txt::open_router())
        .merge(cname::open_router())
        .merge(ping::router())
        .merge(metrics::router());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION]);

    Router::new()
        .merge(open)
        .merge(mutating)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rdns_core::Engine;
    use rdns_storage::MemoryDriver;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::build_router;
    use crate::metrics::Metrics;
    use crate::state::AppState;

    const ZONE: &str = "lb.rancher.cloud";

    fn app() -> axum::Router {
        let engine = Arc::new(Engine::new(Arc::new(MemoryDriver::new(ZONE)), ZONE));
        let state = Arc::new(AppState {
            engine,
            metrics: Arc::new(Metrics::new()),
        });
        build_router(state)
    }

    async fn send(app: &axum::Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// E1: allocate, then a plain GET returns the same hosts back.
    #[tokio::test]
    async fn e1_allocate_then_get_round_trips() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/v1/domain",
            None,
            Some(json!({"hosts": ["1.2.3.4"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let fqdn = body["data"]["fqdn"].as_str().unwrap().to_owned();
        assert!(fqdn.ends_with(ZONE));
        assert_eq!(body["data"]["hosts"], json!(["1.2.3.4"]));
        let token = body["token"].as_str().unwrap().to_owned();
        assert!(!token.is_empty());

        let (status, body) = send(&app, "GET", &format!("/v1/domain/{fqdn}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["hosts"], json!(["1.2.3.4"]));
    }

    /// E2: an authenticated update adds a host and a sub-prefix.
    #[tokio::test]
    async fn e2_update_with_the_allocation_token_adds_hosts_and_a_subdomain() {
        let app = app();
        let (_, alloc) = send(&app, "POST", "/v1/domain", None, Some(json!({"hosts": ["1.2.3.4"]}))).await;
        let fqdn = alloc["data"]["fqdn"].as_str().unwrap().to_owned();
        let token = alloc["token"].as_str().unwrap().to_owned();

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/v1/domain/{fqdn}"),
            Some(&token),
            Some(json!({"hosts": ["1.2.3.4", "5.6.7.8"], "subdomain": {"x1": ["9.9.9.9"]}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, "GET", &format!("/v1/domain/{fqdn}"), None, None).await;
        let hosts: Vec<String> = serde_json::from_value(body["data"]["hosts"].clone()).unwrap();
        assert_eq!(hosts, vec!["1.2.3.4".to_owned(), "5.6.7.8".to_owned()]);
        assert_eq!(body["data"]["subdomain"]["x1"], json!(["9.9.9.9"]));
        let _ = body;
    }

    /// E3: renewing advances the expiration timestamp.
    #[tokio::test]
    async fn e3_renew_advances_expiration() {
        let app = app();
        let (_, alloc) = send(&app, "POST", "/v1/domain", None, Some(json!({"hosts": ["1.2.3.4"]}))).await;
        let fqdn = alloc["data"]["fqdn"].as_str().unwrap().to_owned();
        let token = alloc["token"].as_str().unwrap().to_owned();
        let before = alloc["data"]["expiration"].as_str().unwrap().to_owned();

        let (status, renewed) = send(&app, "PUT", &format!("/v1/domain/{fqdn}/renew"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let after = renewed["data"]["expiration"].as_str().unwrap().to_owned();
        assert!(after >= before);
    }

    /// E4: delete returns 200, a subsequent GET is the not-found-but-200
    /// quirk, and reallocating never draws the freed slug back while it's
    /// frozen.
    #[tokio::test]
    async fn e4_delete_then_get_is_empty_and_slug_stays_quarantined() {
        let app = app();
        let (_, alloc) = send(&app, "POST", "/v1/domain", None, Some(json!({"hosts": ["1.2.3.4"]}))).await;
        let fqdn = alloc["data"]["fqdn"].as_str().unwrap().to_owned();
        let token = alloc["token"].as_str().unwrap().to_owned();
        let slug = fqdn.split('.').next().unwrap().to_owned();

        let (status, _) = send(&app, "DELETE", &format!("/v1/domain/{fqdn}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", &format!("/v1/domain/{fqdn}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_null());
        assert!(!body["msg"].as_str().unwrap().is_empty());

        for _ in 0..20 {
            let (_, alloc) = send(&app, "POST", "/v1/domain", None, Some(json!({"hosts": ["1.2.3.4"]}))).await;
            let new_fqdn = alloc["data"]["fqdn"].as_str().unwrap();
            assert_ne!(new_fqdn, fqdn, "freed slug {slug} must stay quarantined");
        }
    }

    /// E5: creating a TXT leaf under an existing Name needs no auth, and
    /// reads back the same text.
    #[tokio::test]
    async fn e5_txt_leaf_under_existing_name_needs_no_auth() {
        let app = app();
        let (_, alloc) = send(&app, "POST", "/v1/domain", None, Some(json!({"hosts": ["1.2.3.4"]}))).await;
        let fqdn = alloc["data"]["fqdn"].as_str().unwrap().to_owned();
        let txt_fqdn = format!("_acme-challenge.sub.{fqdn}");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/domain/{txt_fqdn}/txt"),
            None,
            Some(json!({"text": "abc"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["text"], "abc");

        let (status, body) = send(&app, "GET", &format!("/v1/domain/{txt_fqdn}/txt"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["text"], "abc");
    }

    /// E6: a forged bearer token is rejected with 403 and mutates nothing.
    #[tokio::test]
    async fn e6_forged_token_is_forbidden_and_does_not_mutate() {
        let app = app();
        let (_, alloc) = send(&app, "POST", "/v1/domain", None, Some(json!({"hosts": ["1.2.3.4"]}))).await;
        let fqdn = alloc["data"]["fqdn"].as_str().unwrap().to_owned();

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/v1/domain/{fqdn}"),
            Some("not-the-real-token"),
            Some(json!({"hosts": ["6.6.6.6"]})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, body) = send(&app, "GET", &format!("/v1/domain/{fqdn}"), None, None).await;
        assert_eq!(body["data"]["hosts"], json!(["1.2.3.4"]));
    }

    /// The open `/ping` and `/metrics` endpoints need no auth at all.
    #[tokio::test]
    async fn ping_and_metrics_are_open() {
        let app = app();
        let (status, _) = send(&app, "GET", "/ping", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
