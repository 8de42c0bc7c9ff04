//! Proxy relay — the minimal server the verification client talks to.
//!
//! Exists solely to satisfy the browser same-origin policy of deployments
//! that front this tool with a web page: it forwards identifier-check
//! requests to the upstream API and returns the upstream response untouched
//! (status and body). No business logic lives here.

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::pipeline::CheckError;

pub const DEFAULT_UPSTREAM_CHECK_URL: &str = "https://check.fb.tools/api/check/account";
pub const DEFAULT_UPSTREAM_UID_BASE: &str = "https://check.fb.tools/api/get_uid";

/// Relay configuration: where to listen and where upstream lives.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    /// Upstream batch check endpoint (full URL).
    pub upstream_check_url: String,
    /// Upstream per-id lookup base; the identifier is appended as a path
    /// segment.
    pub upstream_uid_base: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            upstream_check_url: DEFAULT_UPSTREAM_CHECK_URL.to_string(),
            upstream_uid_base: DEFAULT_UPSTREAM_UID_BASE.to_string(),
        }
    }
}

#[derive(Clone)]
struct ProxyState {
    client: reqwest::Client,
    config: ProxyConfig,
}

/// Build the relay router. CORS-open: the browser frontend may be served
/// from anywhere.
pub fn proxy_router(config: ProxyConfig) -> Router {
    let state = ProxyState {
        client: reqwest::Client::new(),
        config,
    };

    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/get_uid/:id", get(get_uid))
        .route("/api/check/account", post(check_account))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve the relay until ctrl-c.
pub async fn serve(config: ProxyConfig) -> Result<(), CheckError> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Proxy relay listening");

    let app = proxy_router(config);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Proxy relay shutting down");
    }
}

#[derive(Serialize)]
struct PingResponse {
    ok: bool,
    time: i64,
}

/// Liveness probe, also used to wake a cold deployment.
async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        ok: true,
        time: chrono::Utc::now().timestamp_millis(),
    })
}

async fn get_uid(State(state): State<ProxyState>, Path(id): Path<String>) -> Response {
    let url = format!(
        "{}/{id}",
        state.config.upstream_uid_base.trim_end_matches('/')
    );
    forward(state.client.get(&url)).await
}

async fn check_account(State(state): State<ProxyState>, Json(body): Json<Value>) -> Response {
    forward(
        state
            .client
            .post(&state.config.upstream_check_url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/json; charset=utf-8",
            )
            .json(&body),
    )
    .await
}

/// Send the upstream request and relay status + body as-is.
async fn forward(request: reqwest::RequestBuilder) -> Response {
    match request.send().await {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            match upstream.text().await {
                Ok(body) => (status, body).into_response(),
                Err(e) => proxy_error(e),
            }
        }
        Err(e) => proxy_error(e),
    }
}

fn proxy_error(e: reqwest::Error) -> Response {
    tracing::warn!(error = %e, "Upstream request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "Proxy request failed",
            "details": e.to_string(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn spawn_upstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config_for(upstream: &str) -> ProxyConfig {
        ProxyConfig {
            upstream_check_url: format!("{upstream}/api/check/account"),
            upstream_uid_base: format!("{upstream}/api/get_uid"),
            ..ProxyConfig::default()
        }
    }

    #[tokio::test]
    async fn ping_reports_ok_with_epoch_time() {
        let app = proxy_router(ProxyConfig::default());
        let response = app
            .oneshot(Request::get("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["ok"], true);
        assert!(json["time"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn get_uid_forwards_upstream_body() {
        let upstream = spawn_upstream(Router::new().route(
            "/api/get_uid/:id",
            get(|Path(id): Path<String>| async move {
                Json(serde_json::json!({ "uid": id }))
            }),
        ))
        .await;

        let app = proxy_router(config_for(&upstream));
        let response = app
            .oneshot(
                Request::get("/api/get_uid/10ABCDEFGHIJKL")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["uid"], "10ABCDEFGHIJKL");
    }

    #[tokio::test]
    async fn upstream_status_and_body_pass_through_unchanged() {
        let upstream = spawn_upstream(Router::new().route(
            "/api/get_uid/:id",
            get(|| async { (StatusCode::FORBIDDEN, "nope") }),
        ))
        .await;

        let app = proxy_router(config_for(&upstream));
        let response = app
            .oneshot(
                Request::get("/api/get_uid/10ABCDEFGHIJKL")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_string(response).await, "nope");
    }

    #[tokio::test]
    async fn check_account_forwards_request_body_upstream() {
        let upstream = spawn_upstream(Router::new().route(
            "/api/check/account",
            post(|Json(body): Json<Value>| async move { Json(body) }),
        ))
        .await;

        let app = proxy_router(config_for(&upstream));
        let payload =
            serde_json::json!({ "inputData": ["10ABCDEFGHIJKL"], "checkFriends": false, "userLang": "en" });
        let response = app
            .oneshot(
                Request::post("/api/check/account")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let echoed: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(echoed, payload);
    }

    #[tokio::test]
    async fn unreachable_upstream_yields_proxy_error_shape() {
        let config = ProxyConfig {
            upstream_check_url: "http://127.0.0.1:1/api/check/account".to_string(),
            upstream_uid_base: "http://127.0.0.1:1/api/get_uid".to_string(),
            ..ProxyConfig::default()
        };
        let app = proxy_router(config);
        let response = app
            .oneshot(
                Request::get("/api/get_uid/10ABCDEFGHIJKL")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"], "Proxy request failed");
    }
}
