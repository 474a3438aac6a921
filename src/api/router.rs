//! Route table and middleware: API-key auth, per-IP rate limit, body limit,
//! CORS and security response headers.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, Query};
use axum::http::{header, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    download_handler, execute_handler, health_handler, list_handler, processes_handler,
    system_info_handler, upload_handler,
};
use super::server::AppState;

pub(crate) const API_KEY_HEADER: &str = "x-api-key";
pub(crate) const API_KEY_QUERY: &str = "api_key";

const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

/// Headers added to every response unless a handler already set them
const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
    (header::REFERRER_POLICY, "no-referrer"),
    (
        header::CONTENT_SECURITY_POLICY,
        "default-src 'none'; frame-ancestors 'none'",
    ),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=15552000; includeSubDomains",
    ),
];

#[derive(Clone)]
struct AuthConfig {
    key: Arc<str>,
}

#[derive(Clone)]
struct RateLimitState {
    limit: u32,
    window: Duration,
    counters: Arc<Mutex<HashMap<IpAddr, (u32, Instant)>>>,
}

pub(crate) fn build_router(
    state: AppState,
    api_key: String,
    rate_limit: u32,
    rate_window: Duration,
    max_body_size: usize,
) -> Router {
    let auth_cfg = AuthConfig {
        key: Arc::from(api_key),
    };
    let rate_state = RateLimitState {
        limit: rate_limit,
        window: rate_window,
        counters: Arc::new(Mutex::new(HashMap::new())),
    };

    let protected = Router::new()
        .route("/execute", post(execute_handler))
        .route("/upload", post(upload_handler))
        .route("/download", post(download_handler))
        .route("/list", post(list_handler))
        .route("/system-info", get(system_info_handler))
        .route("/processes", get(processes_handler))
        .layer(middleware::from_fn_with_state(auth_cfg, auth_middleware))
        .layer(RequestBodyLimitLayer::new(max_body_size));

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            rate_state,
            rate_limit_middleware,
        ));

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            name,
            HeaderValue::from_static(value),
        ));
    }

    // Outermost, so preflight requests are answered before auth runs
    router
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Cross-origin access for browser callers; the API key still applies
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Key presented by the caller, header first
fn presented_key(req: &Request<Body>) -> Option<String> {
    if let Some(key) = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(key.to_string());
    }

    Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove(API_KEY_QUERY))
}

async fn auth_middleware(
    axum::extract::State(cfg): axum::extract::State<AuthConfig>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    let Some(key) = presented_key(&req).filter(|k| !k.is_empty()) else {
        tracing::warn!("API request without API key: {path}");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Unauthorized",
                "message": "API key is required. Provide it in X-API-Key header or api_key query parameter.",
            })),
        )
            .into_response();
    };

    // Compare fixed-length digests so the key length does not leak
    let key_hash = blake3::hash(key.as_bytes());
    let expected_hash = blake3::hash(cfg.key.as_bytes());
    if !bool::from(key_hash.as_bytes().ct_eq(expected_hash.as_bytes())) {
        tracing::warn!("API request with invalid API key: {path}");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Forbidden",
                "message": "Invalid API key.",
            })),
        )
            .into_response();
    }

    next.run(req).await
}

async fn rate_limit_middleware(
    axum::extract::State(state): axum::extract::State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if state.limit == 0 {
        return next.run(req).await;
    }

    let ip = req
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), |ci| ci.0.ip());

    let now = Instant::now();
    let mut counters = state.counters.lock().await;

    if counters.len() >= MAX_RATE_LIMIT_ENTRIES && !counters.contains_key(&ip) {
        counters.retain(|_, (_, ts)| now.duration_since(*ts) < state.window);
    }

    let entry = counters.entry(ip).or_insert((0, now));
    if now.duration_since(entry.1) >= state.window {
        *entry = (1, now);
    } else {
        entry.0 = entry.0.saturating_add(1);
        if entry.0 > state.limit {
            tracing::warn!("rate limit exceeded for {ip}");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests from this IP, please try again later.",
            )
                .into_response();
        }
    }
    drop(counters);

    next.run(req).await
}
