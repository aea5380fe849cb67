#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post},
};
use feedgate::{ServerConfig, gatekeeper::RouteTable};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// A backend address nothing listens on, for simulating network failure.
pub const UNREACHABLE_BACKEND: &str = "http://127.0.0.1:1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshMode {
    Succeed,
    Rotate,
    Reject,
    /// Access token that cannot be carried in a cookie.
    Malformed,
}

/// Observable state of the fake backend.
pub struct BackendState {
    pub refresh_mode: Mutex<RefreshMode>,
    pub refresh_delay: Mutex<Duration>,
    pub deactivate_body: Mutex<Value>,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub feed_calls: AtomicUsize,
    pub event_calls: AtomicUsize,
    pub last_logout: Mutex<Option<(String, Value)>>,
    pub last_refresh_cookie: Mutex<Option<String>>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            refresh_mode: Mutex::new(RefreshMode::Succeed),
            refresh_delay: Mutex::new(Duration::ZERO),
            deactivate_body: Mutex::new(json!({ "success": true })),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            feed_calls: AtomicUsize::new(0),
            event_calls: AtomicUsize::new(0),
            last_logout: Mutex::new(None),
            last_refresh_cookie: Mutex::new(None),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn feed_calls(&self) -> usize {
        self.feed_calls.load(Ordering::SeqCst)
    }

    pub fn event_calls(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }
}

pub struct FakeBackend {
    pub url: Url,
    pub state: Arc<BackendState>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::new());
        let app = Router::new()
            .route("/v1/auth", post(auth))
            .route("/v1/refresh", post(refresh))
            .route("/v1/logout", post(logout))
            .route("/v1/deactivate", delete(deactivate))
            .route("/v1/feed", get(feed))
            .route("/v1/events", post(events))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            url: Url::parse(&format!("http://{}/v1", addr)).expect("Invalid URL"),
            state,
            handle,
        }
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.state.refresh_mode.lock().unwrap() = mode;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock().unwrap() = delay;
    }

    pub fn set_deactivate_body(&self, body: Value) {
        *self.state.deactivate_body.lock().unwrap() = body;
    }
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

/// `secret` logs in; `malformed` logs in with a token no cookie can carry.
async fn auth(Json(body): Json<Value>) -> impl IntoResponse {
    if body["password"] == "malformed" {
        (
            StatusCode::OK,
            Json(json!({
                "accessToken": "tok\u{7f}en",
                "refreshToken": "refresh-login",
                "sessionId": "session-login",
            })),
        )
    } else if body["password"] == "secret" {
        (
            StatusCode::OK,
            Json(json!({
                "accessToken": "access-login",
                "refreshToken": "refresh-login",
                "sessionId": "session-login",
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid credentials" })),
        )
    }
}

async fn refresh(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> impl IntoResponse {
    let n = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    *state.last_refresh_cookie.lock().unwrap() = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mode = *state.refresh_mode.lock().unwrap();
    match mode {
        RefreshMode::Succeed => (
            StatusCode::OK,
            Json(json!({ "accessToken": format!("access-{n}") })),
        ),
        RefreshMode::Rotate => (
            StatusCode::OK,
            Json(json!({
                "accessToken": format!("access-{n}"),
                "refreshToken": format!("refresh-{n}"),
            })),
        ),
        RefreshMode::Malformed => (
            StatusCode::OK,
            Json(json!({ "accessToken": "x; Domain=evil.test" })),
        ),
        RefreshMode::Reject => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Refresh token revoked" })),
        ),
    }
}

async fn logout(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_logout.lock().unwrap() = Some((bearer(&headers), body));
    Json(json!({ "success": true }))
}

async fn deactivate(State(state): State<Arc<BackendState>>) -> impl IntoResponse {
    let body = state.deactivate_body.lock().unwrap().clone();
    (StatusCode::OK, Json(body))
}

/// `blocked` tokens are rejected by policy; `expired` tokens need a refresh.
async fn feed(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> impl IntoResponse {
    state.feed_calls.fetch_add(1, Ordering::SeqCst);
    match bearer(&headers).as_str() {
        "blocked" => (StatusCode::FORBIDDEN, Json(json!({ "error": "Session blocked" }))),
        "expired" => (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Token expired" }))),
        _ => (StatusCode::OK, Json(json!({ "items": [] }))),
    }
}

async fn events(State(state): State<Arc<BackendState>>) -> impl IntoResponse {
    state.event_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::FORBIDDEN
}

pub fn test_config(backend_url: &str) -> ServerConfig {
    ServerConfig {
        backend_url: Url::parse(backend_url).expect("Invalid URL"),
        secure_cookies: false,
        routes: RouteTable::default(),
    }
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &axum::http::Response<axum::body::Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", cookie_name)) && c.contains("Max-Age=0"))
}

/// Value a Set-Cookie header assigns to `cookie_name`, if it sets a non-empty one.
pub fn set_cookie_value(cookies: &[String], cookie_name: &str) -> Option<String> {
    let prefix = format!("{}=", cookie_name);
    cookies.iter().find_map(|c| {
        let value = c.strip_prefix(&prefix)?.split(';').next()?;
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub async fn body_json(response: axum::http::Response<axum::body::Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
