//! Per-navigation authorization check.
//!
//! Runs before any page is served and decides, from the presence of the
//! access token cookie alone, whether to serve the page or redirect. The
//! check fails closed: anything short of a readable, non-empty access token
//! counts as unauthenticated.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::debug;

use crate::credentials::{ACCESS_COOKIE_NAME, get_cookie};

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";

/// Routes reachable without a session.
const PUBLIC_ROUTES: &[&str] = &["/forgot-password", "/reset-password", "/terms", "/privacy"];

/// Routes that only make sense without a session.
const AUTH_ONLY_ROUTES: &[&str] = &[LOGIN_PATH, "/signup"];

/// Prefixes that bypass the gate: the backend proxy and internal assets
/// authorize themselves or need no authorization.
const EXEMPT_PREFIXES: &[&str] = &["/api/", "/assets/"];

const EXEMPT_PATHS: &[&str] = &["/api", "/assets", "/favicon.ico"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Public,
    AuthOnly,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Serve,
    Redirect(String),
}

/// Route classification used by the gate.
#[derive(Debug, Clone)]
pub struct RouteTable {
    public: Vec<String>,
    auth_only: Vec<String>,
    home_path: String,
    login_path: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            public: PUBLIC_ROUTES.iter().map(|s| s.to_string()).collect(),
            auth_only: AUTH_ONLY_ROUTES.iter().map(|s| s.to_string()).collect(),
            home_path: HOME_PATH.to_string(),
            login_path: LOGIN_PATH.to_string(),
        }
    }
}

/// Whether `path` is `route` itself or one of its sub-paths.
fn matches_route(path: &str, route: &str) -> bool {
    match path.strip_prefix(route) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl RouteTable {
    pub fn with_public(mut self, route: impl Into<String>) -> Self {
        self.public.push(route.into());
        self
    }

    pub fn is_exempt(path: &str) -> bool {
        EXEMPT_PATHS.contains(&path) || EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p))
    }

    pub fn classify(&self, path: &str) -> PathClass {
        if self.auth_only.iter().any(|r| matches_route(path, r)) {
            PathClass::AuthOnly
        } else if self.public.iter().any(|r| matches_route(path, r)) {
            PathClass::Public
        } else {
            PathClass::Protected
        }
    }

    pub fn decide(&self, authenticated: bool, class: PathClass) -> GateDecision {
        match (authenticated, class) {
            (true, PathClass::AuthOnly) => GateDecision::Redirect(self.home_path.clone()),
            (true, PathClass::Public | PathClass::Protected) => GateDecision::Serve,
            (false, PathClass::Public | PathClass::AuthOnly) => GateDecision::Serve,
            (false, PathClass::Protected) => GateDecision::Redirect(self.login_path.clone()),
        }
    }
}

/// Axum middleware applying the gate to every non-exempt request.
pub async fn gatekeeper(
    State(routes): State<Arc<RouteTable>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if RouteTable::is_exempt(&path) {
        return next.run(request).await;
    }

    let authenticated = get_cookie(request.headers(), ACCESS_COOKIE_NAME).is_some();
    let class = routes.classify(&path);

    match routes.decide(authenticated, class) {
        GateDecision::Serve => next.run(request).await,
        GateDecision::Redirect(to) => {
            debug!(path = %path, ?class, authenticated, to = %to, "Navigation redirected");
            Redirect::temporary(&to).into_response()
        }
    }
}
