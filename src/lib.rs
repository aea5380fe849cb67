pub mod api;
pub mod backend;
pub mod cli;
pub mod credentials;
pub mod gatekeeper;
pub mod interceptor;
pub mod refresh;
pub mod session;
pub mod supervisor;
pub mod teardown;

#[cfg(test)]
mod testing;

use api::create_api_router;
use axum::{
    Router, middleware,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};
use backend::{BackendClient, BackendError, SessionBackend};
use credentials::CookiePolicy;
use gatekeeper::{RouteTable, gatekeeper};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Base URL of the remote backend API
    pub backend_url: Url,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Route classification for the navigation gate
    pub routes: RouteTable,
}

const PAGE_SHELL: &str = "<!doctype html><html><head><meta charset=\"utf-8\"><title>Feedgate</title></head><body><div id=\"app\"></div><script type=\"module\" src=\"/assets/app.js\"></script></body></html>";

/// Pages are rendered client-side; every served route gets the same shell.
async fn page_handler() -> Html<&'static str> {
    Html(PAGE_SHELL)
}

/// Static assets are delivered by the asset pipeline, not this server.
async fn asset_handler() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, BackendError> {
    let backend = BackendClient::new(config.backend_url.clone())?;
    Ok(create_app_with_backend(config, Arc::new(backend)))
}

/// Create the application router around an existing backend client.
pub fn create_app_with_backend(config: &ServerConfig, backend: Arc<dyn SessionBackend>) -> Router {
    let cookies = CookiePolicy::new(config.secure_cookies);
    let routes = Arc::new(config.routes.clone());

    Router::new()
        .nest("/api", create_api_router(backend, cookies))
        .route("/assets/{*path}", get(asset_handler))
        .fallback(page_handler)
        .layer(middleware::from_fn_with_state(routes, gatekeeper))
}

/// Serve the application on the given listener. This function blocks until the server exits.
pub async fn run_server(app: Router, listener: TcpListener) -> Result<(), std::io::Error> {
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
