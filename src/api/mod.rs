mod error;
mod session;

use axum::Router;
use std::sync::Arc;

use crate::backend::SessionBackend;
use crate::credentials::CookiePolicy;

pub use error::ApiError;
pub use session::SessionState;

/// Create the API router.
pub fn create_api_router(backend: Arc<dyn SessionBackend>, cookies: CookiePolicy) -> Router {
    session::router(SessionState { backend, cookies })
}
