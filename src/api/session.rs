//! Session endpoints of the web tier.
//!
//! - POST `/auth` - Forward login, set the credential triple
//! - POST `/refresh` - Exchange the refresh token for a new triple
//! - POST `/logout` - Revoke the backend session and clear the triple
//! - DELETE `/deactivate` - Deactivate the account and clear the triple
//! - GET `/session` - Report whether an access token cookie is present
//!
//! Cookie writes always cover all three credentials, and happen on the same
//! response that answers the call.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::{ApiError, parse_optional_json};
use crate::backend::SessionBackend;
use crate::credentials::{
    ACCESS_COOKIE_NAME, CookiePolicy, Credentials, REFRESH_COOKIE_NAME, SESSION_COOKIE_NAME,
    get_cookie,
};
use crate::teardown::{TeardownReport, revoke_remote};

#[derive(Clone)]
pub struct SessionState {
    pub backend: Arc<dyn SessionBackend>,
    pub cookies: CookiePolicy,
}

pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/auth", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/deactivate", delete(deactivate))
        .route("/session", get(session_status))
        .with_state(state)
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutResponse {
    success: bool,
    #[serde(flatten)]
    report: TeardownReport,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest {
    #[serde(default)]
    all_devices: bool,
}

#[derive(Serialize)]
struct SessionStatusResponse {
    authenticated: bool,
}

/// Response with a JSON body and the whole triple set. Credentials that
/// cannot travel as cookies are a backend fault, and nothing is written.
fn with_credentials(cookies: &CookiePolicy, creds: &Credentials) -> Result<Response, ApiError> {
    let mut response = (StatusCode::OK, Json(SuccessResponse { success: true })).into_response();
    cookies.append_set(response.headers_mut(), creds).map_err(|e| {
        error!(error = %e, "Backend issued credentials unusable as cookies");
        ApiError::bad_gateway("Backend returned malformed credentials")
    })?;
    Ok(response)
}

async fn login(State(state): State<SessionState>, body: Bytes) -> Result<Response, ApiError> {
    let payload: serde_json::Value = parse_optional_json(&body)?
        .filter(serde_json::Value::is_object)
        .ok_or_else(|| ApiError::bad_request("Login requires a JSON object body"))?;

    let creds = state
        .backend
        .login(payload)
        .await
        .map_err(|e| ApiError::backend("Login failed", e))?;

    if !creds.is_complete() {
        return Err(ApiError::bad_gateway("Backend returned incomplete credentials"));
    }

    let response = with_credentials(&state.cookies, &creds)?;
    info!(session_id = %creds.session_id, "Session started");
    Ok(response)
}

async fn refresh(
    State(state): State<SessionState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let refresh_token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiError::unauthorized("No refresh token"))?;

    // The access cookie may already have expired in the browser.
    let current = Credentials::new(
        get_cookie(&headers, ACCESS_COOKIE_NAME).unwrap_or_default(),
        refresh_token,
        get_cookie(&headers, SESSION_COOKIE_NAME).unwrap_or_default(),
    );

    let rotated = state
        .backend
        .refresh(refresh_token.to_string())
        .await
        .map_err(|e| ApiError::backend("Refresh failed", e))?;

    let next = current.rotate(rotated);
    if !next.is_complete() {
        return Err(ApiError::bad_gateway("Backend returned incomplete credentials"));
    }

    with_credentials(&state.cookies, &next)
}

async fn logout(
    State(state): State<SessionState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: LogoutRequest = parse_optional_json(&body)?.unwrap_or_default();

    let remote_invalidated = match get_cookie(&headers, ACCESS_COOKIE_NAME) {
        Some(access_token) => {
            let session_id = get_cookie(&headers, SESSION_COOKIE_NAME).unwrap_or_default();
            revoke_remote(
                state.backend.as_ref(),
                access_token,
                session_id,
                request.all_devices,
            )
            .await
        }
        None => false,
    };

    if !remote_invalidated {
        warn!("Logout completed locally only");
    }

    let mut response = (
        StatusCode::OK,
        Json(LogoutResponse {
            success: true,
            report: TeardownReport { remote_invalidated },
        }),
    )
        .into_response();
    state.cookies.append_clear(response.headers_mut());
    Ok(response)
}

async fn deactivate(
    State(state): State<SessionState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let access_token = get_cookie(&headers, ACCESS_COOKIE_NAME)
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    let result = state
        .backend
        .deactivate(access_token.to_string())
        .await
        .map_err(|e| ApiError::backend("Deactivation failed", e))?;

    if !result.success {
        let message = result
            .message
            .unwrap_or_else(|| "Account deactivation failed".to_string());
        warn!(message = %message, "Backend refused deactivation, keeping session");
        return Err(ApiError::conflict(message));
    }

    info!("Account deactivated");
    let mut response = (StatusCode::OK, Json(SuccessResponse { success: true })).into_response();
    state.cookies.append_clear(response.headers_mut());
    Ok(response)
}

async fn session_status(headers: HeaderMap) -> impl IntoResponse {
    Json(SessionStatusResponse {
        authenticated: get_cookie(&headers, ACCESS_COOKIE_NAME).is_some(),
    })
}
