//! Client for the remote backend's session endpoints.
//!
//! The backend owns token validity. This module only carries requests and
//! classifies responses into the error taxonomy the coordinator acts on:
//! a definitive rejection (401/403), another HTTP status, or a transport
//! failure with no status at all.

use std::fmt;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Method, RequestBuilder, StatusCode, header};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credentials::{Credentials, REFRESH_COOKIE_NAME, RotatedCredentials};

/// Upper bound on a single backend round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest backend error text relayed to callers.
const MAX_ERROR_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request never produced a status (connect, timeout, reset).
    Transport(String),
    /// The backend refused the presented credential (401 or 403).
    Rejected { status: u16, message: String },
    /// Any other non-success status.
    Status { status: u16, message: String },
    /// A success status whose body could not be understood.
    Decode(String),
}

impl BackendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Rejected { status, .. } | BackendError::Status { status, .. } => {
                Some(*status)
            }
            BackendError::Transport(_) | BackendError::Decode(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            BackendError::Transport(msg) | BackendError::Decode(msg) => msg,
            BackendError::Rejected { message, .. } | BackendError::Status { message, .. } => {
                message
            }
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Transport(msg) => write!(f, "backend unreachable: {msg}"),
            BackendError::Rejected { status, message } => {
                write!(f, "backend rejected credential ({status}): {message}")
            }
            BackendError::Status { status, message } => {
                write!(f, "backend returned {status}: {message}")
            }
            BackendError::Decode(msg) => write!(f, "invalid backend response: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

/// Outcome body of the deactivation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeactivateResult {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutBody<'a> {
    session_id: &'a str,
    all_devices: bool,
}

/// Session endpoints of the remote backend.
///
/// Futures are boxed so implementations can sit behind `Arc<dyn SessionBackend>`.
pub trait SessionBackend: Send + Sync {
    /// `POST /auth` with the caller's login payload.
    fn login(&self, payload: serde_json::Value) -> BoxFuture<'_, Result<Credentials, BackendError>>;

    /// `POST /refresh`, authenticated by the refresh token cookie.
    fn refresh(
        &self,
        refresh_token: String,
    ) -> BoxFuture<'_, Result<RotatedCredentials, BackendError>>;

    /// `POST /logout`, revoking server-side session state.
    fn logout(
        &self,
        access_token: String,
        session_id: String,
        all_devices: bool,
    ) -> BoxFuture<'_, Result<(), BackendError>>;

    /// `DELETE /deactivate`. Transport success does not imply deactivation.
    fn deactivate(
        &self,
        access_token: String,
    ) -> BoxFuture<'_, Result<DeactivateResult, BackendError>>;
}

/// reqwest-backed `SessionBackend`.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
}

impl BackendClient {
    pub fn new(base: Url) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self::with_client(http, base))
    }

    pub fn with_client(http: reqwest::Client, mut base: Url) -> Self {
        // Url::join replaces the last segment unless the base ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { http, base }
    }

    /// Build a request against a backend path such as `/posts/1`.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| BackendError::Transport(format!("invalid path {path}: {e}")))?;
        Ok(self.http.request(method, url))
    }
}

/// Map a non-success response into a `BackendError`, reading its error text.
async fn error_from_response(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let message = match response.text().await {
        Ok(text) => extract_error_message(&text),
        Err(e) => e.to_string(),
    };
    classify_status(status, message)
}

fn classify_status(status: StatusCode, message: String) -> BackendError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Rejected {
            status: status.as_u16(),
            message,
        },
        _ => BackendError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull `error` or `message` out of a JSON error body, falling back to raw text.
fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    body.chars().take(MAX_ERROR_LEN).collect()
}

impl SessionBackend for BackendClient {
    fn login(&self, payload: serde_json::Value) -> BoxFuture<'_, Result<Credentials, BackendError>> {
        async move {
            let response = self.request(Method::POST, "/auth")?.json(&payload).send().await?;
            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }
            Ok(response.json::<Credentials>().await?)
        }
        .boxed()
    }

    fn refresh(
        &self,
        refresh_token: String,
    ) -> BoxFuture<'_, Result<RotatedCredentials, BackendError>> {
        async move {
            let response = self
                .request(Method::POST, "/refresh")?
                .header(
                    header::COOKIE,
                    format!("{}={}", REFRESH_COOKIE_NAME, refresh_token),
                )
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }
            Ok(response.json::<RotatedCredentials>().await?)
        }
        .boxed()
    }

    fn logout(
        &self,
        access_token: String,
        session_id: String,
        all_devices: bool,
    ) -> BoxFuture<'_, Result<(), BackendError>> {
        async move {
            let response = self
                .request(Method::POST, "/logout")?
                .bearer_auth(&access_token)
                .json(&LogoutBody {
                    session_id: &session_id,
                    all_devices,
                })
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }
            Ok(())
        }
        .boxed()
    }

    fn deactivate(
        &self,
        access_token: String,
    ) -> BoxFuture<'_, Result<DeactivateResult, BackendError>> {
        async move {
            let response = self
                .request(Method::DELETE, "/deactivate")?
                .bearer_auth(&access_token)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }
            Ok(response.json::<DeactivateResult>().await?)
        }
        .boxed()
    }
}
