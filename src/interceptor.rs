//! Global safety net for authorization failures on page-issued calls.
//!
//! Every call made through `InterceptedClient` has its status inspected.
//! `401` means the access credential expired and a refresh may fix it; `403`
//! means the backend rejected the session outright, which ends it. The caller
//! always receives the original response untouched, and the call is never
//! retried here.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::backend::{BackendClient, BackendError};
use crate::credentials::CredentialStore;
use crate::refresh::RefreshCoordinator;

/// Analytics calls are fire-and-forget and never end a session.
pub const TRACK_ACTION: &str = "track";

/// What the interceptor decided about one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    PassThrough,
    /// Access credential expired; a coalesced refresh was requested.
    RefreshPossible,
    /// Credential rejected by policy; the session is being torn down.
    Rejected,
}

pub struct ResponseInterceptor {
    coordinator: Arc<RefreshCoordinator>,
}

impl ResponseInterceptor {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn classify(action: Option<&str>, status: StatusCode) -> Verdict {
        if action == Some(TRACK_ACTION) {
            return Verdict::PassThrough;
        }
        match status {
            StatusCode::UNAUTHORIZED => Verdict::RefreshPossible,
            StatusCode::FORBIDDEN => Verdict::Rejected,
            _ => Verdict::PassThrough,
        }
    }

    /// Act on a response status. Follow-up work runs in the background so
    /// the caller gets its response without waiting.
    pub fn observe(&self, action: Option<&str>, status: StatusCode) -> Verdict {
        let verdict = Self::classify(action, status);
        match verdict {
            Verdict::PassThrough => {}
            Verdict::RefreshPossible => {
                debug!(status = status.as_u16(), "Access credential expired, refreshing");
                tokio::spawn(self.coordinator.force_refresh());
            }
            Verdict::Rejected => {
                warn!(status = status.as_u16(), "Credential rejected by backend policy");
                let supervisor = self.coordinator.supervisor().clone();
                tokio::spawn(async move {
                    supervisor.session_lost("credential rejected by policy").await;
                });
            }
        }
        verdict
    }
}

/// A backend call issued by page code.
#[derive(Debug, Clone)]
pub struct PageCall {
    pub method: Method,
    pub path: String,
    pub action: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl PageCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            action: None,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).json(body)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Tag the call with an action name, e.g. `TRACK_ACTION`.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

/// HTTP client for page code; every response passes through the interceptor.
pub struct InterceptedClient {
    backend: BackendClient,
    store: Arc<CredentialStore>,
    interceptor: ResponseInterceptor,
}

impl InterceptedClient {
    pub fn new(
        backend: BackendClient,
        store: Arc<CredentialStore>,
        interceptor: ResponseInterceptor,
    ) -> Self {
        Self {
            backend,
            store,
            interceptor,
        }
    }

    pub async fn send(&self, call: PageCall) -> Result<reqwest::Response, BackendError> {
        let mut request = self.backend.request(call.method.clone(), &call.path)?;
        if let Some(creds) = self.store.snapshot() {
            request = request.bearer_auth(&creds.access_token);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        self.interceptor
            .observe(call.action.as_deref(), response.status());
        Ok(response)
    }
}
