//! Single credential renewal against the backend.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{BackendError, SessionBackend};
use crate::credentials::CredentialStore;

/// Result of one renewal attempt, classified by what the caller must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new triple was written to the store.
    Refreshed,
    /// The refresh credential is invalid, revoked or blocked. Never retried.
    Rejected,
    /// No definitive answer. Retried on the next scheduled tick only.
    Transient(String),
    /// The backend refused the request as malformed. No mutation.
    Invalid(String),
}

/// Issues renewals and writes the rotated triple back to the store.
pub struct RefreshClient {
    backend: Arc<dyn SessionBackend>,
    store: Arc<CredentialStore>,
}

impl RefreshClient {
    pub fn new(backend: Arc<dyn SessionBackend>, store: Arc<CredentialStore>) -> Self {
        Self { backend, store }
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(current) = self.store.snapshot() else {
            debug!("No session to refresh");
            return RefreshOutcome::Rejected;
        };

        match self.backend.refresh(current.refresh_token.clone()).await {
            Ok(rotated) => {
                let next = current.rotate(rotated);
                if !next.is_complete() {
                    return RefreshOutcome::Invalid("backend returned an empty access token".into());
                }
                // A logout may have cleared the store while the call was out.
                if self.store.replace_if_current(&current.session_id, next) {
                    debug!(session_id = %current.session_id, "Access credential refreshed");
                    RefreshOutcome::Refreshed
                } else {
                    debug!("Session ended during refresh, discarding new credentials");
                    RefreshOutcome::Rejected
                }
            }
            Err(BackendError::Rejected { status, message }) => {
                warn!(status, message = %message, "Refresh credential rejected");
                RefreshOutcome::Rejected
            }
            Err(BackendError::Status { status, message }) if (400..500).contains(&status) => {
                warn!(status, message = %message, "Refresh request refused");
                RefreshOutcome::Invalid(message)
            }
            Err(e) => RefreshOutcome::Transient(e.to_string()),
        }
    }
}
