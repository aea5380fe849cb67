//! Client half of the session teardown protocol.
//!
//! Remote invalidation is best-effort. Local clearing always happens: a stuck
//! backend session is less harmful than a client that looks logged out while
//! still holding a usable credential.

use serde::Serialize;
use tracing::{info, warn};

use crate::backend::SessionBackend;
use crate::credentials::CredentialStore;

/// What the teardown managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    /// Whether the backend acknowledged the session revocation.
    pub remote_invalidated: bool,
}

/// Ask the backend to revoke a session. Failures are logged and reported as `false`.
pub async fn revoke_remote(
    backend: &dyn SessionBackend,
    access_token: &str,
    session_id: &str,
    all_devices: bool,
) -> bool {
    match backend
        .logout(access_token.to_string(), session_id.to_string(), all_devices)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Backend logout failed, clearing locally");
            false
        }
    }
}

/// Revoke the stored session remotely (if there is one), then clear the store.
pub async fn end_session(
    backend: &dyn SessionBackend,
    store: &CredentialStore,
    all_devices: bool,
) -> TeardownReport {
    let remote_invalidated = match store.snapshot() {
        Some(creds) => {
            revoke_remote(backend, &creds.access_token, &creds.session_id, all_devices).await
        }
        None => false,
    };

    store.clear_all();
    info!(remote_invalidated, "Session credentials cleared");

    TeardownReport { remote_invalidated }
}
