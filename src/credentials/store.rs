//! Process-wide credential record shared by the refresh loop and page code.

use std::sync::{PoisonError, RwLock};

use super::Credentials;

/// Owned credential record with whole-triple writes only.
#[derive(Debug, Default)]
pub struct CredentialStore {
    inner: RwLock<Option<Credentials>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with credentials from a completed login.
    pub fn with_credentials(creds: Credentials) -> Self {
        let store = Self::new();
        store.replace_all(creds);
        store
    }

    /// Copy of the current triple, if a session exists.
    pub fn snapshot(&self) -> Option<Credentials> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole triple. Incomplete credentials are refused and the
    /// previous triple is kept.
    pub fn replace_all(&self, creds: Credentials) -> bool {
        if !creds.is_complete() {
            tracing::warn!("Refusing to store incomplete credentials");
            return false;
        }
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(creds);
        true
    }

    /// Replace the triple only while the session identified by `session_id`
    /// is still stored. Returns false, leaving the store as it is, when the
    /// session was cleared or replaced in the meantime or `creds` is incomplete.
    pub fn replace_if_current(&self, session_id: &str, creds: Credentials) -> bool {
        if !creds.is_complete() {
            tracing::warn!("Refusing to store incomplete credentials");
            return false;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match inner.as_ref() {
            Some(current) if current.session_id == session_id => {
                *inner = Some(creds);
                true
            }
            _ => false,
        }
    }

    /// Drop the whole triple.
    pub fn clear_all(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
