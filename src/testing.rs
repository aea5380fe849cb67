//! In-memory backend and wiring helpers for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::backend::{BackendError, DeactivateResult, SessionBackend};
use crate::credentials::{CredentialStore, Credentials, RotatedCredentials};
use crate::refresh::{RefreshClient, RefreshCoordinator};
use crate::supervisor::{ChannelNavigator, SessionSupervisor};

#[derive(Clone, Copy)]
pub enum RefreshBehavior {
    Succeed,
    Reject,
    Unreachable,
    Status(u16),
}

pub struct MockBackend {
    refresh: RefreshBehavior,
    refresh_delay: Duration,
    logout_fails: bool,
    refresh_calls: AtomicUsize,
    logouts: Mutex<Vec<(String, String)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            refresh: RefreshBehavior::Succeed,
            refresh_delay: Duration::ZERO,
            logout_fails: false,
            refresh_calls: AtomicUsize::new(0),
            logouts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_refresh(mut self, behavior: RefreshBehavior) -> Self {
        self.refresh = behavior;
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_logout_failure(mut self) -> Self {
        self.logout_fails = true;
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> Vec<(String, String)> {
        self.logouts.lock().unwrap().clone()
    }
}

impl SessionBackend for MockBackend {
    fn login(&self, _payload: serde_json::Value) -> BoxFuture<'_, Result<Credentials, BackendError>> {
        async { Ok(Credentials::new("access-0", "refresh-0", "session-0")) }.boxed()
    }

    fn refresh(
        &self,
        _refresh_token: String,
    ) -> BoxFuture<'_, Result<RotatedCredentials, BackendError>> {
        async move {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.refresh_delay.is_zero() {
                tokio::time::sleep(self.refresh_delay).await;
            }
            match self.refresh {
                RefreshBehavior::Succeed => Ok(RotatedCredentials {
                    access_token: format!("access-{n}"),
                    refresh_token: None,
                    session_id: None,
                }),
                RefreshBehavior::Reject => Err(BackendError::Rejected {
                    status: 401,
                    message: "refresh token revoked".into(),
                }),
                RefreshBehavior::Unreachable => {
                    Err(BackendError::Transport("connection refused".into()))
                }
                RefreshBehavior::Status(status) => Err(BackendError::Status {
                    status,
                    message: "error".into(),
                }),
            }
        }
        .boxed()
    }

    fn logout(
        &self,
        access_token: String,
        session_id: String,
        _all_devices: bool,
    ) -> BoxFuture<'_, Result<(), BackendError>> {
        async move {
            self.logouts.lock().unwrap().push((access_token, session_id));
            if self.logout_fails {
                Err(BackendError::Transport("connection refused".into()))
            } else {
                Ok(())
            }
        }
        .boxed()
    }

    fn deactivate(
        &self,
        _access_token: String,
    ) -> BoxFuture<'_, Result<DeactivateResult, BackendError>> {
        async {
            Ok(DeactivateResult {
                success: true,
                message: None,
            })
        }
        .boxed()
    }
}

/// Coordinator over a logged-in store, with a channel observing navigation.
pub fn coordinator_with(
    backend: Arc<MockBackend>,
) -> (Arc<RefreshCoordinator>, mpsc::UnboundedReceiver<String>) {
    let store = Arc::new(CredentialStore::with_credentials(Credentials::new(
        "a0", "r0", "s0",
    )));
    let (navigator, nav) = ChannelNavigator::new();
    let supervisor = Arc::new(SessionSupervisor::new(
        store.clone(),
        backend.clone(),
        Arc::new(navigator),
        "/login",
    ));
    let client = RefreshClient::new(backend, store);
    (RefreshCoordinator::new(client, supervisor), nav)
}
