//! Client-side session runtime used by page code.
//!
//! Wires the credential store, refresh coordinator, scheduler, interceptor and
//! supervisor together. Page code attaches while open, issues calls through
//! `send`, and may ask for a refresh; it never handles authorization failures
//! itself. After the session ends, `resume` carries the runtime over to the
//! next login.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use crate::backend::{BackendClient, BackendError};
use crate::credentials::{CredentialStore, Credentials};
use crate::gatekeeper::LOGIN_PATH;
use crate::interceptor::{InterceptedClient, PageCall, ResponseInterceptor};
use crate::refresh::{
    BackgroundContexts, Capabilities, DEFAULT_REFRESH_INTERVAL, PageAttachment, RefreshClient,
    RefreshCoordinator, RefreshNotice, RefreshOutcome, RefreshScheduler, RefreshState, Strategy,
    select_scheduler,
};
use crate::supervisor::{Navigator, SessionSupervisor};
use crate::teardown::TeardownReport;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Origin the background context is registered for
    pub origin: String,
    /// Period between proactive refreshes
    pub refresh_interval: Duration,
    /// Route shown after the session ends
    pub login_path: String,
    /// Platform features available for background refresh
    pub capabilities: Capabilities,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            login_path: LOGIN_PATH.to_string(),
            capabilities: Capabilities {
                persistent_context: true,
            },
        }
    }
}

pub struct SessionRuntime {
    store: Arc<CredentialStore>,
    supervisor: Arc<SessionSupervisor>,
    coordinator: Arc<RefreshCoordinator>,
    scheduler: Arc<dyn RefreshScheduler>,
    client: InterceptedClient,
}

impl SessionRuntime {
    /// Start refreshing an established session. Must run inside a Tokio runtime.
    pub fn start(
        config: SessionConfig,
        backend: BackendClient,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
        contexts: &BackgroundContexts,
    ) -> Self {
        let session_backend = Arc::new(backend.clone());
        let supervisor = Arc::new(SessionSupervisor::new(
            store.clone(),
            session_backend.clone(),
            navigator,
            config.login_path,
        ));
        let coordinator = RefreshCoordinator::new(
            RefreshClient::new(session_backend, store.clone()),
            supervisor.clone(),
        );
        let scheduler = select_scheduler(
            config.capabilities,
            contexts,
            &config.origin,
            coordinator.clone(),
            config.refresh_interval,
        );
        let client = InterceptedClient::new(
            backend,
            store.clone(),
            ResponseInterceptor::new(coordinator.clone()),
        );

        Self {
            store,
            supervisor,
            coordinator,
            scheduler,
            client,
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn strategy(&self) -> Strategy {
        self.scheduler.strategy()
    }

    pub fn state(&self) -> RefreshState {
        self.coordinator.state()
    }

    /// Register an open page for the lifetime of the returned handle.
    pub fn attach_page(&self) -> PageAttachment {
        self.scheduler.attach()
    }

    /// Refresh now, joining any refresh already in flight.
    pub fn force_refresh(&self) -> BoxFuture<'static, RefreshOutcome> {
        self.scheduler.force_refresh()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshNotice> {
        self.scheduler.subscribe()
    }

    /// Issue a backend call on behalf of page code.
    pub async fn send(&self, call: PageCall) -> Result<reqwest::Response, BackendError> {
        self.client.send(call).await
    }

    /// End the session: stop timers, revoke remotely, clear, go to login.
    pub async fn logout(&self, all_devices: bool) -> TeardownReport {
        self.scheduler.stop();
        self.supervisor.logout(all_devices).await
    }

    /// Continue with a freshly logged-in session after the previous one ended.
    /// Refuses incomplete credentials, leaving the runtime ended.
    pub fn resume(&self, creds: Credentials) -> bool {
        if !self.store.replace_all(creds) {
            return false;
        }
        self.supervisor.resume();
        self.scheduler.resume();
        true
    }

    pub fn is_ended(&self) -> bool {
        self.supervisor.is_ended()
    }
}
