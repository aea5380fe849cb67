//! Top-level handler for non-recoverable session loss.
//!
//! Every path that ends a session (refresh rejected, blocked session, user
//! logout) funnels through `SessionSupervisor`, which tears the session down,
//! signals all refresh timers to stop and navigates to the login route.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::backend::SessionBackend;
use crate::credentials::CredentialStore;
use crate::teardown::{TeardownReport, end_session};

/// Moves the user to another route. Implemented by whatever owns the UI.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// `Navigator` that forwards every navigation request over a channel.
#[derive(Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, path: &str) {
        if self.tx.send(path.to_string()).is_err() {
            warn!(path = %path, "Navigation dropped, receiver closed");
        }
    }
}

pub struct SessionSupervisor {
    store: Arc<CredentialStore>,
    backend: Arc<dyn SessionBackend>,
    navigator: Arc<dyn Navigator>,
    login_path: String,
    ended: watch::Sender<bool>,
    ending: AtomicBool,
}

impl SessionSupervisor {
    pub fn new(
        store: Arc<CredentialStore>,
        backend: Arc<dyn SessionBackend>,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
    ) -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            store,
            backend,
            navigator,
            login_path: login_path.into(),
            ended,
            ending: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Receiver that flips to `true` once the session has ended.
    pub fn ended(&self) -> watch::Receiver<bool> {
        self.ended.subscribe()
    }

    pub fn is_ended(&self) -> bool {
        *self.ended.borrow()
    }

    /// Handle a non-recoverable credential failure: teardown, stop timers,
    /// redirect to login. Concurrent calls collapse into the first one,
    /// which returns the report; the others return None.
    pub async fn session_lost(&self, reason: &str) -> Option<TeardownReport> {
        if self.ending.swap(true, Ordering::SeqCst) {
            return None;
        }
        warn!(reason = %reason, "Session lost, forcing re-authentication");
        Some(self.finish(false).await)
    }

    /// User-initiated logout. Same effects as `session_lost`.
    pub async fn logout(&self, all_devices: bool) -> TeardownReport {
        self.ending.store(true, Ordering::SeqCst);
        info!(all_devices, "Logging out");
        self.finish(all_devices).await
    }

    /// Re-arm after a fresh login. Timers are restarted by the scheduler.
    pub fn resume(&self) {
        self.ending.store(false, Ordering::SeqCst);
        self.ended.send_replace(false);
    }

    async fn finish(&self, all_devices: bool) -> TeardownReport {
        let report = end_session(self.backend.as_ref(), &self.store, all_devices).await;
        self.ended.send_replace(true);
        self.navigator.navigate(&self.login_path);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::testing::MockBackend;

    fn supervisor(backend: Arc<MockBackend>) -> (SessionSupervisor, mpsc::UnboundedReceiver<String>) {
        let (navigator, rx) = ChannelNavigator::new();
        let store = Arc::new(CredentialStore::with_credentials(Credentials::new(
            "a", "r", "s",
        )));
        (
            SessionSupervisor::new(store, backend, Arc::new(navigator), "/login"),
            rx,
        )
    }

    #[tokio::test]
    async fn test_session_lost_tears_down_and_redirects() {
        let backend = Arc::new(MockBackend::new());
        let (supervisor, mut nav) = supervisor(backend.clone());
        let mut ended = supervisor.ended();

        let report = supervisor.session_lost("refresh rejected").await;

        assert_eq!(report, Some(TeardownReport { remote_invalidated: true }));
        assert!(!supervisor.store().is_authenticated());
        assert_eq!(nav.recv().await.as_deref(), Some("/login"));
        assert!(ended.has_changed().unwrap());
        assert!(*ended.borrow_and_update());
    }

    #[tokio::test]
    async fn test_session_lost_runs_once() {
        let backend = Arc::new(MockBackend::new());
        let (supervisor, mut nav) = supervisor(backend.clone());

        assert!(supervisor.session_lost("first").await.is_some());
        assert!(supervisor.session_lost("second").await.is_none());

        assert_eq!(backend.logout_calls().len(), 1);
        assert_eq!(nav.recv().await.as_deref(), Some("/login"));
        assert!(nav.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resume_rearms() {
        let backend = Arc::new(MockBackend::new());
        let (supervisor, _nav) = supervisor(backend);

        supervisor.session_lost("gone").await;
        assert!(supervisor.is_ended());

        supervisor.resume();
        assert!(!supervisor.is_ended());
    }
}
