//! Single-flight coordination of credential renewals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::client::{RefreshClient, RefreshOutcome};
use crate::supervisor::SessionSupervisor;

/// Capacity of the advisory refresh notification channel.
const NOTICE_CAPACITY: usize = 16;

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Phase of the refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No scheduler is running.
    Idle,
    /// A scheduler is waiting for its next tick.
    Scheduled,
    /// A renewal call is outstanding.
    Refreshing,
    /// The last renewal did not succeed.
    Failed,
}

/// Advisory "credential refreshed" message. Delivery is not guaranteed.
#[derive(Debug, Clone)]
pub struct RefreshNotice {
    pub refreshed_at: SystemTime,
}

/// Collapses every refresh trigger into at most one outstanding backend call.
///
/// The first caller installs a shared future in a one-slot cache; callers that
/// arrive while it is pending get a clone of the same future.
pub struct RefreshCoordinator {
    client: RefreshClient,
    supervisor: Arc<SessionSupervisor>,
    in_flight: Mutex<Option<InFlight>>,
    state: Mutex<RefreshState>,
    scheduled: AtomicBool,
    notices: broadcast::Sender<RefreshNotice>,
}

impl RefreshCoordinator {
    pub fn new(client: RefreshClient, supervisor: Arc<SessionSupervisor>) -> Arc<Self> {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Arc::new(Self {
            client,
            supervisor,
            in_flight: Mutex::new(None),
            state: Mutex::new(RefreshState::Idle),
            scheduled: AtomicBool::new(false),
            notices,
        })
    }

    pub fn supervisor(&self) -> &Arc<SessionSupervisor> {
        &self.supervisor
    }

    pub fn state(&self) -> RefreshState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RefreshState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Called by a scheduler when its timer starts.
    pub fn mark_scheduled(&self) {
        self.scheduled.store(true, Ordering::SeqCst);
        if self.state() == RefreshState::Idle {
            self.set_state(RefreshState::Scheduled);
        }
    }

    /// Called by a scheduler when its timer stops.
    pub fn mark_idle(&self) {
        self.scheduled.store(false, Ordering::SeqCst);
        if self.state() != RefreshState::Refreshing {
            self.set_state(RefreshState::Idle);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshNotice> {
        self.notices.subscribe()
    }

    /// Whether a renewal call is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start a renewal, or join the one already in flight.
    pub fn refresh(self: &Arc<Self>) -> InFlight {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = slot.as_ref() {
            debug!("Joining in-flight refresh");
            return pending.clone();
        }

        let this = Arc::clone(self);
        let fut = async move {
            this.set_state(RefreshState::Refreshing);
            let outcome = this.client.refresh().await;
            this.settle(&outcome).await;
            this.in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            outcome
        }
        .boxed()
        .shared();

        *slot = Some(fut.clone());
        fut
    }

    /// Out-of-band renewal requested by page code or the interceptor.
    pub fn force_refresh(self: &Arc<Self>) -> InFlight {
        debug!("Forced refresh requested");
        self.refresh()
    }

    async fn settle(&self, outcome: &RefreshOutcome) {
        match outcome {
            RefreshOutcome::Refreshed => {
                // Nobody listening is fine; the notice is advisory.
                let _ = self.notices.send(RefreshNotice {
                    refreshed_at: SystemTime::now(),
                });
                self.set_state(if self.scheduled.load(Ordering::SeqCst) {
                    RefreshState::Scheduled
                } else {
                    RefreshState::Idle
                });
            }
            RefreshOutcome::Rejected => {
                self.set_state(RefreshState::Failed);
                self.supervisor
                    .session_lost("refresh credential rejected")
                    .await;
            }
            RefreshOutcome::Transient(e) => {
                warn!(error = %e, "Refresh failed, retrying on next tick");
                self.set_state(RefreshState::Failed);
            }
            RefreshOutcome::Invalid(e) => {
                warn!(error = %e, "Refresh request invalid");
                self.set_state(RefreshState::Failed);
            }
        }
    }
}
