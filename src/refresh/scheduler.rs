//! Strategy selection and the timer loop shared by both schedulers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use super::client::RefreshOutcome;
use super::coordinator::{RefreshCoordinator, RefreshNotice};
use super::interval::IntervalScheduler;
use super::persistent::BackgroundContexts;

/// Proactive refresh period, well inside the access token lifetime.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(8 * 60);

/// Which execution strategy drives the refresh timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One loop per origin in a context that outlives individual pages.
    PersistentContext,
    /// One loop per open page.
    PageInterval,
}

/// Platform features detected once at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub persistent_context: bool,
}

/// Keeps the access credential fresh. Callers never need to know which
/// strategy is behind it.
pub trait RefreshScheduler: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Register an open page. Dropping the attachment detaches the page.
    fn attach(&self) -> PageAttachment;

    /// Out-of-band refresh, coalesced with any refresh already in flight.
    fn force_refresh(&self) -> BoxFuture<'static, RefreshOutcome>;

    /// Advisory "credential refreshed" notifications.
    fn subscribe(&self) -> broadcast::Receiver<RefreshNotice>;

    /// Restart timers after the session was re-established.
    fn resume(&self);

    /// Stop every timer owned by this scheduler.
    fn stop(&self);

    /// Number of pages currently attached.
    fn active_pages(&self) -> usize;
}

/// Pick the scheduler once, based on what the platform supports.
pub fn select_scheduler(
    capabilities: Capabilities,
    contexts: &BackgroundContexts,
    origin: &str,
    coordinator: Arc<RefreshCoordinator>,
    period: Duration,
) -> Arc<dyn RefreshScheduler> {
    if capabilities.persistent_context {
        info!(origin = %origin, "Using persistent background refresh context");
        contexts.register(origin, coordinator, period)
    } else {
        info!("Persistent context unavailable, using per-page refresh timer");
        Arc::new(IntervalScheduler::new(coordinator, period))
    }
}

/// Pages attached to a scheduler, with the per-page timer if it has one.
#[derive(Default)]
pub(super) struct PageSet {
    pages: Mutex<HashMap<Uuid, Option<AbortHandle>>>,
}

impl PageSet {
    pub(super) fn insert(self: &Arc<Self>, timer: Option<AbortHandle>) -> PageAttachment {
        let id = Uuid::new_v4();
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, timer);
        debug!(page = %id, "Page attached");
        PageAttachment {
            id,
            pages: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: &Uuid) {
        let removed = self
            .pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(Some(timer)) = removed {
            timer.abort();
        }
        debug!(page = %id, "Page detached");
    }

    /// Replace every page's timer with a freshly spawned one.
    pub(super) fn restart_timers(&self, mut spawn: impl FnMut() -> AbortHandle) {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        for timer in pages.values_mut() {
            if let Some(old) = timer.replace(spawn()) {
                old.abort();
            }
        }
    }

    /// Abort all per-page timers. Pages stay attached.
    pub(super) fn abort_timers(&self) {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        for timer in pages.values_mut() {
            if let Some(timer) = timer.take() {
                timer.abort();
            }
        }
    }

    pub(super) fn len(&self) -> usize {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Handle held by an open page for as long as it is alive.
pub struct PageAttachment {
    id: Uuid,
    pages: Weak<PageSet>,
}

impl Drop for PageAttachment {
    fn drop(&mut self) {
        if let Some(pages) = self.pages.upgrade() {
            pages.remove(&self.id);
        }
    }
}

/// Refresh immediately, then every `period`, until the refresh credential is
/// rejected or the session ends.
pub(super) async fn run_refresh_loop(
    coordinator: Arc<RefreshCoordinator>,
    period: Duration,
    mut ended: watch::Receiver<bool>,
) {
    if *ended.borrow_and_update() {
        return;
    }

    // The first tick of a tokio interval completes immediately.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    coordinator.mark_scheduled();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if coordinator.refresh().await == RefreshOutcome::Rejected {
                    break;
                }
            }
            changed = ended.changed() => {
                if changed.is_err() || *ended.borrow_and_update() {
                    break;
                }
            }
        }
    }

    debug!("Refresh loop stopped");
    coordinator.mark_idle();
}
