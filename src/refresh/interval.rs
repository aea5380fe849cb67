//! Fallback strategy: an independent refresh timer in every open page.
//!
//! Pages refresh redundantly; the coordinator absorbs overlapping calls and
//! the backend treats repeated renewals idempotently.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::info;

use super::client::RefreshOutcome;
use super::coordinator::{RefreshCoordinator, RefreshNotice};
use super::scheduler::{PageAttachment, PageSet, RefreshScheduler, Strategy, run_refresh_loop};

pub struct IntervalScheduler {
    coordinator: Arc<RefreshCoordinator>,
    period: Duration,
    pages: Arc<PageSet>,
}

impl IntervalScheduler {
    pub fn new(coordinator: Arc<RefreshCoordinator>, period: Duration) -> Self {
        Self {
            coordinator,
            period,
            pages: Arc::new(PageSet::default()),
        }
    }

    fn spawn_timer(&self) -> AbortHandle {
        let ended = self.coordinator.supervisor().ended();
        tokio::spawn(run_refresh_loop(
            self.coordinator.clone(),
            self.period,
            ended,
        ))
        .abort_handle()
    }
}

impl RefreshScheduler for IntervalScheduler {
    fn strategy(&self) -> Strategy {
        Strategy::PageInterval
    }

    fn attach(&self) -> PageAttachment {
        self.pages.insert(Some(self.spawn_timer()))
    }

    fn resume(&self) {
        self.pages.restart_timers(|| self.spawn_timer());
        info!(pages = self.pages.len(), "Page refresh timers restarted");
    }

    fn force_refresh(&self) -> BoxFuture<'static, RefreshOutcome> {
        self.coordinator.force_refresh().boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<RefreshNotice> {
        self.coordinator.subscribe()
    }

    fn stop(&self) {
        self.pages.abort_timers();
        self.coordinator.mark_idle();
        info!("Page refresh timers stopped");
    }

    fn active_pages(&self) -> usize {
        self.pages.len()
    }
}
