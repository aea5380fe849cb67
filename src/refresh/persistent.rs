//! Refresh strategy backed by a background context shared by every page of
//! an origin.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::RefreshOutcome;
use super::coordinator::{RefreshCoordinator, RefreshNotice};
use super::scheduler::{PageAttachment, PageSet, RefreshScheduler, Strategy, run_refresh_loop};

/// Registry of background contexts, at most one per origin.
#[derive(Default)]
pub struct BackgroundContexts {
    contexts: Mutex<HashMap<String, Arc<BackgroundContext>>>,
}

impl BackgroundContexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the origin's context, starting it if it is not already running.
    ///
    /// A running context is only reused by the coordinator it was started
    /// for. Registering a different coordinator retires the old context, so
    /// the origin's single loop always refreshes the newest session.
    pub fn register(
        &self,
        origin: &str,
        coordinator: Arc<RefreshCoordinator>,
        period: Duration,
    ) -> Arc<BackgroundContext> {
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = contexts.get(origin) {
            if Arc::ptr_eq(&existing.coordinator, &coordinator) {
                if !existing.is_running() {
                    existing.restart();
                }
                debug!(origin = %origin, "Reusing registered background context");
                return existing.clone();
            }
            info!(origin = %origin, "Replacing background context of a previous session");
            existing.retire();
        }

        info!(origin = %origin, period_secs = period.as_secs(), "Registering background context");
        let context = Arc::new(BackgroundContext::start(origin, coordinator, period));
        contexts.insert(origin.to_string(), context.clone());
        context
    }

    pub fn get(&self, origin: &str) -> Option<Arc<BackgroundContext>> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(origin)
            .cloned()
    }

    /// Stop and forget an origin's context.
    pub fn unregister(&self, origin: &str) {
        let removed = self
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(origin);
        if let Some(context) = removed {
            context.retire();
        }
    }
}

/// A single timer loop serving every open page of one origin.
pub struct BackgroundContext {
    origin: String,
    coordinator: Arc<RefreshCoordinator>,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    retired: AtomicBool,
    pages: Arc<PageSet>,
}

impl BackgroundContext {
    fn start(origin: &str, coordinator: Arc<RefreshCoordinator>, period: Duration) -> Self {
        let context = Self {
            origin: origin.to_string(),
            coordinator,
            period,
            task: Mutex::new(None),
            retired: AtomicBool::new(false),
            pages: Arc::new(PageSet::default()),
        };
        context.restart();
        context
    }

    /// Spawn the loop unless it is running or the context was retired.
    fn restart(&self) {
        if self.retired.load(Ordering::SeqCst) {
            warn!(origin = %self.origin, "Background context was replaced, not restarting");
            return;
        }
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let ended = self.coordinator.supervisor().ended();
        *task = Some(tokio::spawn(run_refresh_loop(
            self.coordinator.clone(),
            self.period,
            ended,
        )));
    }

    /// Stop for good; the origin now belongs to another context.
    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl RefreshScheduler for BackgroundContext {
    fn strategy(&self) -> Strategy {
        Strategy::PersistentContext
    }

    fn attach(&self) -> PageAttachment {
        self.pages.insert(None)
    }

    fn force_refresh(&self) -> BoxFuture<'static, RefreshOutcome> {
        self.coordinator.force_refresh().boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<RefreshNotice> {
        self.coordinator.subscribe()
    }

    fn resume(&self) {
        self.restart();
    }

    fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
            info!(origin = %self.origin, "Background context stopped");
        }
        self.coordinator.mark_idle();
    }

    fn active_pages(&self) -> usize {
        self.pages.len()
    }
}

impl Drop for BackgroundContext {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}
