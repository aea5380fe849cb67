//! Keeps the access credential alive without user interaction.
//!
//! `RefreshClient` performs one renewal against the backend. `RefreshCoordinator`
//! collapses concurrent renewal requests into a single in-flight call. The
//! schedulers drive the coordinator on a timer, either from one background
//! context per origin or, where that is unavailable, from a timer per page.

mod client;
mod coordinator;
mod interval;
mod persistent;
mod scheduler;

pub use client::{RefreshClient, RefreshOutcome};
pub use coordinator::{RefreshCoordinator, RefreshNotice, RefreshState};
pub use interval::IntervalScheduler;
pub use persistent::{BackgroundContext, BackgroundContexts};
pub use scheduler::{
    Capabilities, DEFAULT_REFRESH_INTERVAL, PageAttachment, RefreshScheduler, Strategy,
    select_scheduler,
};
