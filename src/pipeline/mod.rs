//! Pipeline entry points and the notification engine.
//!
//! - `run_discovery_cycle`: one full walk + diff + reconcile pass
//! - `NotificationEngine`: per-subscriber dedup and history pruning

pub mod discover;
pub mod notify;

pub use discover::{CycleOutcome, run_discovery_cycle};
pub use notify::{NotificationEngine, NotificationEvent, NotificationSink};
