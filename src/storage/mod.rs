//! Persistence for rally-scout state.
//!
//! Everything long-lived lives in a handful of JSON files under one
//! state directory:
//!
//! ```text
//! {state_dir}/
//! ├── catalog.json        # Latest route catalog snapshot
//! ├── history.json        # subscriber -> notified fingerprints
//! ├── favorites.json      # subscriber -> favorite station names
//! └── date_filters.json   # subscriber -> date ranges
//! ```

pub mod local;

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use local::JsonStateStore;

/// Persisted mapping of subscriber id to previously-notified route
/// fingerprints. Owned exclusively by the notification engine; the
/// store only loads and saves it.
///
/// `BTreeSet` keeps the serialized files diffable across runs.
pub type NotificationHistory = HashMap<String, BTreeSet<String>>;

/// Contract for notification history persistence.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the full history; a missing backing file yields an empty
    /// mapping.
    async fn load(&self) -> Result<NotificationHistory>;

    /// Persist the full history.
    async fn save(&self, history: &NotificationHistory) -> Result<()>;
}
